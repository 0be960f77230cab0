//! Blob storage for generated artifacts.
//!
//! Provider URLs are short-lived, so every artifact is copied into a
//! [`BlobStore`] before its URL is written to a suggestion. Three back-ends:
//! local filesystem (development), S3 (production) and in-memory (tests).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Blob write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("S3 upload of {key} failed: {message}")]
    S3 { key: String, message: String },

    #[error("Invalid blob name: {0}")]
    InvalidName(String),
}

/// Write-once artifact storage returning publicly reachable URLs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `name` and return the URL clients should use.
    async fn put(&self, name: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<String, StorageError>;
}

/// Names are flat: no separators, no parent references.
fn validate_name(name: &str) -> Result<(), StorageError> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn join_url(base: &str, name: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), name)
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobBackend {
    Local,
    S3,
    Memory,
}

/// Blob storage configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: BlobBackend,
    /// Root directory for the local back-end.
    pub dir: PathBuf,
    /// Prefix for returned URLs. For S3 without it, `s3://bucket/key` is returned.
    pub public_base_url: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_prefix: String,
}

impl StorageConfig {
    /// | Env Var                 | Default                         |
    /// |-------------------------|---------------------------------|
    /// | `BLOB_BACKEND`          | `local` (`local`, `s3`, `memory`) |
    /// | `BLOB_DIR`              | `./data/blobs`                  |
    /// | `BLOB_PUBLIC_BASE_URL`  | `http://localhost:3000/blobs` for local |
    /// | `S3_BUCKET`             | required when backend is `s3`   |
    /// | `S3_PREFIX`             | `generations`                   |
    pub fn from_env() -> Self {
        let backend = match std::env::var("BLOB_BACKEND")
            .unwrap_or_else(|_| "local".into())
            .to_ascii_lowercase()
            .as_str()
        {
            "local" => BlobBackend::Local,
            "s3" => BlobBackend::S3,
            "memory" => BlobBackend::Memory,
            other => panic!("BLOB_BACKEND must be one of local, s3, memory (got '{other}')"),
        };

        let dir = PathBuf::from(std::env::var("BLOB_DIR").unwrap_or_else(|_| "./data/blobs".into()));

        let public_base_url = std::env::var("BLOB_PUBLIC_BASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| {
                (backend == BlobBackend::Local).then(|| "http://localhost:3000/blobs".to_string())
            });

        let s3_bucket = std::env::var("S3_BUCKET").ok().filter(|s| !s.is_empty());
        if backend == BlobBackend::S3 {
            assert!(s3_bucket.is_some(), "S3_BUCKET must be set when BLOB_BACKEND=s3");
        }

        let s3_prefix = std::env::var("S3_PREFIX").unwrap_or_else(|_| "generations".into());

        Self {
            backend,
            dir,
            public_base_url,
            s3_bucket,
            s3_prefix,
        }
    }
}

/// Build the configured blob store.
pub async fn build_blob_store(config: &StorageConfig) -> Result<Arc<dyn BlobStore>, StorageError> {
    let store: Arc<dyn BlobStore> = match config.backend {
        BlobBackend::Local => {
            tokio::fs::create_dir_all(&config.dir).await?;
            Arc::new(LocalBlobStore::new(
                config.dir.clone(),
                config.public_base_url.clone().unwrap_or_default(),
            ))
        }
        BlobBackend::S3 => {
            let aws = aws_config::load_from_env().await;
            Arc::new(S3BlobStore::new(
                aws_sdk_s3::Client::new(&aws),
                config.s3_bucket.clone().unwrap_or_default(),
                config.s3_prefix.clone(),
                config.public_base_url.clone(),
            ))
        }
        BlobBackend::Memory => Arc::new(MemoryBlobStore::new()),
    };
    tracing::info!(backend = ?config.backend, "Blob store ready");
    Ok(store)
}

// ---------------------------------------------------------------------------
// Local filesystem
// ---------------------------------------------------------------------------

pub struct LocalBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    pub fn new(root: PathBuf, public_base_url: String) -> Self {
        Self {
            root,
            public_base_url,
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, name: &str, bytes: Vec<u8>, _content_type: &str) -> Result<String, StorageError> {
        validate_name(name)?;
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.root.join(name), bytes).await?;
        Ok(join_url(&self.public_base_url, name))
    }
}

// ---------------------------------------------------------------------------
// S3
// ---------------------------------------------------------------------------

pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
    public_base_url: Option<String>,
}

impl S3BlobStore {
    pub fn new(
        client: aws_sdk_s3::Client,
        bucket: String,
        prefix: String,
        public_base_url: Option<String>,
    ) -> Self {
        Self {
            client,
            bucket,
            prefix,
            public_base_url,
        }
    }

    fn key_for(&self, name: &str) -> String {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}/{name}")
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, name: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, StorageError> {
        validate_name(name)?;
        let key = self.key_for(name);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StorageError::S3 {
                key: key.clone(),
                message: e.to_string(),
            })?;

        Ok(match &self.public_base_url {
            Some(base) => join_url(base, &key),
            None => format!("s3://{}/{key}", self.bucket),
        })
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Stored object: bytes and MIME type.
pub type MemoryObject = (Vec<u8>, String);

/// Blob store that keeps objects in a map. URLs use the `memory://` scheme.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, MemoryObject>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, name: &str) -> Option<MemoryObject> {
        self.objects.lock().await.get(name).cloned()
    }

    /// Stored names, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.objects.lock().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, name: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, StorageError> {
        validate_name(name)?;
        self.objects
            .lock()
            .await
            .insert(name.to_string(), (bytes, content_type.to_string()));
        Ok(format!("memory://{name}"))
    }
}
