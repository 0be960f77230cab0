//! Image fetching and transport encoding.
//!
//! Provider calls take images as either `http(s)` URLs or `data:` URLs.
//! Bytes are fetched fresh for every call and re-encoded into whatever the
//! provider expects; nothing is cached between calls.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use drape_core::naming::extension_for_content_type;

/// Fallback MIME type when neither the source nor the bytes identify one.
pub const DEFAULT_CONTENT_TYPE: &str = "image/png";

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Failed to fetch image {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Image URL {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Invalid data URL: {0}")]
    InvalidDataUrl(String),

    #[error("Unsupported image reference: {0}")]
    UnsupportedScheme(String),

    #[error("Image is empty: {0}")]
    Empty(String),
}

/// Raw image bytes plus their MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl ImagePayload {
    /// Wrap bytes, preferring the MIME type sniffed from the bytes over the
    /// declared one.
    pub fn new(bytes: Vec<u8>, declared_content_type: Option<&str>) -> Self {
        let content_type = sniff_content_type(&bytes, declared_content_type);
        Self {
            bytes,
            content_type,
        }
    }

    /// Standard base64 of the bytes, no prefix.
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    /// `data:{mime};base64,{payload}`
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.content_type, self.to_base64())
    }

    pub fn extension(&self) -> &'static str {
        extension_for_content_type(&self.content_type)
    }
}

/// Determine the MIME type from magic bytes, falling back to the declared
/// type and finally to [`DEFAULT_CONTENT_TYPE`].
pub fn sniff_content_type(bytes: &[u8], declared: Option<&str>) -> String {
    if let Ok(format) = ::image::guess_format(bytes) {
        return format.to_mime_type().to_string();
    }
    declared
        .map(|d| d.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
        .filter(|d| d.starts_with("image/"))
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())
}

/// Decode a `data:<mime>;base64,<payload>` URL.
pub fn parse_data_url(url: &str) -> Result<ImagePayload, ImageError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| ImageError::InvalidDataUrl("missing data: prefix".into()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| ImageError::InvalidDataUrl("missing ',' separator".into()))?;
    let declared = meta
        .strip_suffix(";base64")
        .ok_or_else(|| ImageError::InvalidDataUrl("only base64 data URLs are supported".into()))?;

    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|e| ImageError::InvalidDataUrl(e.to_string()))?;
    if bytes.is_empty() {
        return Err(ImageError::Empty("data URL".into()));
    }
    let declared = (!declared.is_empty()).then_some(declared);
    Ok(ImagePayload::new(bytes, declared))
}

/// Resolves an image reference to bytes.
#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn load(&self, url: &str) -> Result<ImagePayload, ImageError>;
}

/// Loader for `http(s)` and `data:` URLs.
#[derive(Clone, Default)]
pub struct HttpImageLoader {
    client: reqwest::Client,
}

impl HttpImageLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuse an existing [`reqwest::Client`] for connection pooling.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageLoader for HttpImageLoader {
    async fn load(&self, url: &str) -> Result<ImagePayload, ImageError> {
        if url.starts_with("data:") {
            return parse_data_url(url);
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ImageError::UnsupportedScheme(url.chars().take(32).collect()));
        }

        let fetch_err = |e: reqwest::Error| ImageError::Fetch {
            url: url.to_string(),
            message: e.to_string(),
        };
        let response = self.client.get(url).send().await.map_err(fetch_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ImageError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let declared = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await.map_err(fetch_err)?;
        if bytes.is_empty() {
            return Err(ImageError::Empty(url.to_string()));
        }
        Ok(ImagePayload::new(bytes.to_vec(), declared.as_deref()))
    }
}
