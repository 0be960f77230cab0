//! Gallery of finished looks.
//!
//! Every successful suggestion produces one [`GalleryRecord`] per final
//! image. Delivery is best effort: callers log failures and move on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drape_core::job::StyleSuggestion;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum GalleryError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Gallery returned HTTP {0}")]
    HttpStatus(u16),
}

/// The images the look was generated from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GalleryOriginals {
    pub human_image_url: String,
    pub garment_image_url: String,
}

/// One finished look.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GalleryRecord {
    /// `{job_id}-{suggestion_index}-{n}`, stable across redelivery.
    pub id: String,
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<StyleSuggestion>,
    pub timestamp: DateTime<Utc>,
    pub originals: GalleryOriginals,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_prompt: Option<String>,
}

/// Receives finished looks.
#[async_trait]
pub trait GallerySink: Send + Sync {
    async fn record(&self, record: &GalleryRecord) -> Result<(), GalleryError>;
}

/// Sink used when no gallery is configured.
pub struct NoopGallery;

#[async_trait]
impl GallerySink for NoopGallery {
    async fn record(&self, record: &GalleryRecord) -> Result<(), GalleryError> {
        tracing::debug!(record_id = %record.id, "No gallery configured, record dropped");
        Ok(())
    }
}

/// Sink that keeps records in memory, for development and tests.
#[derive(Default)]
pub struct MemoryGallery {
    records: Mutex<Vec<GalleryRecord>>,
}

impl MemoryGallery {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<GalleryRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl GallerySink for MemoryGallery {
    async fn record(&self, record: &GalleryRecord) -> Result<(), GalleryError> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}
