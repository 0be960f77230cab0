//! Gallery delivery over HTTP with exponential-backoff retry.
//!
//! [`WebhookGallery`] POSTs each [`GalleryRecord`] as JSON to the gallery
//! service. Failed attempts are retried three times with exponential
//! backoff (1 s, 2 s, 4 s) before giving up.

use std::time::Duration;

use async_trait::async_trait;

use super::gallery::{GalleryError, GalleryRecord, GallerySink};

/// Retry delays (exponential backoff: 1s, 2s, 4s).
const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];

/// HTTP request timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct WebhookGallery {
    client: reqwest::Client,
    url: String,
    retry_delays: Vec<Duration>,
}

impl WebhookGallery {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
            retry_delays: RETRY_DELAYS.to_vec(),
        }
    }

    /// Override the backoff schedule.
    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Execute a single POST request and check the response status.
    async fn try_send(&self, record: &GalleryRecord) -> Result<(), GalleryError> {
        let response = self.client.post(&self.url).json(record).send().await?;
        if !response.status().is_success() {
            return Err(GalleryError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl GallerySink for WebhookGallery {
    async fn record(&self, record: &GalleryRecord) -> Result<(), GalleryError> {
        for (attempt, delay) in self.retry_delays.iter().enumerate() {
            match self.try_send(record).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        url = %self.url,
                        record_id = %record.id,
                        error = %e,
                        "Gallery delivery attempt failed, retrying",
                    );
                    tokio::time::sleep(*delay).await;
                }
            }
        }

        // Final attempt after the last backoff.
        self.try_send(record).await.inspect_err(|e| {
            tracing::error!(
                url = %self.url,
                record_id = %record.id,
                error = %e,
                "Gallery delivery failed after all retries",
            );
        })
    }
}
