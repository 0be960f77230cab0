//! Snapshot fetching.

use std::time::Duration;

use async_trait::async_trait;
use drape_core::job::Job;
use drape_core::types::JobId;
use serde::Deserialize;

use crate::error::ClientError;

/// Source of full job snapshots.
#[async_trait]
pub trait JobFetcher: Send + Sync {
    async fn fetch(&self, job_id: JobId) -> Result<Job, ClientError>;
}

#[derive(Deserialize)]
struct Envelope {
    data: Job,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Fetches snapshots from `GET {base}/api/v1/status?jobId=...`.
pub struct HttpStatusClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStatusClient {
    /// Each request times out after `request_timeout`, which should be
    /// shorter than the polling interval.
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn status_url(&self) -> String {
        format!("{}/api/v1/status", self.base_url)
    }
}

#[async_trait]
impl JobFetcher for HttpStatusClient {
    async fn fetch(&self, job_id: JobId) -> Result<Job, ClientError> {
        let response = self
            .client
            .get(self.status_url())
            .query(&[("jobId", job_id.to_string())])
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorBody>(&body)
                .map(|e| e.error)
                .unwrap_or_else(|_| String::from_utf8_lossy(&body).into_owned());
            return Err(ClientError::HttpStatus {
                status: status.as_u16(),
                message,
            });
        }
        Ok(serde_json::from_slice::<Envelope>(&body)?.data)
    }
}
