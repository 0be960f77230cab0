//! REST client for remote asynchronous task APIs.
//!
//! Both supported back-ends expose the same shape: `POST {base}/tasks`
//! queues a task and returns its id, `GET {base}/tasks/{id}` reports its
//! state and, once finished, its outputs (hosted URLs or inline base64).

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ProviderError;
use crate::executor::{Artifact, TaskBackend, TaskPoll};

/// HTTP client for a single task API endpoint.
#[derive(Clone)]
pub struct HttpTaskApi {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

/// Response returned when a task is queued.
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(alias = "id")]
    task_id: String,
}

/// Remote task states. Vendors disagree on spelling; aliases cover the
/// common variants.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum RemoteStatus {
    #[serde(alias = "queued", alias = "starting", alias = "processing", alias = "in_progress")]
    Running,
    #[serde(alias = "completed", alias = "success", alias = "done")]
    Succeeded,
    #[serde(alias = "error", alias = "canceled", alias = "cancelled")]
    Failed,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RemoteOutput {
    Url(String),
    Object {
        #[serde(default)]
        url: Option<String>,
        #[serde(default, alias = "b64_json", alias = "data")]
        base64: Option<String>,
        #[serde(default, alias = "mime_type")]
        content_type: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: RemoteStatus,
    #[serde(default, alias = "output")]
    outputs: Vec<RemoteOutput>,
    #[serde(default)]
    error: Option<String>,
}

impl HttpTaskApi {
    /// * `api_url` - Base HTTP URL, e.g. `https://tryon.example.com/v1`.
    pub fn new(api_url: String, api_key: Option<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url, api_key)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code, classifying failures
    /// by status.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProviderError::from_status(status.as_u16(), body));
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

fn into_poll(response: StatusResponse) -> Result<TaskPoll, ProviderError> {
    match response.status {
        RemoteStatus::Running => Ok(TaskPoll::Running),
        RemoteStatus::Failed => Ok(TaskPoll::Failed(
            response
                .error
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| "Provider reported failure without a message".into()),
        )),
        RemoteStatus::Succeeded => {
            let mut artifacts = Vec::with_capacity(response.outputs.len());
            for output in response.outputs {
                match output {
                    RemoteOutput::Url(url) => artifacts.push(Artifact::Url(url)),
                    RemoteOutput::Object {
                        base64: Some(data),
                        content_type,
                        ..
                    } => {
                        let bytes = BASE64.decode(data.trim()).map_err(|e| {
                            ProviderError::Validation(format!("Invalid inline image: {e}"))
                        })?;
                        artifacts.push(Artifact::Inline {
                            bytes,
                            content_type,
                        });
                    }
                    RemoteOutput::Object { url: Some(url), .. } => artifacts.push(Artifact::Url(url)),
                    RemoteOutput::Object { .. } => {}
                }
            }
            Ok(TaskPoll::Succeeded(artifacts))
        }
    }
}

#[async_trait]
impl TaskBackend for HttpTaskApi {
    async fn submit(&self, request: &Value) -> Result<String, ProviderError> {
        let response = self
            .authorize(self.client.post(format!("{}/tasks", self.api_url)))
            .json(request)
            .send()
            .await?;
        let submitted: SubmitResponse = Self::parse_response(response).await?;
        Ok(submitted.task_id)
    }

    async fn poll(&self, task_id: &str) -> Result<TaskPoll, ProviderError> {
        let response = self
            .authorize(self.client.get(format!("{}/tasks/{}", self.api_url, task_id)))
            .send()
            .await?;
        into_poll(Self::parse_response(response).await?)
    }
}
