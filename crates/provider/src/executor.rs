//! Generic submit-and-poll driver for remote asynchronous image tasks.
//!
//! A provider call is a remote task: submit a request, receive a task id,
//! poll until the task reaches a terminal state. [`TaskExecutor`] owns the
//! retry and polling policy; [`TaskBackend`] owns the wire format.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::backoff::{next_delay, BackoffConfig};
use crate::error::ProviderError;

/// One output produced by a finished remote task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// The provider hosts the image; it must be fetched before persisting.
    Url(String),
    /// The provider returned the image bytes inline.
    Inline {
        bytes: Vec<u8>,
        content_type: Option<String>,
    },
}

/// Result of a single status check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskPoll {
    Running,
    Succeeded(Vec<Artifact>),
    Failed(String),
}

/// Wire-level access to a remote task API.
#[async_trait]
pub trait TaskBackend: Send + Sync {
    /// Queue a task and return its provider-assigned id.
    async fn submit(&self, request: &Value) -> Result<String, ProviderError>;

    /// Fetch the current state of a task.
    async fn poll(&self, task_id: &str) -> Result<TaskPoll, ProviderError>;
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Retry and polling policy.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Total submission attempts, including the first.
    pub submit_max_attempts: u32,
    /// Delay before the first resubmission; doubles afterwards.
    pub submit_backoff: Duration,
    /// Pause before each status check.
    pub poll_interval: Duration,
    /// Status checks allowed before giving up.
    pub poll_max_attempts: u32,
    /// Timeout applied to each individual status request.
    pub poll_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            submit_max_attempts: 3,
            submit_backoff: Duration::from_secs(2),
            poll_interval: Duration::from_secs(5),
            poll_max_attempts: 60,
            poll_timeout: Duration::from_secs(4),
        }
    }
}

impl ExecutorConfig {
    /// Load the policy from environment variables with defaults.
    ///
    /// | Env Var               | Default |
    /// |-----------------------|---------|
    /// | `SUBMIT_MAX_ATTEMPTS` | `3`     |
    /// | `SUBMIT_BACKOFF_SECS` | `2`     |
    /// | `POLL_INTERVAL_SECS`  | `5`     |
    /// | `POLL_MAX_ATTEMPTS`   | `60`    |
    /// | `POLL_TIMEOUT_SECS`   | `4`     |
    pub fn from_env() -> Self {
        let submit_max_attempts: u32 = std::env::var("SUBMIT_MAX_ATTEMPTS")
            .unwrap_or_else(|_| "3".into())
            .parse()
            .expect("SUBMIT_MAX_ATTEMPTS must be a valid u32");

        let submit_backoff_secs: u64 = std::env::var("SUBMIT_BACKOFF_SECS")
            .unwrap_or_else(|_| "2".into())
            .parse()
            .expect("SUBMIT_BACKOFF_SECS must be a valid u64");

        let poll_interval_secs: u64 = std::env::var("POLL_INTERVAL_SECS")
            .unwrap_or_else(|_| "5".into())
            .parse()
            .expect("POLL_INTERVAL_SECS must be a valid u64");

        let poll_max_attempts: u32 = std::env::var("POLL_MAX_ATTEMPTS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("POLL_MAX_ATTEMPTS must be a valid u32");

        let poll_timeout_secs: u64 = std::env::var("POLL_TIMEOUT_SECS")
            .unwrap_or_else(|_| "4".into())
            .parse()
            .expect("POLL_TIMEOUT_SECS must be a valid u64");

        Self {
            submit_max_attempts: submit_max_attempts.max(1),
            submit_backoff: Duration::from_secs(submit_backoff_secs),
            poll_interval: Duration::from_secs(poll_interval_secs),
            poll_max_attempts: poll_max_attempts.max(1),
            poll_timeout: Duration::from_secs(poll_timeout_secs),
        }
    }
}

impl ExecutorConfig {
    /// Longest one `run` call can take: every submission attempt with its
    /// backoff, then the full poll budget with each check timing out.
    pub fn call_budget(&self) -> Duration {
        let backoff = BackoffConfig::doubling(self.submit_backoff);
        let mut delay = backoff.initial_delay;
        let mut total = Duration::ZERO;
        for _ in 1..self.submit_max_attempts {
            total += delay;
            delay = next_delay(delay, &backoff);
        }
        total + (self.poll_interval + self.poll_timeout) * self.poll_max_attempts
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Drives remote tasks to completion for one provider.
#[derive(Clone)]
pub struct TaskExecutor {
    backend: Arc<dyn TaskBackend>,
    config: ExecutorConfig,
    provider: &'static str,
}

impl TaskExecutor {
    /// * `provider` - label attached to log lines.
    pub fn new(backend: Arc<dyn TaskBackend>, config: ExecutorConfig, provider: &'static str) -> Self {
        Self {
            backend,
            config,
            provider,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Submit a request, retrying transient failures with exponential
    /// backoff. Validation and quota errors abort immediately.
    pub async fn submit(&self, request: &Value) -> Result<String, ProviderError> {
        let backoff = BackoffConfig::doubling(self.config.submit_backoff);
        let mut delay = backoff.initial_delay;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.backend.submit(request).await {
                Ok(task_id) => {
                    tracing::debug!(
                        provider = self.provider,
                        task_id = %task_id,
                        attempt,
                        "Task submitted",
                    );
                    return Ok(task_id);
                }
                Err(e) if e.is_retryable() && attempt < self.config.submit_max_attempts => {
                    tracing::warn!(
                        provider = self.provider,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Task submission failed, retrying",
                    );
                    tokio::time::sleep(delay).await;
                    delay = next_delay(delay, &backoff);
                }
                Err(e) => {
                    tracing::error!(
                        provider = self.provider,
                        attempt,
                        error = %e,
                        "Task submission failed",
                    );
                    return Err(e);
                }
            }
        }
    }

    /// One status check bounded by the per-request timeout.
    pub async fn poll(&self, task_id: &str) -> Result<TaskPoll, ProviderError> {
        match tokio::time::timeout(self.config.poll_timeout, self.backend.poll(task_id)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Transient(format!(
                "Status check timed out after {}ms",
                self.config.poll_timeout.as_millis()
            ))),
        }
    }

    /// Poll `task_id` until it finishes or the poll budget runs out.
    ///
    /// Failed status checks are logged and only consume budget.
    pub async fn wait(&self, task_id: &str) -> Result<Vec<Artifact>, ProviderError> {
        let attempts = self.config.poll_max_attempts;
        for attempt in 1..=attempts {
            tokio::time::sleep(self.config.poll_interval).await;

            match self.poll(task_id).await {
                Ok(TaskPoll::Running) => {}
                Ok(TaskPoll::Succeeded(artifacts)) => {
                    if artifacts.is_empty() {
                        return Err(ProviderError::EmptyResult);
                    }
                    tracing::debug!(
                        provider = self.provider,
                        task_id,
                        attempt,
                        artifacts = artifacts.len(),
                        "Task succeeded",
                    );
                    return Ok(artifacts);
                }
                Ok(TaskPoll::Failed(message)) => {
                    tracing::warn!(
                        provider = self.provider,
                        task_id,
                        error = %message,
                        "Task failed",
                    );
                    return Err(ProviderError::TaskFailed(message));
                }
                Err(e) => {
                    tracing::warn!(
                        provider = self.provider,
                        task_id,
                        attempt,
                        error = %e,
                        "Status check failed",
                    );
                }
            }
        }

        tracing::warn!(provider = self.provider, task_id, attempts, "Task poll budget exhausted");
        Err(ProviderError::Timeout { attempts })
    }

    /// Submit then wait for the task to finish.
    pub async fn run(&self, request: &Value) -> Result<Vec<Artifact>, ProviderError> {
        let task_id = self.submit(request).await?;
        self.wait(&task_id).await
    }
}
