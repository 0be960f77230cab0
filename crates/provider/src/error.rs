//! Provider error taxonomy.
//!
//! Retry decisions are made on the variant, never on message text:
//! only [`ProviderError::Transient`] is retried by the executor.

use crate::image::ImageError;
use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Network failure, timeout or 5xx from the provider. Safe to retry.
    #[error("Provider unavailable: {0}")]
    Transient(String),

    /// The provider rejected the request as malformed.
    #[error("Provider rejected the request: {0}")]
    Validation(String),

    /// The remote task reached a failed terminal state.
    #[error("Generation failed: {0}")]
    TaskFailed(String),

    /// The poll budget ran out before the task finished.
    #[error("Generation timed out after {attempts} status checks")]
    Timeout { attempts: u32 },

    /// Rate limit or billing quota exhausted.
    #[error("Provider quota exceeded: {0}")]
    Quota(String),

    /// The task succeeded but returned no images.
    #[error("Provider returned no images")]
    EmptyResult,

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ProviderError {
    /// Whether the executor should retry the failed call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Map an HTTP status code from a provider to an error variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            402 | 429 => Self::Quota(format!("HTTP {status}: {body}")),
            408 | 500..=599 => Self::Transient(format!("HTTP {status}: {body}")),
            _ => Self::Validation(format!("HTTP {status}: {body}")),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Validation(format!("Malformed provider response: {err}"));
        }
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), err.to_string());
        }
        // Connect, timeout, body and request errors.
        Self::Transient(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn status_classification() {
        assert_matches!(ProviderError::from_status(429, "slow down".into()), ProviderError::Quota(_));
        assert_matches!(ProviderError::from_status(402, String::new()), ProviderError::Quota(_));
        assert_matches!(ProviderError::from_status(503, String::new()), ProviderError::Transient(_));
        assert_matches!(ProviderError::from_status(408, String::new()), ProviderError::Transient(_));
        assert_matches!(ProviderError::from_status(400, String::new()), ProviderError::Validation(_));
        assert_matches!(ProviderError::from_status(404, String::new()), ProviderError::Validation(_));
    }

    #[test]
    fn only_transient_is_retryable() {
        assert!(ProviderError::Transient("reset".into()).is_retryable());
        assert!(!ProviderError::Validation("bad".into()).is_retryable());
        assert!(!ProviderError::Quota("limit".into()).is_retryable());
        assert!(!ProviderError::TaskFailed("nsfw".into()).is_retryable());
        assert!(!ProviderError::Timeout { attempts: 60 }.is_retryable());
        assert!(!ProviderError::EmptyResult.is_retryable());
    }

    #[test]
    fn display_messages() {
        assert_eq!(
            ProviderError::Timeout { attempts: 60 }.to_string(),
            "Generation timed out after 60 status checks"
        );
        assert_eq!(
            ProviderError::TaskFailed("content policy".into()).to_string(),
            "Generation failed: content policy"
        );
    }
}
