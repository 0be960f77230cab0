use drape_core::error::CoreError;
use drape_core::types::{JobId, SuggestionIndex};
use drape_db::StoreError;
use drape_provider::ProviderError;

use crate::advisor::AdvisorError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Advisor(#[from] AdvisorError),

    #[error("Execution lock for {job_id}/{suggestion_index} was taken over; run abandoned")]
    LockLost {
        job_id: JobId,
        suggestion_index: SuggestionIndex,
    },

    #[error("Generation queue is full, try again shortly")]
    QueueFull,

    #[error("Generation queue is closed")]
    QueueClosed,
}

impl PipelineError {
    /// The domain error behind this failure, if there is one.
    pub fn as_core(&self) -> Option<&CoreError> {
        match self {
            Self::Core(e) | Self::Store(StoreError::Core(e)) => Some(e),
            _ => None,
        }
    }
}
