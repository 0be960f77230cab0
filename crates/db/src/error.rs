use drape_core::error::CoreError;

/// Errors surfaced by job stores and execution locks.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A domain rule rejected the operation (missing job, frozen
    /// suggestion, invalid patch).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A database query failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored JSON document could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether the error means the job or suggestion does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Core(CoreError::NotFound { .. }))
    }
}
