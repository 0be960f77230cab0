//! The job store seam.

use async_trait::async_trait;
use drape_core::error::CoreError;
use drape_core::job::{Job, SuggestionPatch};
use drape_core::types::{JobId, SuggestionIndex};

use crate::error::StoreError;

/// Durable record of jobs and their suggestions.
///
/// Implementations must make every update atomic with respect to the one
/// job record it touches, and must apply suggestion patches through
/// [`Job::apply_suggestion_patch`] so invariants hold regardless of the
/// back-end. Updates are scoped to the suggestion being patched; concurrent
/// runs for sibling suggestions never overwrite each other.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a freshly created job.
    async fn create(&self, job: &Job) -> Result<(), StoreError>;

    /// Fetch the full job snapshot.
    async fn get(&self, job_id: JobId) -> Result<Option<Job>, StoreError>;

    /// Apply a field-scoped patch to `suggestions[index]`.
    ///
    /// Returns the updated job snapshot.
    async fn update_suggestion(
        &self,
        job_id: JobId,
        index: SuggestionIndex,
        patch: &SuggestionPatch,
    ) -> Result<Job, StoreError>;

    /// Set the out-of-band cancellation flag.
    async fn request_cancel(&self, job_id: JobId) -> Result<Job, StoreError>;

    /// Record a job-level failure.
    async fn fail_job(&self, job_id: JobId, error: &str) -> Result<Job, StoreError>;

    /// Like [`get`](Self::get), but a missing job is an error.
    async fn get_required(&self, job_id: JobId) -> Result<Job, StoreError> {
        self.get(job_id)
            .await?
            .ok_or_else(|| StoreError::Core(CoreError::job_not_found(job_id)))
    }
}
