//! Event type names published on the generation event bus and delivered to
//! status consumers.

/// A job was created and its suggestions are pending.
pub const EVENT_JOB_CREATED: &str = "job.created";

/// Suggestion text was attached to every suggestion of a job.
pub const EVENT_SUGGESTIONS_READY: &str = "job.suggestions_ready";

/// Suggestion text could not be produced; the job failed.
pub const EVENT_JOB_FAILED: &str = "job.failed";

/// A cancellation was requested for a job.
pub const EVENT_JOB_CANCEL_REQUESTED: &str = "job.cancel_requested";

/// A pipeline run started for a suggestion.
pub const EVENT_SUGGESTION_STARTED: &str = "suggestion.started";

/// Stylization previews were written for a suggestion.
pub const EVENT_SUGGESTION_PREVIEW: &str = "suggestion.preview_ready";

/// A suggestion reached `succeeded`.
pub const EVENT_SUGGESTION_SUCCEEDED: &str = "suggestion.succeeded";

/// A suggestion reached `failed`.
pub const EVENT_SUGGESTION_FAILED: &str = "suggestion.failed";
