//! Row model for the `generation_jobs` table.

use drape_core::job::{Job, JobInput, JobStatus, Suggestion};
use drape_core::types::Timestamp;
use sqlx::types::Json;
use sqlx::FromRow;

/// A row from the `generation_jobs` table. Suggestions are stored as one
/// JSONB array so a single suggestion can be rewritten with `jsonb_set`.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub job_id: uuid::Uuid,
    pub status: String,
    pub input: Json<JobInput>,
    pub suggestions: Json<Vec<Suggestion>>,
    pub ui_ready: bool,
    pub cancel_requested: bool,
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl JobRow {
    /// Convert the row into the domain record.
    pub fn into_job(self) -> Result<Job, serde_json::Error> {
        let status: JobStatus = serde_json::from_value(serde_json::Value::String(self.status))?;
        Ok(Job {
            job_id: self.job_id.into(),
            status,
            input: self.input.0,
            suggestions: self.suggestions.0,
            ui_ready: self.ui_ready,
            cancel_requested: self.cancel_requested,
            error: self.error,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
