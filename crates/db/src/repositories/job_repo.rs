//! Postgres job store over the `generation_jobs` table.
//!
//! Every mutation runs in a transaction that locks the job row, applies the
//! domain rules from [`drape_core::job`], and writes back only the columns
//! (and, for suggestion patches, only the JSONB array element) that changed.

use async_trait::async_trait;
use chrono::Utc;
use drape_core::error::CoreError;
use drape_core::job::{Job, SuggestionPatch};
use drape_core::types::{JobId, SuggestionIndex};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::StoreError;
use crate::models::job::JobRow;
use crate::store::JobStore;

/// Column list for `generation_jobs` queries.
const COLUMNS: &str = "\
    job_id, status, input, suggestions, ui_ready, cancel_requested, error, \
    created_at, updated_at";

/// [`JobStore`] backed by Postgres.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Load and row-lock a job inside `tx`.
    async fn lock_job(
        tx: &mut Transaction<'_, Postgres>,
        job_id: JobId,
    ) -> Result<Job, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM generation_jobs WHERE job_id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(job_id.as_uuid())
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| CoreError::job_not_found(job_id))?;
        Ok(row.into_job()?)
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, job: &Job) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO generation_jobs \
                 (job_id, status, input, suggestions, ui_ready, cancel_requested, error, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(job.job_id.as_uuid())
        .bind(job.status.as_str())
        .bind(Json(&job.input))
        .bind(Json(&job.suggestions))
        .bind(job.ui_ready)
        .bind(job.cancel_requested)
        .bind(job.error.as_deref())
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, job_id: JobId) -> Result<Option<Job>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM generation_jobs WHERE job_id = $1");
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(job_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(JobRow::into_job)
            .transpose()
            .map_err(StoreError::from)
    }

    async fn update_suggestion(
        &self,
        job_id: JobId,
        index: SuggestionIndex,
        patch: &SuggestionPatch,
    ) -> Result<Job, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut job = Self::lock_job(&mut tx, job_id).await?;
        let suggestion = job
            .apply_suggestion_patch(index, patch, Utc::now())?
            .clone();

        sqlx::query(
            "UPDATE generation_jobs \
             SET suggestions = jsonb_set(suggestions, $2, $3), \
                 status = $4, ui_ready = $5, updated_at = $6 \
             WHERE job_id = $1",
        )
        .bind(job_id.as_uuid())
        .bind(vec![index.to_string()])
        .bind(Json(&suggestion))
        .bind(job.status.as_str())
        .bind(job.ui_ready)
        .bind(job.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(job)
    }

    async fn request_cancel(&self, job_id: JobId) -> Result<Job, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut job = Self::lock_job(&mut tx, job_id).await?;
        job.request_cancel(Utc::now())?;

        sqlx::query(
            "UPDATE generation_jobs \
             SET suggestions = $2, cancel_requested = TRUE, \
                 status = $3, ui_ready = $4, updated_at = $5 \
             WHERE job_id = $1",
        )
        .bind(job_id.as_uuid())
        .bind(Json(&job.suggestions))
        .bind(job.status.as_str())
        .bind(job.ui_ready)
        .bind(job.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(job)
    }

    async fn fail_job(&self, job_id: JobId, error: &str) -> Result<Job, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut job = Self::lock_job(&mut tx, job_id).await?;
        job.fail(error, Utc::now());

        sqlx::query(
            "UPDATE generation_jobs \
             SET error = $2, status = $3, ui_ready = $4, updated_at = $5 \
             WHERE job_id = $1",
        )
        .bind(job_id.as_uuid())
        .bind(error)
        .bind(job.status.as_str())
        .bind(job.ui_ready)
        .bind(job.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(job)
    }
}
