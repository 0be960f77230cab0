//! Postgres execution lock over the `execution_locks` table.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::StoreError;
use crate::lock::{ExecutionLock, LockKey, LockToken};

/// [`ExecutionLock`] backed by a TTL'd Postgres row.
#[derive(Clone)]
pub struct PgExecutionLock {
    pool: PgPool,
}

impl PgExecutionLock {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Delete expired lock rows. Returns the number removed.
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM execution_locks WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ExecutionLock for PgExecutionLock {
    async fn try_acquire(
        &self,
        key: LockKey,
        ttl: Duration,
    ) -> Result<Option<LockToken>, StoreError> {
        let token = LockToken::generate();
        // Insert, or take over a row whose TTL has passed. A live row makes
        // the conflict branch a no-op and RETURNING yields nothing.
        let acquired: Option<(uuid::Uuid,)> = sqlx::query_as(
            "INSERT INTO execution_locks (job_id, suggestion_index, holder, started_at, expires_at) \
             VALUES ($1, $2, $3, NOW(), NOW() + make_interval(secs => $4)) \
             ON CONFLICT (job_id, suggestion_index) DO UPDATE \
                 SET holder = EXCLUDED.holder, \
                     started_at = EXCLUDED.started_at, \
                     expires_at = EXCLUDED.expires_at \
                 WHERE execution_locks.expires_at <= NOW() \
             RETURNING holder",
        )
        .bind(key.job_id.as_uuid())
        .bind(key.suggestion_index as i32)
        .bind(token.0)
        .bind(ttl.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(acquired.map(|(holder,)| LockToken(holder)))
    }

    async fn extend(
        &self,
        key: LockKey,
        token: LockToken,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE execution_locks \
             SET expires_at = NOW() + make_interval(secs => $4) \
             WHERE job_id = $1 AND suggestion_index = $2 AND holder = $3",
        )
        .bind(key.job_id.as_uuid())
        .bind(key.suggestion_index as i32)
        .bind(token.0)
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, key: LockKey, token: LockToken) -> Result<(), StoreError> {
        sqlx::query(
            "DELETE FROM execution_locks \
             WHERE job_id = $1 AND suggestion_index = $2 AND holder = $3",
        )
        .bind(key.job_id.as_uuid())
        .bind(key.suggestion_index as i32)
        .bind(token.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
