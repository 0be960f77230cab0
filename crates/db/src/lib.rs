//! Persistence for generation jobs and execution locks.
//!
//! [`JobStore`] and [`ExecutionLock`] are the only mutation seams the rest
//! of the system sees. Each has a Postgres implementation (in
//! [`repositories`]) and an in-memory one (in [`memory`]) used for local
//! development and tests.

use sqlx::postgres::PgPoolOptions;

pub mod error;
pub mod lock;
pub mod memory;
pub mod models;
pub mod repositories;
pub mod store;

pub use error::StoreError;
pub use lock::{ExecutionLock, LockGuard, LockKey, LockToken};
pub use memory::{MemoryExecutionLock, MemoryJobStore};
pub use repositories::{PgExecutionLock, PgJobStore};
pub use store::JobStore;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to verify connectivity.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply the embedded migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
