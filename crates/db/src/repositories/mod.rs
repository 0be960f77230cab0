//! Postgres-backed implementations of the store seams.

pub mod job_repo;
pub mod lock_repo;

pub use job_repo::PgJobStore;
pub use lock_repo::PgExecutionLock;
