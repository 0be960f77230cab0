use std::time::Duration;

use drape_core::generation::{DEFAULT_SUGGESTION_COUNT, MAX_SUGGESTION_COUNT};

/// Pipeline tuning loaded from environment variables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Lifetime of an execution lock. Must exceed the longest run.
    pub lock_ttl: Duration,
    /// Pipeline runs allowed in flight at once.
    pub max_concurrent_runs: usize,
    /// Queued triggers before new ones are rejected.
    pub queue_capacity: usize,
    /// Suggestions per job when the request does not specify a count.
    pub default_suggestion_count: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_secs(600),
            max_concurrent_runs: 8,
            queue_capacity: 256,
            default_suggestion_count: DEFAULT_SUGGESTION_COUNT,
        }
    }
}

impl PipelineConfig {
    /// | Env Var                    | Default |
    /// |----------------------------|---------|
    /// | `LOCK_TTL_SECS`            | `600`   |
    /// | `MAX_CONCURRENT_RUNS`      | `8`     |
    /// | `QUEUE_CAPACITY`           | `256`   |
    /// | `DEFAULT_SUGGESTION_COUNT` | `3`     |
    pub fn from_env() -> Self {
        let lock_ttl_secs: u64 = std::env::var("LOCK_TTL_SECS")
            .unwrap_or_else(|_| "600".into())
            .parse()
            .expect("LOCK_TTL_SECS must be a valid u64");

        let max_concurrent_runs: usize = std::env::var("MAX_CONCURRENT_RUNS")
            .unwrap_or_else(|_| "8".into())
            .parse()
            .expect("MAX_CONCURRENT_RUNS must be a valid usize");

        let queue_capacity: usize = std::env::var("QUEUE_CAPACITY")
            .unwrap_or_else(|_| "256".into())
            .parse()
            .expect("QUEUE_CAPACITY must be a valid usize");

        let default_suggestion_count: usize = std::env::var("DEFAULT_SUGGESTION_COUNT")
            .unwrap_or_else(|_| DEFAULT_SUGGESTION_COUNT.to_string())
            .parse()
            .expect("DEFAULT_SUGGESTION_COUNT must be a valid usize");

        Self {
            lock_ttl: Duration::from_secs(lock_ttl_secs),
            max_concurrent_runs: max_concurrent_runs.max(1),
            queue_capacity: queue_capacity.max(1),
            default_suggestion_count: default_suggestion_count.clamp(1, MAX_SUGGESTION_COUNT),
        }
    }
}
