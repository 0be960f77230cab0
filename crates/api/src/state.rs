use std::sync::Arc;

use drape_pipeline::GenerationService;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    /// Database pool when jobs are stored in Postgres, `None` for the
    /// in-memory store.
    pub pool: Option<drape_db::DbPool>,
    pub config: Arc<ServerConfig>,
    /// Job creation, triggering and cancellation.
    pub service: Arc<GenerationService>,
}
