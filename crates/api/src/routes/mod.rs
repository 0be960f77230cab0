pub mod health;
pub mod jobs;

use axum::routing::get;
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /jobs                                             create (POST)
/// /jobs/{job_id}                                    snapshot (GET)
/// /jobs/{job_id}/cancel                             cancel (POST)
/// /jobs/{job_id}/suggestions/{index}/generate       trigger (POST)
/// /status?jobId=                                    snapshot (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/jobs", jobs::router())
        .route("/status", get(handlers::jobs::get_status))
}
