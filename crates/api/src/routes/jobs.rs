use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(jobs::create_job))
        .route("/{job_id}", get(jobs::get_job))
        .route("/{job_id}/cancel", post(jobs::cancel_job))
        .route(
            "/{job_id}/suggestions/{index}/generate",
            post(jobs::generate_suggestion),
        )
}
