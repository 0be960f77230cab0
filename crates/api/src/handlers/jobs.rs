//! Handlers for the `/jobs` resource and the status endpoint.

use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use drape_core::job::JobInput;
use drape_core::types::{JobId, SuggestionIndex};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of `POST /jobs`.
#[derive(Debug, Deserialize)]
pub struct CreateJob {
    #[serde(flatten)]
    pub input: JobInput,
    #[serde(default)]
    pub suggestion_count: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct CreatedJob {
    pub job_id: JobId,
}

/// Query of `GET /status`.
#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    #[serde(rename = "jobId")]
    pub job_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Validates and persists the job, then returns 201. Suggestion text is
/// prepared in the background and suggestion 0 is queued once it exists.
pub async fn create_job(
    State(state): State<AppState>,
    Json(body): Json<CreateJob>,
) -> AppResult<impl IntoResponse> {
    let job = state
        .service
        .create_job(body.input, body.suggestion_count)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: CreatedJob { job_id: job.job_id },
        }),
    ))
}

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{job_id}/suggestions/{index}/generate
///
/// Queues the pipeline run and returns 202 without waiting for it.
pub async fn generate_suggestion(
    State(state): State<AppState>,
    Path((job_id, index)): Path<(JobId, SuggestionIndex)>,
) -> AppResult<StatusCode> {
    state.service.trigger(job_id, index).await?;
    tracing::info!(%job_id, suggestion_index = index, "Generation triggered");
    Ok(StatusCode::ACCEPTED)
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// GET /api/v1/status?jobId=...
pub async fn get_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> AppResult<impl IntoResponse> {
    let raw = query
        .job_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("jobId is required".into()))?;
    let job_id = JobId::from_str(raw.trim())
        .map_err(|_| AppError::BadRequest(format!("jobId '{raw}' is not a valid id")))?;

    let job = state.service.get(job_id).await?;
    Ok(Json(DataResponse { data: job }))
}

/// GET /api/v1/jobs/{job_id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = state.service.get(job_id).await?;
    Ok(Json(DataResponse { data: job }))
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{job_id}/cancel
///
/// Returns 204; 409 once every suggestion has already finished.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<StatusCode> {
    state.service.cancel(job_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
