use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use drape_core::error::CoreError;
use drape_db::StoreError;
use drape_pipeline::PipelineError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Produces the `{ "error": ..., "code": ... }` JSON body for every failure.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core_error(core),
            AppError::Pipeline(err) => match err.as_core() {
                Some(core) => classify_core_error(core),
                None => classify_pipeline_error(err),
            },
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn classify_core_error(core: &CoreError) -> (StatusCode, &'static str, String) {
    match core {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            internal()
        }
    }
}

fn classify_pipeline_error(err: &PipelineError) -> (StatusCode, &'static str, String) {
    match err {
        PipelineError::QueueFull => (
            StatusCode::SERVICE_UNAVAILABLE,
            "QUEUE_FULL",
            err.to_string(),
        ),
        PipelineError::QueueClosed => (
            StatusCode::SERVICE_UNAVAILABLE,
            "UNAVAILABLE",
            "The server is shutting down".to_string(),
        ),
        PipelineError::Store(StoreError::Database(e)) => {
            tracing::error!(error = %e, "Database error");
            internal()
        }
        other => {
            tracing::error!(error = %other, "Pipeline error");
            internal()
        }
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn domain_errors_map_to_client_statuses() {
        assert_eq!(
            status_of(CoreError::job_not_found(drape_core::types::JobId::new()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(CoreError::Validation("occasion must not be empty".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(PipelineError::Store(StoreError::Core(CoreError::Conflict("done".into()))).into()),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn queue_backpressure_is_service_unavailable() {
        assert_eq!(status_of(PipelineError::QueueFull.into()), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_of(PipelineError::QueueClosed.into()), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn internal_details_are_not_leaked() {
        assert_eq!(
            status_of(CoreError::Internal("pool exhausted".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
