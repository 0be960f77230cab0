//! Integration tests for the job endpoints.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use common::{body_json, build_test_app, build_test_app_with_queue, get, job_body, post, post_json};
use drape_core::job::SuggestionPatch;
use drape_core::types::JobId;
use drape_db::JobStore;

async fn create_job(app: &common::TestApp) -> JobId {
    let response = post_json(&app.router, "/api/v1/jobs", job_body()).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    json["data"]["job_id"].as_str().unwrap().parse().unwrap()
}

// ---------------------------------------------------------------------------
// Test: POST /api/v1/jobs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_job_returns_id_and_queues_first_suggestion() {
    let mut app = build_test_app();
    let job_id = create_job(&app).await;

    let queued = tokio::time::timeout(Duration::from_secs(5), app.receiver.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(queued.job_id, job_id);
    assert_eq!(queued.suggestion_index, 0);
}

#[tokio::test]
async fn create_job_honours_suggestion_count_and_profile() {
    let app = build_test_app();
    let mut body = job_body();
    body["suggestion_count"] = 2.into();
    body["user_profile"] = serde_json::json!({ "style_preferences": ["minimalist"] });
    body["provider"] = "multimodal".into();

    let response = post_json(&app.router, "/api/v1/jobs", body).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let job_id = body_json(response).await["data"]["job_id"].as_str().unwrap().to_string();

    let json = body_json(get(&app.router, &format!("/api/v1/jobs/{job_id}")).await).await;
    assert_eq!(json["data"]["suggestions"].as_array().unwrap().len(), 2);
    assert_eq!(json["data"]["input"]["provider"], "multimodal");
}

#[tokio::test]
async fn invalid_job_is_rejected_with_validation_error() {
    let app = build_test_app();
    let mut body = job_body();
    body["garment_image_url"] = "".into();

    let response = post_json(&app.router, "/api/v1/jobs", body).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert!(json["error"].as_str().unwrap().contains("garment_image_url"));
    assert!(app.store.is_empty().await);
}

#[tokio::test]
async fn too_many_suggestions_are_rejected() {
    let app = build_test_app();
    let mut body = job_body();
    body["suggestion_count"] = 9.into();

    let response = post_json(&app.router, "/api/v1/jobs", body).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Test: status snapshots
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_returns_full_snapshot() {
    let app = build_test_app();
    let job_id = create_job(&app).await;

    let response = get(&app.router, &format!("/api/v1/status?jobId={job_id}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let job = &json["data"];
    assert_eq!(job["job_id"], job_id.to_string());
    assert_eq!(job["input"]["mode"], "simple-scene");
    assert_eq!(job["suggestions"].as_array().unwrap().len(), 3);
    assert_eq!(job["ui_ready"], false);
}

#[tokio::test]
async fn status_requires_a_valid_job_id() {
    let app = build_test_app();

    let response = get(&app.router, "/api/v1/status").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "BAD_REQUEST");

    let response = get(&app.router, "/api/v1/status?jobId=not-a-uuid").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = get(&app.router, &format!("/api/v1/status?jobId={}", JobId::new())).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

// ---------------------------------------------------------------------------
// Test: POST /api/v1/jobs/{job_id}/suggestions/{index}/generate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn generate_is_accepted_and_queued() {
    let mut app = build_test_app();
    let job_id = create_job(&app).await;
    // Drain the automatic trigger of suggestion 0.
    tokio::time::timeout(Duration::from_secs(5), app.receiver.recv())
        .await
        .unwrap();

    let response = post(&app.router, &format!("/api/v1/jobs/{job_id}/suggestions/2/generate")).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let queued = app.receiver.try_recv().unwrap();
    assert_eq!(queued.job_id, job_id);
    assert_eq!(queued.suggestion_index, 2);
}

#[tokio::test]
async fn generate_rejects_unknown_targets() {
    let app = build_test_app();
    let job_id = create_job(&app).await;

    let response = post(&app.router, &format!("/api/v1/jobs/{job_id}/suggestions/3/generate")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = post(
        &app.router,
        &format!("/api/v1/jobs/{}/suggestions/0/generate", JobId::new()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = post(&app.router, "/api/v1/jobs/nope/suggestions/0/generate").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn full_queue_returns_service_unavailable() {
    let app = build_test_app_with_queue(1);
    let job_id = create_job(&app).await;
    // Wait until preparation has queued suggestion 0 and filled the queue.
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let job = app.store.get_required(job_id).await.unwrap();
            if job.suggestions.iter().all(|s| s.style.is_some()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let response = post(&app.router, &format!("/api/v1/jobs/{job_id}/suggestions/1/generate")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["code"], "QUEUE_FULL");
}

// ---------------------------------------------------------------------------
// Test: POST /api/v1/jobs/{job_id}/cancel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_returns_no_content_then_conflict() {
    let app = build_test_app();
    let job_id = create_job(&app).await;

    let response = post(&app.router, &format!("/api/v1/jobs/{job_id}/cancel")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let json = body_json(get(&app.router, &format!("/api/v1/jobs/{job_id}")).await).await;
    assert_eq!(json["data"]["cancel_requested"], true);
    assert_eq!(json["data"]["status"], "completed");

    let response = post(&app.router, &format!("/api/v1/jobs/{job_id}/cancel")).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "CONFLICT");
}

#[tokio::test]
async fn cancel_keeps_finished_suggestions() {
    let app = build_test_app();
    let job_id = create_job(&app).await;
    app.store
        .update_suggestion(job_id, 0, &SuggestionPatch::failed("garment not detected"))
        .await
        .unwrap();

    let response = post(&app.router, &format!("/api/v1/jobs/{job_id}/cancel")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let json = body_json(get(&app.router, &format!("/api/v1/jobs/{job_id}")).await).await;
    assert_eq!(json["data"]["suggestions"][0]["error"], "garment not detected");
    assert_eq!(json["data"]["suggestions"][1]["error"], "Generation cancelled");
}
