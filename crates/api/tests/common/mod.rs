#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;

use drape_api::config::ServerConfig;
use drape_api::router::build_app_router;
use drape_api::state::AppState;
use drape_db::MemoryJobStore;
use drape_events::EventBus;
use drape_pipeline::{GenerationQueue, GenerationRequest, GenerationService, TemplateAdvisor};

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        database_url: None,
        gallery_webhook_url: None,
    }
}

/// A router over in-memory stores. No dispatcher drains the queue, so
/// triggered runs stay queued in `receiver` for inspection.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryJobStore>,
    pub receiver: mpsc::Receiver<GenerationRequest>,
}

pub fn build_test_app() -> TestApp {
    build_test_app_with_queue(16)
}

pub fn build_test_app_with_queue(queue_capacity: usize) -> TestApp {
    let config = test_config();
    let store = Arc::new(MemoryJobStore::new());
    let (queue, receiver) = GenerationQueue::channel(queue_capacity);
    let service = GenerationService::new(
        store.clone(),
        Arc::new(TemplateAdvisor),
        queue,
        Arc::new(EventBus::default()),
        3,
    );

    let state = AppState {
        pool: None,
        config: Arc::new(config.clone()),
        service: Arc::new(service),
    };

    TestApp {
        router: build_app_router(state, &config),
        store,
        receiver,
    }
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, Body::empty()).await
}

pub async fn post(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::POST, uri, Body::empty()).await
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

async fn send(app: &Router, method: Method, uri: &str, body: Body) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(body)
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn job_body() -> Value {
    serde_json::json!({
        "human_image_url": "https://img.test/person.jpg",
        "garment_image_url": "https://img.test/jacket.jpg",
        "occasion": "Job interview",
        "mode": "simple-scene",
    })
}
