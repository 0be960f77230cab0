use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use drape_db::{ExecutionLock, JobStore, MemoryExecutionLock, MemoryJobStore, PgExecutionLock, PgJobStore};
use drape_events::{EventBus, EventLog, GallerySink, NoopGallery, WebhookGallery};
use drape_pipeline::{
    Dispatcher, GenerationQueue, GenerationService, PipelineConfig, PipelineRunner, TemplateAdvisor,
};
use drape_provider::image::HttpImageLoader;
use drape_provider::storage::{build_blob_store, StorageConfig};
use drape_provider::{ArtifactSink, ExecutorConfig, ProviderConfig, ProviderRegistry};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use drape_api::background::lock_sweep;
use drape_api::config::ServerConfig;
use drape_api::router::build_app_router;
use drape_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "drape_api=debug,drape_pipeline=debug,drape_provider=debug,drape=info,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    let pipeline_config = PipelineConfig::from_env();
    let executor_config = ExecutorConfig::from_env();
    let provider_config = ProviderConfig::from_env();
    let storage_config = StorageConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let call_budget = executor_config.call_budget();
    if pipeline_config.lock_ttl < call_budget {
        tracing::warn!(
            lock_ttl_secs = pipeline_config.lock_ttl.as_secs(),
            call_budget_secs = call_budget.as_secs(),
            "LOCK_TTL_SECS is shorter than one provider call; a stalled lock heartbeat \
             would let a duplicate run start",
        );
    }

    // --- Job store and execution lock ---
    let (pool, store, lock, pg_lock) = match &config.database_url {
        Some(database_url) => {
            let pool = drape_db::create_pool(database_url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Database connection pool created");

            drape_db::health_check(&pool)
                .await
                .expect("Database health check failed");

            drape_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations applied");

            let pg_lock = PgExecutionLock::new(pool.clone());
            (
                Some(pool.clone()),
                Arc::new(PgJobStore::new(pool)) as Arc<dyn JobStore>,
                Arc::new(pg_lock.clone()) as Arc<dyn ExecutionLock>,
                Some(pg_lock),
            )
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory job store");
            (
                None,
                Arc::new(MemoryJobStore::new()) as Arc<dyn JobStore>,
                Arc::new(MemoryExecutionLock::new()) as Arc<dyn ExecutionLock>,
                None,
            )
        }
    };

    // --- Providers ---
    let blobs = build_blob_store(&storage_config)
        .await
        .expect("Failed to initialise blob store");
    let sink = ArtifactSink::new(Arc::new(HttpImageLoader::new()), blobs);
    let providers = Arc::new(ProviderRegistry::from_config(
        &provider_config,
        &executor_config,
        sink,
    ));
    tracing::info!(default_provider = %providers.default_provider(), "Provider registry ready");

    // --- Gallery ---
    let gallery: Arc<dyn GallerySink> = match &config.gallery_webhook_url {
        Some(url) => {
            tracing::info!(%url, "Gallery webhook configured");
            Arc::new(WebhookGallery::new(url.clone()))
        }
        None => Arc::new(NoopGallery),
    };

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());
    let event_log_handle = tokio::spawn(EventLog::run(event_bus.subscribe()));

    // --- Pipeline ---
    let runner = Arc::new(PipelineRunner::new(
        Arc::clone(&store),
        lock,
        providers,
        gallery,
        Arc::clone(&event_bus),
        pipeline_config.lock_ttl,
    ));
    let (queue, receiver) = GenerationQueue::channel(pipeline_config.queue_capacity);
    let dispatcher_cancel = CancellationToken::new();
    let dispatcher = Dispatcher::new(runner, pipeline_config.max_concurrent_runs)
        .with_drain_timeout(Duration::from_secs(config.shutdown_timeout_secs));
    let dispatcher_handle = tokio::spawn(dispatcher.run(receiver, dispatcher_cancel.clone()));

    // --- Background tasks ---
    let background_cancel = CancellationToken::new();
    if let Some(pg_lock) = pg_lock {
        tokio::spawn(lock_sweep::run(
            pg_lock,
            lock_sweep::SWEEP_INTERVAL,
            background_cancel.clone(),
        ));
    }

    let service = Arc::new(GenerationService::new(
        store,
        Arc::new(TemplateAdvisor),
        queue,
        Arc::clone(&event_bus),
        pipeline_config.default_suggestion_count,
    ));

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        service,
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    background_cancel.cancel();

    // In-flight generations get the drain window, then are aborted.
    dispatcher_cancel.cancel();
    if let Err(e) = dispatcher_handle.await {
        tracing::error!(error = %e, "Dispatcher task ended abnormally");
    }
    tracing::info!("Generation dispatcher stopped");

    drop(event_bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), event_log_handle).await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
