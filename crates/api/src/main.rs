use std::net::SocketAddr;
use std::sync::Arc;

use runner_core::project_config::ProjectRegistry;
use runner_pipeline::{KedroExecutor, PipelineExecutor};
use runner_worker::{AdmissionQueue, Dispatcher, WorkerPool, WorkerPoolConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use runner_api::config::ServerConfig;
use runner_api::router::build_app_router;
use runner_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "runner_api=debug,runner_worker=debug,runner_pipeline=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env().expect("Invalid configuration");
    tracing::info!(host = %config.host, port = config.port, "Loaded server configuration");

    // --- Database ---
    let pool = runner_db::create_pool(&config.database_url)
        .await
        .expect("Failed to open database");
    tracing::info!(database_url = %config.database_url, "Database connection pool created");

    runner_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    runner_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Projects ---
    let registry = Arc::new(
        ProjectRegistry::load(&config.projects_config).expect("Failed to load project configuration"),
    );
    tracing::info!(
        path = %config.projects_config.display(),
        projects = ?registry.names(),
        "Project configuration loaded",
    );

    // --- Queue, workers, dispatcher ---
    let queue = Arc::new(AdmissionQueue::new(
        config.queue_capacity,
        config.enqueue_timeout(),
    ));
    let executor: Arc<dyn PipelineExecutor> = Arc::new(KedroExecutor::new(config.kedro_config()));
    let workers = WorkerPool::start(
        WorkerPoolConfig {
            worker_count: config.worker_count,
        },
        Arc::clone(&queue),
        pool.clone(),
        Arc::clone(&registry),
        executor,
    );
    let dispatcher = Arc::new(Dispatcher::new(
        pool.clone(),
        Arc::clone(&registry),
        Arc::clone(&queue),
    ));

    // --- App state ---
    let state = AppState {
        pool: pool.clone(),
        config: Arc::new(config.clone()),
        dispatcher,
        queue: Arc::clone(&queue),
    };
    let app = build_app_router(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!(
        queued = queue.len(),
        "Server stopped accepting connections, draining workers",
    );
    queue.close();
    workers.shutdown(config.shutdown_timeout()).await;

    pool.close().await;
    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
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
        _ = ctrl_c => tracing::info!("Received SIGINT, starting graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
