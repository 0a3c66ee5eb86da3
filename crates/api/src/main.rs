use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, StatusCode};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use datalift_api::config::ServerConfig;
use datalift_api::dispatcher::JobDispatcher;
use datalift_api::registry::PgJobRegistry;
use datalift_api::state::AppState;
use datalift_api::{progress, routes};
use datalift_core::job::JobKind;
use datalift_driver::DriverRegistry;
use datalift_engine::{BatchTransferAction, ExecutionEngine, HttpExecutionEngine, JobRegistry};
use datalift_hub::{
    bootstrap_consumers, run_reloader, run_retry_worker, MessageHub, RegistrationRetry,
    TopicWhitelist,
};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "datalift=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = datalift_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    datalift_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    datalift_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- CORS ---
    let cors = build_cors_layer(&config);

    // Parent token for every background task.
    let background_cancel = tokio_util::sync::CancellationToken::new();

    // --- Topic whitelist + reloader ---
    let whitelist = Arc::new(TopicWhitelist::new());
    let reloader_handle = tokio::spawn(run_reloader(
        pool.clone(),
        Arc::clone(&whitelist),
        Duration::from_secs(config.topic_reload_secs),
        background_cancel.child_token(),
    ));

    // --- Message hub + declared consumers + registration retry ---
    let hub = Arc::new(MessageHub::new(Arc::clone(&whitelist)));

    let (retry, retry_rx) = RegistrationRetry::new();
    bootstrap_consumers(&hub, progress::declared_consumers(&pool), &retry);

    let retry_handle = tokio::spawn(run_retry_worker(
        Arc::clone(&hub),
        retry.clone(),
        retry_rx,
        Duration::from_secs(config.consumer_retry_backoff_secs),
        config.consumer_retry_max_attempts,
        background_cancel.child_token(),
    ));
    tracing::info!("Message hub started (consumers bootstrapped, retry worker running)");

    // --- Drivers + transfer engine adapter ---
    let drivers = Arc::new(DriverRegistry::with_builtin());
    let engine: Arc<dyn ExecutionEngine> =
        Arc::new(HttpExecutionEngine::new(config.engine_url.clone()));

    // --- Job registry + dispatcher + cascade listener ---
    let (cascade_tx, cascade_rx) = tokio::sync::mpsc::unbounded_channel();
    let registry: Arc<dyn JobRegistry> = Arc::new(PgJobRegistry::new(pool.clone(), cascade_tx));

    let batch_action = BatchTransferAction::new(
        drivers,
        engine,
        Arc::clone(&registry),
        Arc::clone(&hub),
    );
    let dispatcher = Arc::new(
        JobDispatcher::new().register_action(JobKind::Batch, Arc::new(batch_action)),
    );

    let cascade_handle = tokio::spawn(Arc::clone(&dispatcher).run_cascade_listener(
        Arc::clone(&registry),
        cascade_rx,
        background_cancel.child_token(),
    ));
    tracing::info!("Job dispatcher started (batch action registered)");

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        dispatcher: Arc::clone(&dispatcher),
    };

    // --- Request ID header name ---
    let request_id_header = HeaderName::from_static("x-request-id");

    // --- Router ---
    let app = Router::new()
        // Health check at root level (not under /api/v1).
        .merge(routes::health::router())
        // API v1 routes.
        .nest("/api/v1", routes::api_routes())
        // -- Middleware stack (applied bottom-up) --
        // Panic recovery: catch panics and return 500 JSON.
        .layer(CatchPanicLayer::new())
        // Request timeout.
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        // Propagate request ID to response.
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        // Structured request/response tracing.
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Set request ID on incoming requests.
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        // CORS.
        .layer(cors)
        // Shared state.
        .with_state(state);

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

    // Live job runs first: they may have in-flight transfers.
    dispatcher
        .shutdown(Duration::from_secs(config.shutdown_timeout_secs))
        .await;
    tracing::info!("Job dispatcher shut down");

    // Stop background tasks (reloader, retry worker, cascade listener).
    background_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), reloader_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), retry_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), cascade_handle).await;
    tracing::info!("Background tasks stopped");

    // Hub consumers last: drain anything the runs published.
    hub.shutdown();
    tracing::info!("Message hub shut down");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
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

/// Build the CORS middleware layer from server configuration.
///
/// Panics at startup if any configured origin is invalid, which is the
/// desired behaviour -- we want misconfiguration to fail fast.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{o}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
