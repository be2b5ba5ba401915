//! Task Store API
//!
//! A task-management HTTP service backed by an atomically rewritten JSON file.
//!
//! # Environment Variables
//!
//! - `STORAGE_MODE`: `file` (default) | `in_memory`
//! - `TASKS_FILE`: path of the task file (default: `tasks.json`)
//! - `MAX_TASKS`: maximum number of tasks (default: `1000`)
//! - `MAX_FILE_SIZE`: maximum task file size in bytes (default: `10485760`)
//! - `TASKS_FILE_FORMAT`: `pretty` (default) | `compact`
//! - `AUTH_MODE`: `disabled` (default) | `static` | `remote`
//! - `AUTH_STATIC_TOKENS`: `token:user-id:role,...` (static mode)
//! - `IDENTITY_URL`, `IDENTITY_ANON_KEY`, `IDENTITY_SERVICE_KEY`: identity service (remote mode)
//! - `IDENTITY_TIMEOUT_MS`: identity request timeout (default: `5000`)
//! - `RATE_LIMIT_MAX_REQUESTS`, `RATE_LIMIT_WINDOW_SECS`: per-IP limit on all
//!   routes except `/health` (default: `100` per `900` seconds)
//! - `HEALTH_RATE_LIMIT_MAX_REQUESTS`, `HEALTH_RATE_LIMIT_WINDOW_MS`: per-IP
//!   limit on `/health` (default: `20` per `1000` ms)
//! - `RUST_LOG`: Logging level (e.g., `debug`, `task_store_api=debug`)
//! - `LOG_FORMAT`: `text` (default) | `json`
//! - `HOST`: Server host address (default: `0.0.0.0`)
//! - `PORT`: Server port (default: `3000`)

use std::env;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use task_store_api::api::{AppState, RateLimitConfig, RateLimits, build_router};
use task_store_api::infrastructure::{AuthConfig, FactoryError, RepositoryConfig, RepositoryFactory};

/// Address the server listens on.
struct ServerConfig {
    host: String,
    port: u16,
}

impl ServerConfig {
    fn from_env() -> Self {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|port| port.trim().parse().ok())
            .unwrap_or(3000);
        Self { host, port }
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "task_store_api=debug,tower_http=debug".into()),
    );
    if env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting Task Store API");

    let config = match RepositoryConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            tracing::error!("Configuration error: {}", error);
            std::process::exit(1);
        }
    };

    tracing::info!(
        storage_mode = ?config.storage_mode,
        tasks_file = %config.store.path.display(),
        max_tasks = config.store.max_tasks,
        max_file_size = config.store.max_file_size,
        "Repository configuration loaded"
    );

    let repositories = match RepositoryFactory::new(config).create().await {
        Ok(repositories) => {
            tracing::info!("Repositories initialized successfully");
            repositories
        }
        Err(error) => {
            tracing::error!("Failed to initialize repositories: {}", error);
            std::process::exit(1);
        }
    };

    let identity_provider = match AuthConfig::from_env()
        .map_err(FactoryError::from)
        .and_then(|auth| {
            tracing::info!(auth_mode = ?auth.mode(), "Authentication configuration loaded");
            auth.identity_provider()
        }) {
        Ok(provider) => provider,
        Err(error) => {
            tracing::error!("Failed to initialize authentication: {}", error);
            std::process::exit(1);
        }
    };

    let rate_limits = match RateLimitConfig::from_env() {
        Ok(rate_limits) => {
            tracing::info!(
                max_requests = rate_limits.global.max_requests,
                window_secs = rate_limits.global.window.as_secs(),
                "Rate limit configuration loaded"
            );
            RateLimits::new(rate_limits)
        }
        Err(error) => {
            tracing::error!("Configuration error: {}", error);
            std::process::exit(1);
        }
    };

    let application_state = AppState::from_repositories(repositories)
        .with_identity_provider(identity_provider)
        .with_rate_limits(rate_limits);
    let application = build_router(application_state);

    let ServerConfig { host, port } = ServerConfig::from_env();
    let address: SocketAddr = match format!("{host}:{port}").parse() {
        Ok(address) => address,
        Err(error) => {
            tracing::error!(%error, "Invalid server address: {}:{}", host, port);
            std::process::exit(1);
        }
    };

    let listener = match TcpListener::bind(address).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!(%error, "Failed to bind to address {}", address);
            std::process::exit(1);
        }
    };

    match listener.local_addr() {
        Ok(address) => tracing::info!("Listening on {}", address),
        Err(error) => tracing::warn!(%error, "Could not determine local address"),
    }

    if let Err(error) = axum::serve(
        listener,
        application.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    {
        tracing::error!(%error, "Server error");
        std::process::exit(1);
    }

    tracing::info!("Server shutdown complete");
}

/// Completes when SIGINT or, on Unix, SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::warn!(%error, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::warn!(%error, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
