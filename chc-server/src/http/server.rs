//! Axum server setup
//!
//! Server skeleton with:
//! - Localhost-only CORS by default
//! - Tracing, request timeout and upload size limit
//! - Graceful shutdown on SIGTERM/Ctrl+C

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::Router;
use chc_core::models::CompanyId;
use chc_core::{ChcConfig, ConfigError};
use chrono_tz::Tz;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::routes;

/// Origins allowed when CORS is not permissive
const LOCAL_ORIGINS: [&str; 6] = [
    "http://localhost:3000",
    "http://localhost:5173",
    "http://localhost:8000",
    "http://127.0.0.1:3000",
    "http://127.0.0.1:5173",
    "http://127.0.0.1:8000",
];

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (default: 127.0.0.1:8000)
    pub bind_addr: SocketAddr,

    /// Allow permissive CORS (default: false = localhost only)
    pub cors_permissive: bool,

    pub request_timeout: Duration,

    /// Largest accepted request body, multipart uploads included
    pub max_upload_bytes: usize,

    /// Zone used to turn `date=` filters into UTC ranges
    pub timezone: Tz,

    pub default_company: CompanyId,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            cors_permissive: false,
            request_timeout: Duration::from_secs(30),
            max_upload_bytes: 20 * 1024 * 1024,
            timezone: Tz::UTC,
            default_company: CompanyId::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_config(config: &ChcConfig) -> Result<Self, ServerError> {
        let bind_addr = config
            .server
            .bind
            .parse()
            .map_err(|source| ServerError::InvalidBind {
                addr: config.server.bind.clone(),
                source,
            })?;

        Ok(Self {
            bind_addr,
            cors_permissive: config.server.cors_permissive,
            request_timeout: Duration::from_secs(config.server.request_timeout_secs),
            max_upload_bytes: config.server.max_upload_bytes,
            timezone: config.timezone()?,
            default_company: config.default_company()?,
        })
    }
}

/// Shared application state
pub struct AppState {
    pub pool: PgPool,
    pub tz: Tz,
    pub default_company: CompanyId,
}

impl AppState {
    pub fn new(pool: PgPool, config: &ServerConfig) -> Self {
        Self {
            pool,
            tz: config.timezone,
            default_company: config.default_company.clone(),
        }
    }
}

/// Build the application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    let cors = if config.cors_permissive {
        tracing::warn!("CORS: Permissive mode enabled - all origins allowed");
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(LOCAL_ORIGINS.map(HeaderValue::from_static))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .merge(routes::health::router())
        .merge(routes::auth::router())
        .merge(routes::catalog::router())
        .merge(routes::registration::router())
        .merge(routes::samples::router())
        .merge(routes::batches::router())
        .merge(routes::investigations::router())
        .merge(routes::files::router())
        .merge(routes::listings::router())
        .merge(routes::dashboard::router())
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server.
///
/// # Example
///
/// ```ignore
/// let pool = create_pool(&config.database.url).await?;
/// run_server(pool, ServerConfig::from_config(&config)?).await?;
/// ```
pub async fn run_server(pool: PgPool, config: ServerConfig) -> Result<(), ServerError> {
    let state = Arc::new(AppState::new(pool, &config));
    tracing::info!(
        timezone = %config.timezone,
        company = config.default_company.as_str(),
        "app state ready"
    );
    let app = build_router(state, &config);

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting shutdown");
        }
    }
}

/// Server error type
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid bind address '{addr}': {source}")]
    InvalidBind {
        addr: String,
        source: std::net::AddrParseError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Router over a pool that never connects, for handler paths that fail
/// before touching the database.
#[cfg(test)]
pub(crate) fn test_app() -> Router {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(200))
        .connect_lazy("postgres://localhost/chc_test")
        .expect("lazy pool");
    let config = ServerConfig::default();
    build_router(Arc::new(AppState::new(pool, &config)), &config)
}
