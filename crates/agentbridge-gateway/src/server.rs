//! HTTP gateway server.

use crate::error::GatewayError;
use crate::handlers;
use crate::Result;
use agentbridge_agent::SessionManager;
use agentbridge_core::config::ServerConfig;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Default gateway port.
pub const DEFAULT_PORT: u16 = 8765;

/// Origins allowed by CORS, with any port.
const LOOPBACK_ORIGINS: &[&str] = &[
    "http://localhost",
    "http://127.0.0.1",
    "https://localhost",
    "https://127.0.0.1",
];

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bind host.
    pub host: String,

    /// Port number.
    pub port: u16,

    /// Enable CORS for loopback origins.
    pub cors: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            cors: true,
        }
    }
}

impl From<&ServerConfig> for GatewayConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            cors: config.cors,
        }
    }
}

/// State shared by every handler.
pub struct GatewayState {
    /// The session engine.
    pub sessions: Arc<SessionManager>,

    /// Server start time.
    pub started_at: Instant,
}

/// The HTTP gateway.
pub struct Gateway {
    state: Arc<GatewayState>,
    config: GatewayConfig,
}

impl Gateway {
    /// Create a gateway serving `sessions`.
    pub fn new(config: GatewayConfig, sessions: Arc<SessionManager>) -> Self {
        let state = Arc::new(GatewayState {
            sessions,
            started_at: Instant::now(),
        });
        Self { state, config }
    }

    /// The session engine behind this gateway.
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.state.sessions
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already-bound listener until `shutdown` resolves.
    ///
    /// The active session is stopped once the signal fires, before in-flight
    /// connections are drained.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local: SocketAddr = listener.local_addr()?;
        if !local.ip().is_loopback() {
            warn!("Gateway is bound to {}, which is reachable from the network", local);
        }
        info!("Starting gateway server on {}", local);

        let sessions = Arc::clone(&self.state.sessions);
        let signal = async move {
            shutdown.await;
            info!("Shutdown signal received, stopping session");
            sessions.stop().await;
        };

        axum::serve(listener, self.router())
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| GatewayError::Internal(e.to_string()))?;

        // Covers a server that stopped without the signal firing.
        self.state.sessions.stop().await;
        info!("Gateway stopped");
        Ok(())
    }

    /// Build the router.
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route("/initialize", post(handlers::initialize))
            .route("/query", post(handlers::query))
            .route("/approve", post(handlers::approve))
            .route("/shutdown", post(handlers::shutdown))
            .route("/health", get(handlers::health))
            .with_state(Arc::clone(&self.state))
            .layer(TraceLayer::new_for_http());

        if self.config.cors {
            router = router.layer(cors_layer());
        }

        router
    }
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _| {
            origin.to_str().map(is_loopback_origin).unwrap_or(false)
        }))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600))
}

fn is_loopback_origin(origin: &str) -> bool {
    LOOPBACK_ORIGINS.iter().any(|allowed| {
        origin
            .strip_prefix(allowed)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(':'))
    })
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
