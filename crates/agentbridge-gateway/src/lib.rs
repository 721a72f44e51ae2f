//! HTTP gateway for agentbridge.
//!
//! Exposes the session engine over five routes:
//! - `POST /initialize` starts the single session
//! - `POST /query` streams one turn as server-sent events
//! - `POST /approve` resolves a pending tool permission
//! - `POST /shutdown` stops the session
//! - `GET /health` reports session state

pub mod error;
pub mod handlers;
pub mod server;

pub use error::GatewayError;
pub use handlers::HealthResponse;
pub use server::{shutdown_signal, Gateway, GatewayConfig, GatewayState, DEFAULT_PORT};

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
