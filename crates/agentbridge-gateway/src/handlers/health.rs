//! `/health`.

use crate::server::GatewayState;
use agentbridge_core::AuthMethod;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok` with an active session, otherwise `not_initialized`.
    pub status: &'static str,

    pub working_dir: Option<PathBuf>,
    pub auth_method: Option<AuthMethod>,
    pub model: Option<String>,

    /// Last runtime-assigned session id.
    pub session_id: Option<String>,

    pub query_active: bool,
    pub pending_approvals: usize,

    /// Server version.
    pub version: &'static str,

    /// Uptime in seconds.
    pub uptime_seconds: u64,
}

/// Report session state.
pub async fn health(State(state): State<Arc<GatewayState>>) -> Json<HealthResponse> {
    let status = state.sessions.status().await;
    let session = status.session.as_ref();

    Json(HealthResponse {
        status: if session.is_some() { "ok" } else { "not_initialized" },
        working_dir: session.map(|s| s.working_dir.clone()),
        auth_method: session.map(|s| s.auth_method),
        model: session.map(|s| s.model.clone()),
        session_id: status.session_id,
        query_active: status.query_active,
        pending_approvals: status.pending_approvals,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}
