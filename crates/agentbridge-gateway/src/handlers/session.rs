//! `/initialize` and `/shutdown`.

use super::json_body;
use crate::server::GatewayState;
use crate::Result;
use agentbridge_core::{InitializeRequest, InitializeResponse, StatusResponse};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;
use tracing::{debug, info};

/// Start the session.
pub async fn initialize(
    State(state): State<Arc<GatewayState>>,
    payload: std::result::Result<Json<InitializeRequest>, JsonRejection>,
) -> Result<Json<InitializeResponse>> {
    let req = json_body(payload)?;
    debug!(working_dir = %req.working_dir.display(), auth_method = %req.auth_method, "Initialize request");

    let response = state.sessions.start(req).await?;
    info!(model = %response.model, "Session initialized");
    Ok(Json(response))
}

/// Stop the session. Always succeeds.
pub async fn shutdown(State(state): State<Arc<GatewayState>>) -> Json<StatusResponse> {
    state.sessions.stop().await;
    Json(StatusResponse::ok())
}
