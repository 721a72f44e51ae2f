//! `/query` (server-sent events) and `/approve`.

use super::json_body;
use crate::server::GatewayState;
use crate::Result;
use agentbridge_core::{ApproveRequest, QueryRequest, StatusResponse, StreamEvent};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Run a query and stream its events.
///
/// Session errors are returned before the stream opens. Once it is open,
/// every failure arrives as the terminal `error` event.
pub async fn query(
    State(state): State<Arc<GatewayState>>,
    payload: std::result::Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let req = json_body(payload)?;
    let events = state.sessions.run(req).await?;

    let stream = events.map(|event| Ok(sse_event(&event)));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Resolve a pending permission request.
pub async fn approve(
    State(state): State<Arc<GatewayState>>,
    payload: std::result::Result<Json<ApproveRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>> {
    let req = json_body(payload)?;
    let request_id = req.request_id.clone();
    let approved = req.approved;

    state.sessions.approve(req)?;
    info!(request_id = %request_id, approved, "Permission request resolved");
    Ok(Json(StatusResponse::ok()))
}

/// Encode one stream event as SSE: the kind as `event:`, the payload as `data:`.
pub(crate) fn sse_event(event: &StreamEvent) -> Event {
    let kind = event.kind();
    match event.payload_json() {
        Ok(data) => {
            debug!(event = kind, "Streaming event");
            Event::default().event(kind).data(data)
        }
        Err(e) => {
            warn!(event = kind, error = %e, "Failed to encode event payload");
            Event::default().event(kind).data("{}")
        }
    }
}
