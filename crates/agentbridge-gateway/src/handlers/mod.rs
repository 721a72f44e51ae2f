//! HTTP route handlers.
//!
//! Handlers are thin: they decode the body, call the session manager, and map
//! its errors through [`GatewayError`](crate::error::GatewayError).

pub mod health;
pub mod query;
pub mod session;

use crate::error::GatewayError;
use axum::extract::rejection::JsonRejection;
use axum::Json;

pub use health::{health, HealthResponse};
pub use query::{approve, query};
pub use session::{initialize, shutdown};

/// Unwrap a JSON body, turning decode failures into a 400.
pub(crate) fn json_body<T>(
    payload: std::result::Result<Json<T>, JsonRejection>,
) -> crate::Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| GatewayError::InvalidParams(rejection.body_text()))
}
