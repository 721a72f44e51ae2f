//! Shared harness for the integration tests.

use agentbridge_agent::testing::{RecordingEnvironment, ScriptedRuntime};
use agentbridge_agent::{ProcessEnvironment, SessionManager, SessionSettings};
use agentbridge_gateway::{Gateway, GatewayConfig};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// A gateway router wired to a scripted runtime.
pub struct Harness {
    pub router: Router,
    pub runtime: ScriptedRuntime,
    pub environment: Arc<RecordingEnvironment>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(SessionSettings::default())
    }

    pub fn with_approval_timeout(timeout: Duration) -> Self {
        Self::with_settings(SessionSettings {
            approval_timeout: timeout,
            ..SessionSettings::default()
        })
    }

    fn with_settings(settings: SessionSettings) -> Self {
        let runtime = ScriptedRuntime::new();
        let environment = Arc::new(RecordingEnvironment::new());
        let process_env: Arc<dyn ProcessEnvironment> = environment.clone();
        let sessions = SessionManager::new(Arc::new(runtime.clone()), process_env, settings);
        let router = Gateway::new(GatewayConfig::default(), Arc::new(sessions)).router();
        Self {
            router,
            runtime,
            environment,
        }
    }

    /// Send a JSON POST and decode the JSON reply.
    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(req).await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.send(req).await
    }

    /// Open a `/query` stream without reading it.
    pub async fn open_query(&self, body: Value) -> axum::response::Response {
        let req = Request::builder()
            .method("POST")
            .uri("/query")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.router.clone().oneshot(req).await.unwrap()
    }

    /// Run a query to completion and return its `(event, data)` pairs.
    pub async fn query(&self, body: Value) -> Vec<(String, Value)> {
        let resp = self.open_query(body).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        parse_sse(std::str::from_utf8(&bytes).unwrap())
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse `event:`/`data:` pairs out of an SSE body. Keep-alive comments are skipped.
pub fn parse_sse(body: &str) -> Vec<(String, Value)> {
    body.split("\n\n")
        .filter_map(|block| {
            let mut event = None;
            let mut data = None;
            for line in block.lines() {
                if let Some(v) = line.strip_prefix("event:") {
                    event = Some(v.trim().to_string());
                } else if let Some(v) = line.strip_prefix("data:") {
                    data = serde_json::from_str(v.trim()).ok();
                }
            }
            Some((event?, data?))
        })
        .collect()
}

/// Event kinds in stream order.
pub fn kinds(events: &[(String, Value)]) -> Vec<&str> {
    events.iter().map(|(kind, _)| kind.as_str()).collect()
}
