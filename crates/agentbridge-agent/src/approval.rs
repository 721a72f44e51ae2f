//! Tool approval workflow.
//!
//! The broker parks each gated tool call on a one-shot slot keyed by a
//! correlation id, announces it on the armed query's channel, and waits for
//! `/approve` or the timeout. Entries are removed exactly once: on decision,
//! on timeout, or when the waiting call is dropped.

use crate::error::AgentError;
use crate::runtime::{PermissionDecision, PermissionHandler};
use crate::Result;
use agentbridge_core::{ApproveRequest, PermissionRequestEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Default time a tool call waits for a decision.
pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(60);

/// Deny reason when the client refuses without saying why.
pub const DENIED_MESSAGE: &str = "User denied permission";

/// Deny reason when nobody answers in time.
pub const TIMEOUT_MESSAGE: &str = "Permission request timed out waiting for approval";

/// Deny reason when the query ends while a decision is outstanding.
pub const CANCELLED_MESSAGE: &str = "Query ended before permission was granted";

/// Correlates permission requests with their decisions.
pub struct ApprovalBroker {
    /// Waiting tool calls by correlation id.
    pending: Mutex<HashMap<String, PendingApproval>>,

    /// Channel of the armed query, tagged with its generation.
    armed: Mutex<Option<(u64, mpsc::UnboundedSender<PermissionRequestEvent>)>>,

    /// Generation counter for `arm`.
    generation: AtomicU64,

    /// Sequence number that keeps ids unique within a millisecond.
    seq: AtomicU64,

    /// How long a request waits for a decision.
    timeout: Duration,
}

struct PendingApproval {
    request: ApprovalRequest,
    generation: u64,
    tx: oneshot::Sender<ApprovalResponse>,
}

impl Default for ApprovalBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl ApprovalBroker {
    /// Create a broker with the default timeout.
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            armed: Mutex::new(None),
            generation: AtomicU64::new(0),
            seq: AtomicU64::new(0),
            timeout: DEFAULT_APPROVAL_TIMEOUT,
        }
    }

    /// Set the decision timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The decision timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start gating tool calls for a query.
    ///
    /// Until the returned channel is dropped, requests are announced on it and
    /// wait for a decision. Dropping it disarms the broker and denies anything
    /// still waiting from this arming.
    pub fn arm(self: &Arc<Self>) -> ApprovalChannel {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = mpsc::unbounded_channel();

        if self.armed.lock().replace((generation, tx)).is_some() {
            warn!("Approval broker re-armed while a previous query was still armed");
        }
        debug!(generation, "Approval broker armed");

        ApprovalChannel {
            broker: Arc::clone(self),
            generation,
            rx,
        }
    }

    /// Whether a query is currently armed.
    pub fn is_armed(&self) -> bool {
        self.armed.lock().is_some()
    }

    /// Ask for permission to run a tool.
    ///
    /// Auto-allows when no query is armed. Otherwise waits for
    /// [`resolve`](Self::resolve) or the timeout, and denies on timeout.
    pub async fn request(&self, tool_name: &str, input: Value) -> PermissionDecision {
        let Some((generation, notify)) = self.armed.lock().clone() else {
            debug!(tool = %tool_name, "No query armed, auto-allowing");
            return PermissionDecision::Allow {
                updated_input: input,
            };
        };

        let request = ApprovalRequest {
            id: self.next_id(tool_name),
            tool_name: tool_name.to_string(),
            input: input.clone(),
            requested_at: Utc::now(),
        };
        let id = request.id.clone();

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(
            id.clone(),
            PendingApproval {
                request: request.clone(),
                generation,
                tx,
            },
        );
        let _guard = PendingGuard { broker: self, id: &id };

        let event = PermissionRequestEvent {
            request_id: id.clone(),
            tool_name: request.tool_name,
            input: request.input,
        };
        if notify.send(event).is_err() {
            debug!(request_id = %id, "Query channel closed before request was announced");
            return PermissionDecision::Deny {
                message: CANCELLED_MESSAGE.to_string(),
            };
        }

        info!(request_id = %id, tool = %tool_name, "Waiting for approval");

        let response = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => ApprovalResponse::deny().with_message(CANCELLED_MESSAGE),
            Err(_) => {
                warn!(
                    request_id = %id,
                    timeout_secs = self.timeout.as_secs(),
                    "Approval timed out, denying"
                );
                ApprovalResponse::deny().with_message(TIMEOUT_MESSAGE)
            }
        };

        debug!(request_id = %id, approved = response.approved, "Approval resolved");
        response.into_decision(input)
    }

    /// Deliver a decision for a pending request.
    pub fn resolve(&self, id: &str, response: ApprovalResponse) -> Result<()> {
        let entry = self
            .pending
            .lock()
            .remove(id)
            .ok_or_else(|| AgentError::ApprovalNotFound(id.to_string()))?;

        entry
            .tx
            .send(response)
            .map_err(|_| AgentError::ApprovalNotFound(id.to_string()))
    }

    /// Number of requests waiting for a decision.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Requests waiting for a decision, oldest first.
    pub fn list_pending(&self) -> Vec<ApprovalRequest> {
        let mut list: Vec<ApprovalRequest> = self
            .pending
            .lock()
            .values()
            .map(|p| p.request.clone())
            .collect();
        list.sort_by_key(|r| r.requested_at);
        list
    }

    fn next_id(&self, tool_name: &str) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!(
            "perm_{}_{}_{}",
            Utc::now().timestamp_millis(),
            seq,
            tool_name
        )
    }

    fn disarm(&self, generation: u64) {
        {
            let mut armed = self.armed.lock();
            if matches!(armed.as_ref(), Some((g, _)) if *g == generation) {
                *armed = None;
            }
        }

        let orphaned: Vec<PendingApproval> = {
            let mut pending = self.pending.lock();
            let ids: Vec<String> = pending
                .iter()
                .filter(|(_, p)| p.generation == generation)
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| pending.remove(id)).collect()
        };

        for entry in orphaned {
            debug!(request_id = %entry.request.id, "Denying approval left by finished query");
            let _ = entry
                .tx
                .send(ApprovalResponse::deny().with_message(CANCELLED_MESSAGE));
        }
        debug!(generation, "Approval broker disarmed");
    }
}

#[async_trait]
impl PermissionHandler for ApprovalBroker {
    async fn can_use_tool(&self, tool_name: &str, input: Value) -> PermissionDecision {
        self.request(tool_name, input).await
    }
}

/// Removes a pending entry when its waiter goes away.
struct PendingGuard<'a> {
    broker: &'a ApprovalBroker,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.broker.pending.lock().remove(self.id);
    }
}

/// Receiving end of an armed query's permission requests.
pub struct ApprovalChannel {
    broker: Arc<ApprovalBroker>,
    generation: u64,
    rx: mpsc::UnboundedReceiver<PermissionRequestEvent>,
}

impl ApprovalChannel {
    /// Wait for the next announced request.
    pub async fn recv(&mut self) -> Option<PermissionRequestEvent> {
        self.rx.recv().await
    }

    /// Take an already-announced request without waiting.
    pub fn try_recv(&mut self) -> Option<PermissionRequestEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for ApprovalChannel {
    fn drop(&mut self) {
        self.broker.disarm(self.generation);
    }
}

/// A tool call waiting for a decision.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalRequest {
    /// Correlation id.
    pub id: String,

    /// Tool name.
    pub tool_name: String,

    /// Tool input as proposed by the agent.
    pub input: Value,

    /// When the request was made.
    pub requested_at: DateTime<Utc>,
}

/// A decision for a pending request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalResponse {
    /// Whether the tool may run.
    pub approved: bool,

    /// Replacement input, honored only when approved.
    pub updated_input: Option<Value>,

    /// Reason, honored only when denied.
    pub message: Option<String>,
}

impl ApprovalResponse {
    /// Create an approval response.
    pub fn approve() -> Self {
        Self {
            approved: true,
            updated_input: None,
            message: None,
        }
    }

    /// Create a denial response.
    pub fn deny() -> Self {
        Self {
            approved: false,
            updated_input: None,
            message: None,
        }
    }

    /// Replace the tool input.
    pub fn with_updated_input(mut self, input: Value) -> Self {
        self.updated_input = Some(input);
        self
    }

    /// Add a reason.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    fn into_decision(self, original_input: Value) -> PermissionDecision {
        if self.approved {
            PermissionDecision::Allow {
                updated_input: self.updated_input.unwrap_or(original_input),
            }
        } else {
            PermissionDecision::Deny {
                message: self.message.unwrap_or_else(|| DENIED_MESSAGE.to_string()),
            }
        }
    }
}

impl From<ApproveRequest> for ApprovalResponse {
    fn from(req: ApproveRequest) -> Self {
        if req.approved {
            Self {
                approved: true,
                updated_input: req.updated_input,
                message: None,
            }
        } else {
            Self {
                approved: false,
                updated_input: None,
                message: req.message,
            }
        }
    }
}
