//! Session lifecycle.
//!
//! One session at a time owns one runtime connection. The manager moves
//! between `uninitialized` and `active`, gates queries so only one runs at a
//! time, and hands permission decisions to the approval broker.

use crate::approval::{ApprovalBroker, DEFAULT_APPROVAL_TIMEOUT};
use crate::environment::ProcessEnvironment;
use crate::error::AgentError;
use crate::multiplexer::{stream_query, EventStream, SessionIdSlot};
use crate::prompt::build_prompt;
use crate::runtime::{AgentConnection, AgentRuntime, ConnectOptions};
use crate::Result;
use agentbridge_core::config::{AgentConfig, DEFAULT_MODEL};
use agentbridge_core::{
    auth, aws, paths, ApproveRequest, AuthMethod, InitializeRequest, InitializeResponse,
    PermissionMode, QueryRequest,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Settings that apply to every session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Model used when neither the request nor the environment names one.
    pub default_model: String,

    /// How long a permission request waits for a decision.
    pub approval_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            approval_timeout: DEFAULT_APPROVAL_TIMEOUT,
        }
    }
}

impl From<&AgentConfig> for SessionSettings {
    fn from(config: &AgentConfig) -> Self {
        Self {
            default_model: config.default_model.clone(),
            approval_timeout: Duration::from_secs(config.approval_timeout_secs),
        }
    }
}

/// Resolved configuration of the active session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub working_dir: PathBuf,
    pub auth_method: AuthMethod,

    /// Mode the client asked for. The runtime itself runs in `default`.
    pub permission_mode: PermissionMode,

    pub model: String,
    pub allowed_tools: Vec<String>,
    pub disallowed_tools: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,

    pub add_dirs: Vec<PathBuf>,

    /// Names of the injected environment variables. Values stay private.
    pub env_keys: Vec<String>,

    pub started_at: DateTime<Utc>,
}

struct ActiveSession {
    info: SessionInfo,
    connection: Arc<dyn AgentConnection>,
    session_id: SessionIdSlot,
}

/// Point-in-time view of the manager, for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    /// Present while a session is active.
    pub session: Option<SessionInfo>,

    /// Last runtime-assigned session id.
    pub session_id: Option<String>,

    pub query_active: bool,
    pub pending_approvals: usize,
}

impl SessionStatus {
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }
}

/// Owns the single session and its runtime connection.
pub struct SessionManager {
    runtime: Arc<dyn AgentRuntime>,
    environment: Arc<dyn ProcessEnvironment>,
    broker: Arc<ApprovalBroker>,
    settings: SessionSettings,
    active: Mutex<Option<ActiveSession>>,
    query_in_flight: Arc<AtomicBool>,
}

impl SessionManager {
    /// Create a manager with no active session.
    pub fn new(
        runtime: Arc<dyn AgentRuntime>,
        environment: Arc<dyn ProcessEnvironment>,
        settings: SessionSettings,
    ) -> Self {
        let broker = Arc::new(ApprovalBroker::new().with_timeout(settings.approval_timeout));
        Self {
            runtime,
            environment,
            broker,
            settings,
            active: Mutex::new(None),
            query_in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The approval broker shared by every query.
    pub fn broker(&self) -> &Arc<ApprovalBroker> {
        &self.broker
    }

    /// Start a session.
    ///
    /// Fails with [`AgentError::SessionAlreadyActive`] while one is active.
    /// Any failure leaves the manager uninitialized.
    pub async fn start(&self, req: InitializeRequest) -> Result<InitializeResponse> {
        let mut active = self.active.lock().await;
        if let Some(session) = active.as_ref() {
            return Err(AgentError::SessionAlreadyActive(
                session.info.working_dir.display().to_string(),
            ));
        }

        let auth_method = req.auth()?;
        let working_dir = paths::validate_working_dir(&req.working_dir)?;
        let env = auth::resolve_env(auth_method, &req);
        let model = auth::resolve_model(req.model.as_deref(), &env, &self.settings.default_model);

        if auth_method == AuthMethod::Bedrock {
            tokio::spawn(async {
                let status = aws::detect_credentials().await;
                if !status.available {
                    warn!(
                        source = ?status.source,
                        "No usable AWS credentials found for Bedrock session"
                    );
                }
            });
        }

        self.environment.apply(&working_dir, &env)?;

        info!(
            working_dir = %working_dir.display(),
            auth_method = %auth_method,
            model = %model,
            requested_permission_mode = %req.permission_mode,
            "Starting session (runtime permission mode: default)"
        );

        let info = SessionInfo {
            working_dir: working_dir.clone(),
            auth_method,
            permission_mode: req.permission_mode,
            model: model.clone(),
            allowed_tools: req.allowed_tools.clone().unwrap_or_default(),
            disallowed_tools: req.disallowed_tools.clone().unwrap_or_default(),
            system_prompt: req.system_prompt.clone(),
            max_turns: req.max_turns,
            add_dirs: req.add_dirs.clone(),
            env_keys: env.keys().into_iter().map(str::to_string).collect(),
            started_at: Utc::now(),
        };

        let options = ConnectOptions {
            working_dir,
            model,
            permission_mode: PermissionMode::Default,
            allowed_tools: info.allowed_tools.clone(),
            disallowed_tools: info.disallowed_tools.clone(),
            system_prompt: info.system_prompt.clone(),
            max_turns: info.max_turns,
            add_dirs: info.add_dirs.clone(),
            env,
        };

        let connection = match self.runtime.connect(options, self.broker.clone()).await {
            Ok(connection) => connection,
            Err(e) => {
                warn!(error = %e, "Session start failed");
                return Err(e);
            }
        };

        let response = InitializeResponse {
            status: "ok".to_string(),
            working_dir: info.working_dir.clone(),
            auth_method: info.auth_method,
            permission_mode: info.permission_mode,
            model: info.model.clone(),
        };

        *active = Some(ActiveSession {
            info,
            connection,
            session_id: SessionIdSlot::default(),
        });

        Ok(response)
    }

    /// Stop the active session. Returns whether there was one.
    ///
    /// Disconnect failures are logged. An in-flight query ends once its
    /// runtime connection is gone.
    pub async fn stop(&self) -> bool {
        let Some(session) = self.active.lock().await.take() else {
            debug!("Stop requested with no active session");
            return false;
        };

        if let Err(e) = session.connection.disconnect().await {
            warn!(error = %e, "Failed to close runtime connection");
        }
        info!(working_dir = %session.info.working_dir.display(), "Session stopped");
        true
    }

    /// Run a query on the active session.
    pub async fn run(&self, req: QueryRequest) -> Result<EventStream> {
        let active = self.active.lock().await;
        let session = active.as_ref().ok_or(AgentError::SessionNotActive)?;

        let guard = QueryGuard::acquire(&self.query_in_flight)?;
        let prompt = build_prompt(&req.prompt, req.context.as_ref());

        info!(prompt_len = prompt.len(), "Running query");

        Ok(stream_query(
            Arc::clone(&session.connection),
            prompt,
            self.broker.arm(),
            Arc::clone(&session.session_id),
            guard,
        ))
    }

    /// Resolve a pending permission request.
    pub fn approve(&self, req: ApproveRequest) -> Result<()> {
        let id = req.request_id.clone();
        self.broker.resolve(&id, req.into())
    }

    /// Snapshot of the current state.
    pub async fn status(&self) -> SessionStatus {
        let active = self.active.lock().await;
        SessionStatus {
            session: active.as_ref().map(|s| s.info.clone()),
            session_id: active.as_ref().and_then(|s| s.session_id.lock().clone()),
            query_active: self.query_in_flight.load(Ordering::SeqCst),
            pending_approvals: self.broker.pending_count(),
        }
    }
}

/// Marks a query in flight until dropped.
struct QueryGuard(Arc<AtomicBool>);

impl QueryGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| AgentError::QueryInProgress)?;
        Ok(Self(Arc::clone(flag)))
    }
}

impl Drop for QueryGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
