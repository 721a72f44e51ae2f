//! In-memory runtime for driving the engine without a real agent process.
//!
//! Each query plays back a script of steps. Permission steps go through the
//! connection's [`PermissionHandler`] exactly like a real runtime would, so
//! approvals, timeouts, and cancellation can be exercised end to end.

use crate::environment::ProcessEnvironment;
use crate::error::AgentError;
use crate::message::{AgentMessage, ResultMessage};
use crate::runtime::{
    AgentConnection, AgentRuntime, ConnectOptions, MessageStream, PermissionDecision,
    PermissionHandler,
};
use crate::Result;
use agentbridge_core::auth::RuntimeEnv;
use async_stream::stream;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// One step of a scripted query.
#[derive(Debug)]
pub enum ScriptStep {
    /// Emit a runtime message.
    Message(AgentMessage),

    /// Ask the permission handler and record its decision.
    Permission { tool_name: String, input: Value },

    /// Sleep before the next step.
    Delay(Duration),

    /// Fail the query with this error.
    Fail(AgentError),
}

#[derive(Default)]
struct ScriptState {
    queries: VecDeque<Vec<ScriptStep>>,
    connect_failure: Option<AgentError>,
    query_failure: Option<AgentError>,
    disconnect_failure: Option<AgentError>,
    connects: Vec<ConnectOptions>,
    prompts: Vec<String>,
    decisions: Vec<PermissionDecision>,
    interrupts: usize,
    disconnects: usize,
}

/// Runtime that replays queued scripts.
#[derive(Clone, Default)]
pub struct ScriptedRuntime {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the script for the next query. Unscripted queries emit a bare result.
    pub fn push_query(&self, steps: Vec<ScriptStep>) {
        self.state.lock().queries.push_back(steps);
    }

    /// Make the next `connect` fail.
    pub fn fail_next_connect(&self, err: AgentError) {
        self.state.lock().connect_failure = Some(err);
    }

    /// Make the next `query` call fail before streaming.
    pub fn fail_next_query(&self, err: AgentError) {
        self.state.lock().query_failure = Some(err);
    }

    /// Make the next `disconnect` fail.
    pub fn fail_next_disconnect(&self, err: AgentError) {
        self.state.lock().disconnect_failure = Some(err);
    }

    /// Options of every successful or failed `connect`, in order.
    pub fn connects(&self) -> Vec<ConnectOptions> {
        self.state.lock().connects.clone()
    }

    /// Prompts received, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.state.lock().prompts.clone()
    }

    /// Permission decisions received, in order.
    pub fn decisions(&self) -> Vec<PermissionDecision> {
        self.state.lock().decisions.clone()
    }

    pub fn interrupts(&self) -> usize {
        self.state.lock().interrupts
    }

    pub fn disconnects(&self) -> usize {
        self.state.lock().disconnects
    }
}

#[async_trait]
impl AgentRuntime for ScriptedRuntime {
    async fn connect(
        &self,
        options: ConnectOptions,
        permissions: Arc<dyn PermissionHandler>,
    ) -> Result<Arc<dyn AgentConnection>> {
        let mut state = self.state.lock();
        state.connects.push(options);
        if let Some(err) = state.connect_failure.take() {
            return Err(err);
        }
        Ok(Arc::new(ScriptedConnection {
            state: Arc::clone(&self.state),
            permissions,
        }))
    }
}

struct ScriptedConnection {
    state: Arc<Mutex<ScriptState>>,
    permissions: Arc<dyn PermissionHandler>,
}

#[async_trait]
impl AgentConnection for ScriptedConnection {
    async fn query(&self, prompt: String) -> Result<MessageStream> {
        let steps = {
            let mut state = self.state.lock();
            state.prompts.push(prompt);
            if let Some(err) = state.query_failure.take() {
                return Err(err);
            }
            state.queries.pop_front().unwrap_or_else(|| {
                vec![ScriptStep::Message(AgentMessage::Result(
                    ResultMessage::default(),
                ))]
            })
        };

        let state = Arc::clone(&self.state);
        let permissions = Arc::clone(&self.permissions);

        Ok(Box::pin(stream! {
            for step in steps {
                match step {
                    ScriptStep::Message(message) => yield Ok(message),
                    ScriptStep::Permission { tool_name, input } => {
                        let decision = permissions.can_use_tool(&tool_name, input).await;
                        state.lock().decisions.push(decision);
                    }
                    ScriptStep::Delay(duration) => tokio::time::sleep(duration).await,
                    ScriptStep::Fail(err) => {
                        yield Err(err);
                        return;
                    }
                }
            }
        }))
    }

    async fn interrupt(&self) -> Result<()> {
        self.state.lock().interrupts += 1;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.disconnects += 1;
        match state.disconnect_failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Environment collaborator that records instead of mutating the process.
#[derive(Default)]
pub struct RecordingEnvironment {
    applied: Mutex<Vec<(PathBuf, RuntimeEnv)>>,
}

impl RecordingEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(working_dir, env)` applied so far.
    pub fn applied(&self) -> Vec<(PathBuf, RuntimeEnv)> {
        self.applied.lock().clone()
    }
}

impl ProcessEnvironment for RecordingEnvironment {
    fn apply(&self, working_dir: &Path, env: &RuntimeEnv) -> Result<()> {
        self.applied
            .lock()
            .push((working_dir.to_path_buf(), env.clone()));
        Ok(())
    }
}
