//! The CLI subprocess and its I/O tasks.
//!
//! Three tasks run per connection: a stdin writer fed by a channel, a stdout
//! reader that routes each line, and a stderr reader that only logs. The
//! stdout reader answers `can_use_tool` on a task of its own per request so a
//! pending approval never stalls the rest of the output.
//!
//! Output is only routed to a query while its turn is active. Once a turn is
//! abandoned (its stream dropped or failed, or the turn interrupted) its
//! permission requests are denied and its remaining output is skipped before
//! the next prompt goes out.

use super::protocol::{parse_line, CanUseTool, ControlRequestBody, Inbound, StdinMessage};
use crate::error::AgentError;
use crate::message::AgentMessage;
use crate::runtime::{
    AgentConnection, ConnectOptions, MessageStream, PermissionDecision, PermissionHandler,
};
use crate::Result;
use async_stream::stream;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot, OwnedMutexGuard};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Value of `CLAUDE_CODE_ENTRYPOINT` for spawned processes.
const ENTRYPOINT: &str = "agentbridge";

const STDIN_BUFFER: usize = 64;
const STDERR_TAIL_LINES: usize = 20;

/// Time the child gets to exit after stdin closes.
const EXIT_GRACE: Duration = Duration::from_secs(5);

/// Upper bound on skipping the remnant of an interrupted turn.
const INTERRUPT_DRAIN: Duration = Duration::from_secs(10);

/// How long a query waits for the previous turn's reader to be released.
const READER_WAIT: Duration = Duration::from_secs(5);

const ABANDONED_TURN_DENIAL: &str = "Turn was interrupted";

/// Command-line arguments for a connection.
pub(crate) fn build_args(options: &ConnectOptions) -> Vec<String> {
    let mut args: Vec<String> = [
        "--output-format",
        "stream-json",
        "--verbose",
        "--input-format",
        "stream-json",
        "--permission-prompt-tool",
        "stdio",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    args.extend(["--permission-mode".into(), options.permission_mode.as_str().into()]);
    args.extend(["--model".into(), options.model.clone()]);

    if !options.allowed_tools.is_empty() {
        args.extend(["--allowedTools".into(), options.allowed_tools.join(",")]);
    }
    if !options.disallowed_tools.is_empty() {
        args.extend(["--disallowedTools".into(), options.disallowed_tools.join(",")]);
    }
    if let Some(prompt) = &options.system_prompt {
        args.extend(["--system-prompt".into(), prompt.clone()]);
    }
    if let Some(turns) = options.max_turns {
        args.extend(["--max-turns".into(), turns.to_string()]);
    }
    for dir in &options.add_dirs {
        args.extend(["--add-dir".into(), dir.display().to_string()]);
    }
    args
}

type ControlSlot = oneshot::Sender<Result<Value>>;
type MessageReceiver = mpsc::UnboundedReceiver<Result<AgentMessage>>;

/// Where the CLI is in the current prompt/result cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum TurnState {
    /// No prompt outstanding. Output is dropped.
    #[default]
    Idle,
    /// A query is reading this turn.
    Active,
    /// Nobody reads this turn any more. Output is queued for the next query
    /// to skip, and tool permission is refused.
    Abandoned,
}

/// How the child ended, as seen by the stdout reader.
#[derive(Debug, Clone)]
struct ExitInfo {
    code: Option<i32>,
    message: String,
}

impl ExitInfo {
    fn error(&self) -> AgentError {
        AgentError::process(self.code, self.message.clone())
    }
}

#[derive(Default)]
struct Controls {
    pending: HashMap<String, ControlSlot>,
    exit: Option<ExitInfo>,
}

#[derive(Default)]
struct Shared {
    controls: Mutex<Controls>,
    turn: Mutex<TurnState>,
    permission_tasks: Mutex<HashMap<String, AbortHandle>>,
    stderr_tail: Mutex<VecDeque<String>>,
}

impl Shared {
    fn abandon_turn(&self) {
        let mut turn = self.turn.lock();
        if *turn == TurnState::Active {
            debug!("Abandoning active turn");
            *turn = TurnState::Abandoned;
        }
    }

    fn abort_permission_tasks(&self) {
        for (request_id, handle) in self.permission_tasks.lock().drain() {
            debug!(request_id = %request_id, "Aborting permission check");
            handle.abort();
        }
    }
}

/// A running CLI process speaking stream-json.
pub(crate) struct CliConnection {
    /// `None` once disconnected. Dropping the last sender closes stdin.
    stdin: Mutex<Option<mpsc::Sender<String>>>,
    child: Arc<tokio::sync::Mutex<Child>>,
    messages: Arc<tokio::sync::Mutex<MessageReceiver>>,
    shared: Arc<Shared>,
    control_timeout: Duration,
    control_seq: AtomicU64,
}

impl CliConnection {
    /// Spawn the CLI and complete the `initialize` handshake.
    pub async fn spawn(
        program: &Path,
        options: &ConnectOptions,
        permissions: Arc<dyn PermissionHandler>,
        control_timeout: Duration,
    ) -> Result<Self> {
        let args = build_args(options);
        info!(
            cli = %program.display(),
            working_dir = %options.working_dir.display(),
            model = %options.model,
            "Spawning Claude CLI"
        );
        debug!(?args, env = ?options.env, "Claude CLI arguments");

        let mut child = Command::new(program)
            .args(&args)
            .current_dir(&options.working_dir)
            .envs(options.env.iter())
            .env("CLAUDE_CODE_ENTRYPOINT", ENTRYPOINT)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    AgentError::CliNotFound(format!("{}: {}", program.display(), e))
                }
                _ => AgentError::connection(format!("failed to spawn Claude CLI: {}", e)),
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AgentError::connection("Claude CLI stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::connection("Claude CLI stdout unavailable"))?;
        let stderr = child.stderr.take();

        let (stdin_tx, stdin_rx) = mpsc::channel::<String>(STDIN_BUFFER);
        let (messages_tx, messages_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());
        let child = Arc::new(tokio::sync::Mutex::new(child));

        tokio::spawn(write_stdin(stdin, stdin_rx));
        if let Some(stderr) = stderr {
            tokio::spawn(read_stderr(stderr, Arc::clone(&shared)));
        }
        tokio::spawn(
            StdoutReader {
                messages: messages_tx,
                stdin: stdin_tx.downgrade(),
                shared: Arc::clone(&shared),
                permissions,
                child: Arc::clone(&child),
            }
            .run(stdout),
        );

        let connection = Self {
            stdin: Mutex::new(Some(stdin_tx)),
            child,
            messages: Arc::new(tokio::sync::Mutex::new(messages_rx)),
            shared,
            control_timeout,
            control_seq: AtomicU64::new(0),
        };

        if let Err(e) = connection.control(ControlRequestBody::Initialize {}).await {
            warn!(error = %e, "Claude CLI handshake failed");
            connection.kill().await;
            return Err(e);
        }
        debug!("Claude CLI initialized");
        Ok(connection)
    }

    async fn send(&self, message: StdinMessage) -> Result<()> {
        let line = message.to_line()?;
        let tx = self
            .stdin
            .lock()
            .clone()
            .ok_or_else(|| AgentError::connection("Claude CLI connection is closed"))?;
        tx.send(line)
            .await
            .map_err(|_| AgentError::connection("Claude CLI stdin closed"))
    }

    /// Send a control request and wait for its response.
    async fn control(&self, body: ControlRequestBody) -> Result<Value> {
        let seq = self.control_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let request_id = format!("req_{}_{}", seq, Uuid::new_v4().simple());
        let (tx, rx) = oneshot::channel();

        {
            let mut controls = self.shared.controls.lock();
            if let Some(exit) = &controls.exit {
                return Err(exit.error());
            }
            controls.pending.insert(request_id.clone(), tx);
        }

        let sent = self
            .send(StdinMessage::ControlRequest {
                request_id: request_id.clone(),
                request: body,
            })
            .await;
        if let Err(e) = sent {
            self.shared.controls.lock().pending.remove(&request_id);
            return Err(e);
        }

        match tokio::time::timeout(self.control_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(AgentError::connection(
                "Claude CLI closed before answering a control request",
            )),
            Err(_) => {
                self.shared.controls.lock().pending.remove(&request_id);
                Err(AgentError::connection(format!(
                    "control request timed out after {}s",
                    self.control_timeout.as_secs()
                )))
            }
        }
    }

    async fn kill(&self) {
        self.stdin.lock().take();
        self.shared.abort_permission_tasks();
        if let Err(e) = self.child.lock().await.kill().await {
            debug!(error = %e, "Failed to kill Claude CLI");
        }
    }
}

#[async_trait]
impl AgentConnection for CliConnection {
    async fn query(&self, prompt: String) -> Result<MessageStream> {
        let exit = self.shared.controls.lock().exit.clone();
        if let Some(exit) = exit {
            return Err(exit.error());
        }

        // A dropped stream releases the reader only once its task is torn down.
        let mut messages = tokio::time::timeout(
            READER_WAIT,
            Arc::clone(&self.messages).lock_owned(),
        )
        .await
        .map_err(|_| AgentError::QueryInProgress)?;

        let abandoned = *self.shared.turn.lock() == TurnState::Abandoned;
        if abandoned {
            drain_interrupted_turn(&mut messages).await;
        }

        {
            let mut turn = self.shared.turn.lock();
            let mut stale = 0usize;
            while messages.try_recv().is_ok() {
                stale += 1;
            }
            if stale > 0 {
                debug!(stale, "Discarded output from an earlier turn");
            }
            *turn = TurnState::Active;
        }

        let mut reader = TurnReader {
            messages,
            shared: Arc::clone(&self.shared),
        };
        self.send(StdinMessage::user(prompt)).await?;

        Ok(Box::pin(stream! {
            loop {
                match reader.messages.recv().await {
                    Some(Ok(message)) => {
                        let done = message.is_result();
                        yield Ok(message);
                        if done {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        yield Err(e);
                        break;
                    }
                    None => {
                        yield Err(AgentError::connection("Claude CLI output closed"));
                        break;
                    }
                }
            }
        }))
    }

    async fn interrupt(&self) -> Result<()> {
        self.shared.abandon_turn();
        self.control(ControlRequestBody::Interrupt).await?;
        info!("Interrupted Claude CLI turn");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let Some(stdin) = self.stdin.lock().take() else {
            return Ok(());
        };
        drop(stdin);
        self.shared.abort_permission_tasks();

        let mut child = self.child.lock().await;
        match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
            Ok(status) => {
                let status = status?;
                debug!(%status, "Claude CLI exited");
            }
            Err(_) => {
                warn!("Claude CLI did not exit after stdin closed, killing it");
                child.kill().await?;
            }
        }
        Ok(())
    }
}

/// Exclusive access to the CLI output for one turn.
///
/// Dropping it before the turn's result abandons the turn, and does so
/// before the receiver is released to the next query.
struct TurnReader {
    messages: OwnedMutexGuard<MessageReceiver>,
    shared: Arc<Shared>,
}

impl Drop for TurnReader {
    fn drop(&mut self) {
        self.shared.abandon_turn();
    }
}

/// Skip what is left of an interrupted turn, up to its result.
async fn drain_interrupted_turn(messages: &mut MessageReceiver) {
    let drain = async {
        let mut skipped = 0usize;
        while let Some(item) = messages.recv().await {
            skipped += 1;
            if matches!(&item, Ok(m) if m.is_result()) {
                break;
            }
        }
        skipped
    };
    match tokio::time::timeout(INTERRUPT_DRAIN, drain).await {
        Ok(skipped) => debug!(skipped, "Drained interrupted turn"),
        Err(_) => warn!("Interrupted turn did not finish, continuing anyway"),
    }
}

async fn write_stdin(mut stdin: ChildStdin, mut rx: mpsc::Receiver<String>) {
    while let Some(mut line) = rx.recv().await {
        line.push('\n');
        if let Err(e) = stdin.write_all(line.as_bytes()).await {
            error!(error = %e, "Failed to write to Claude CLI stdin");
            break;
        }
        if let Err(e) = stdin.flush().await {
            error!(error = %e, "Failed to flush Claude CLI stdin");
            break;
        }
    }
    debug!("Claude CLI stdin closed");
}

async fn read_stderr(stderr: ChildStderr, shared: Arc<Shared>) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "agentbridge_agent::cli::stderr", "{}", line);
        let mut tail = shared.stderr_tail.lock();
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
}

struct StdoutReader {
    messages: mpsc::UnboundedSender<Result<AgentMessage>>,
    stdin: mpsc::WeakSender<String>,
    shared: Arc<Shared>,
    permissions: Arc<dyn PermissionHandler>,
    child: Arc<tokio::sync::Mutex<Child>>,
}

impl StdoutReader {
    async fn run(self, stdout: ChildStdout) {
        let mut lines = BufReader::new(stdout).lines();
        let exit = loop {
            match lines.next_line().await {
                Ok(Some(line)) => self.dispatch(&line),
                Ok(None) => break self.exit_info().await,
                Err(e) => {
                    error!(error = %e, "Failed to read Claude CLI stdout");
                    let _ = self.messages.send(Err(AgentError::connection(format!(
                        "failed to read Claude CLI output: {}",
                        e
                    ))));
                    break ExitInfo {
                        code: None,
                        message: format!("stdout read failed: {}", e),
                    };
                }
            }
        };

        info!(exit_code = ?exit.code, "Claude CLI output ended");
        let _ = self.messages.send(Err(exit.error()));

        let pending = {
            let mut controls = self.shared.controls.lock();
            controls.exit = Some(exit.clone());
            std::mem::take(&mut controls.pending)
        };
        for (_, slot) in pending {
            let _ = slot.send(Err(exit.error()));
        }
        self.shared.abort_permission_tasks();
    }

    fn dispatch(&self, line: &str) {
        match parse_line(line) {
            Ok(None) => {}
            Ok(Some(Inbound::Message(message))) => {
                // Held across the send so a reader that sees the result
                // also sees the turn closed.
                let mut turn = self.shared.turn.lock();
                if *turn == TurnState::Idle {
                    debug!("Dropping Claude CLI output outside a turn");
                    return;
                }
                let done = message.is_result();
                let _ = self.messages.send(Ok(message));
                if done {
                    *turn = TurnState::Idle;
                }
            }
            Ok(Some(Inbound::ControlRequest {
                request_id,
                request,
            })) => self.handle_control_request(request_id, request),
            Ok(Some(Inbound::ControlResponse {
                request_id,
                outcome,
            })) => {
                let slot = self.shared.controls.lock().pending.remove(&request_id);
                match slot {
                    Some(slot) => {
                        let _ = slot.send(outcome.map_err(AgentError::Sdk));
                    }
                    None => debug!(request_id = %request_id, "Control response for unknown request"),
                }
            }
            Ok(Some(Inbound::ControlCancel { request_id })) => {
                if let Some(handle) = self.shared.permission_tasks.lock().remove(&request_id) {
                    handle.abort();
                    info!(request_id = %request_id, "Claude CLI cancelled permission request");
                }
            }
            Err(e) => {
                warn!(error = %e, "Unparseable Claude CLI output");
                let mut turn = self.shared.turn.lock();
                if *turn == TurnState::Active {
                    // The query ends here, the rest of the turn is skipped.
                    let _ = self.messages.send(Err(e));
                    *turn = TurnState::Abandoned;
                }
            }
        }
    }

    fn handle_control_request(&self, request_id: String, request: Value) {
        let subtype = request
            .get("subtype")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if subtype != "can_use_tool" {
            debug!(request_id = %request_id, subtype = %subtype, "Unsupported control request");
            self.respond(StdinMessage::control_error(
                request_id,
                format!("Unsupported control request: {}", subtype),
            ));
            return;
        }

        let params: CanUseTool = match serde_json::from_value(request) {
            Ok(params) => params,
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "Malformed can_use_tool request");
                self.respond(StdinMessage::control_error(request_id, e.to_string()));
                return;
            }
        };
        debug!(
            request_id = %request_id,
            tool = %params.tool_name,
            tool_use_id = ?params.tool_use_id,
            "Claude CLI requests tool permission"
        );

        if *self.shared.turn.lock() != TurnState::Active {
            info!(
                request_id = %request_id,
                tool = %params.tool_name,
                "Denying tool permission for an abandoned turn"
            );
            self.respond(StdinMessage::permission(
                request_id,
                PermissionDecision::Deny {
                    message: ABANDONED_TURN_DENIAL.to_string(),
                },
            ));
            return;
        }

        let permissions = Arc::clone(&self.permissions);
        let shared = Arc::clone(&self.shared);
        let stdin = self.stdin.clone();
        let id = request_id.clone();

        // Registered under the lock so the task cannot remove itself first.
        let mut tasks = self.shared.permission_tasks.lock();
        let handle = tokio::spawn(async move {
            let decision = permissions.can_use_tool(&params.tool_name, params.input).await;
            shared.permission_tasks.lock().remove(&id);
            send_weak(&stdin, StdinMessage::permission(id, decision)).await;
        });
        tasks.insert(request_id, handle.abort_handle());
    }

    fn respond(&self, message: StdinMessage) {
        let stdin = self.stdin.clone();
        tokio::spawn(async move { send_weak(&stdin, message).await });
    }

    async fn exit_info(&self) -> ExitInfo {
        let status = tokio::time::timeout(EXIT_GRACE, async {
            self.child.lock().await.wait().await
        })
        .await;
        let code = match status {
            Ok(Ok(status)) => status.code(),
            _ => None,
        };

        let tail: Vec<String> = self.shared.stderr_tail.lock().iter().cloned().collect();
        let message = if tail.is_empty() {
            "Claude CLI exited".to_string()
        } else {
            format!("Claude CLI exited: {}", tail.join("\n"))
        };
        ExitInfo { code, message }
    }
}

async fn send_weak(stdin: &mpsc::WeakSender<String>, message: StdinMessage) {
    let Some(tx) = stdin.upgrade() else {
        debug!("Claude CLI stdin gone, dropping control response");
        return;
    };
    match message.to_line() {
        Ok(line) => {
            if tx.send(line).await.is_err() {
                debug!("Claude CLI stdin closed, dropping control response");
            }
        }
        Err(e) => warn!(error = %e, "Failed to encode control response"),
    }
}
