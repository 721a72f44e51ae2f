//! Merges a query's runtime output and its permission requests into one stream.
//!
//! Two producers feed a single intake queue: the query task, which drives the
//! runtime and normalizes its messages, and the approval forwarder, which
//! relays requests announced on the armed [`ApprovalChannel`]. The consumer
//! yields intake events in arrival order until the query task finishes, drains
//! what is left, stops the forwarder, and ends with exactly one terminal event.
//!
//! Dropping the stream early aborts both producers, interrupts the runtime,
//! and (by dropping the approval channel) denies any decision still pending.
//! A query that fails before its turn completes interrupts the runtime too.

use crate::approval::ApprovalChannel;
use crate::classify::error_event;
use crate::error::AgentError;
use crate::normalizer::MessageNormalizer;
use crate::runtime::AgentConnection;
use crate::Result;
use agentbridge_core::{StreamEvent, TurnResult};
use async_stream::stream;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinError};
use tracing::{debug, info, warn};

/// Client-facing event stream of one query.
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Slot that receives the runtime-assigned session id.
pub type SessionIdSlot = Arc<Mutex<Option<String>>>;

/// Run `prompt` on `connection` and stream its events.
///
/// `guard` is held until the stream is finished or dropped.
pub fn stream_query<G>(
    connection: Arc<dyn AgentConnection>,
    prompt: String,
    approvals: ApprovalChannel,
    session_id: SessionIdSlot,
    guard: G,
) -> EventStream
where
    G: Send + 'static,
{
    Box::pin(stream! {
        let (intake_tx, mut intake) = mpsc::unbounded_channel::<StreamEvent>();

        let mut query = tokio::spawn(run_query(
            Arc::clone(&connection),
            prompt,
            intake_tx.clone(),
            session_id,
        ));
        let forwarder = tokio::spawn(forward_approvals(approvals, intake_tx));

        let mut cleanup = Cleanup {
            query: query.abort_handle(),
            forwarder: forwarder.abort_handle(),
            connection: Some(connection),
            guard: Some(guard),
        };

        let joined = loop {
            let step = tokio::select! {
                biased;
                Some(event) = intake.recv() => Step::Event(event),
                joined = &mut query => Step::Finished(joined),
            };
            match step {
                Step::Event(event) => yield event,
                Step::Finished(joined) => break joined,
            }
        };

        while let Ok(event) = intake.try_recv() {
            yield event;
        }

        // Wait for the forwarder to be gone so the broker is disarmed before
        // the terminal event.
        cleanup.forwarder.abort();
        let _ = forwarder.await;

        // Only a completed turn leaves the runtime idle. A failed one may
        // still be running and is interrupted while the guard is held. The
        // guard is released before the terminal event goes out.
        if let Some(connection) = cleanup.connection.take() {
            if !matches!(joined, Ok(Ok(()))) {
                warn!("Query failed before its turn completed, interrupting runtime");
                if let Err(e) = connection.interrupt().await {
                    debug!(error = %e, "Interrupt after failure failed");
                }
            }
        }
        drop(cleanup);

        yield terminal_event(joined);
    })
}

enum Step {
    Event(StreamEvent),
    Finished(std::result::Result<Result<()>, JoinError>),
}

async fn run_query(
    connection: Arc<dyn AgentConnection>,
    prompt: String,
    intake: mpsc::UnboundedSender<StreamEvent>,
    session_id: SessionIdSlot,
) -> Result<()> {
    debug!(prompt_len = prompt.len(), "Starting query");
    let mut messages = connection.query(prompt).await?;
    let mut normalizer = MessageNormalizer::new();

    while let Some(message) = messages.next().await {
        for event in normalizer.normalize(message?) {
            if let StreamEvent::Result(TurnResult {
                session_id: Some(id),
                ..
            }) = &event
            {
                *session_id.lock() = Some(id.clone());
            }
            intake.send(event).map_err(|_| AgentError::Cancelled)?;
        }
    }

    info!("Query completed");
    Ok(())
}

async fn forward_approvals(mut approvals: ApprovalChannel, intake: mpsc::UnboundedSender<StreamEvent>) {
    while let Some(request) = approvals.recv().await {
        debug!(request_id = %request.request_id, "Forwarding permission request");
        if intake.send(StreamEvent::PermissionRequest(request)).is_err() {
            break;
        }
    }
}

fn terminal_event(joined: std::result::Result<Result<()>, JoinError>) -> StreamEvent {
    match joined {
        Ok(Ok(())) => StreamEvent::complete(),
        Ok(Err(e)) => error_event(&e),
        Err(e) => error_event(&AgentError::internal(format!("query task failed: {}", e))),
    }
}

/// Tears down a query's tasks when its stream goes away.
struct Cleanup<G: Send + 'static> {
    query: AbortHandle,
    forwarder: AbortHandle,
    /// Present until the stream reached its terminal event.
    connection: Option<Arc<dyn AgentConnection>>,
    guard: Option<G>,
}

impl<G: Send + 'static> Drop for Cleanup<G> {
    fn drop(&mut self) {
        self.query.abort();
        self.forwarder.abort();

        let Some(connection) = self.connection.take() else {
            return;
        };
        warn!("Query stream dropped before completion, interrupting runtime");
        // The next query may not start before the interrupt is delivered.
        let guard = self.guard.take();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = connection.interrupt().await {
                    debug!(error = %e, "Interrupt after cancellation failed");
                }
                drop(guard);
            });
        }
    }
}
