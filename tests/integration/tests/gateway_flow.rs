//! End-to-end gateway flows against a scripted runtime.

use agentbridge_agent::message::{AgentMessage, ContentBlock, ResultMessage};
use agentbridge_agent::runtime::PermissionDecision;
use agentbridge_agent::testing::ScriptStep;
use agentbridge_agent::AgentError;
use agentbridge_core::PermissionMode;
use agentbridge_integration_tests::{kinds, parse_sse, Harness};
use axum::http::StatusCode;
use futures::StreamExt;
use serde_json::{json, Value};
use std::time::Duration;
use tempfile::TempDir;

async fn initialize(harness: &Harness, dir: &TempDir, extra: Value) {
    let mut body = json!({"working_dir": dir.path(), "auth_method": "subscription"});
    if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
        body.extend(extra.clone());
    }
    let (status, reply) = harness.post("/initialize", body).await;
    assert_eq!(status, StatusCode::OK, "initialize failed: {}", reply);
}

/// Read SSE chunks until an event of `kind` arrives.
async fn read_until<S>(body: &mut S, buffer: &mut String, kind: &str) -> Value
where
    S: futures::Stream<Item = Result<axum::body::Bytes, axum::Error>> + Unpin,
{
    loop {
        if let Some((_, data)) = parse_sse(buffer).into_iter().find(|(k, _)| k == kind) {
            return data;
        }
        let chunk = body.next().await.expect("stream ended early").unwrap();
        buffer.push_str(std::str::from_utf8(&chunk).unwrap());
    }
}

async fn drain<S>(mut body: S, buffer: &mut String)
where
    S: futures::Stream<Item = Result<axum::body::Bytes, axum::Error>> + Unpin,
{
    while let Some(chunk) = body.next().await {
        buffer.push_str(std::str::from_utf8(&chunk.unwrap()).unwrap());
    }
}

#[tokio::test]
async fn test_bedrock_session_configures_runtime() {
    let dir = TempDir::new().unwrap();
    let harness = Harness::new();

    let (status, reply) = harness
        .post(
            "/initialize",
            json!({
                "working_dir": dir.path(),
                "auth_method": "bedrock",
                "aws_region": "eu-west-1",
                "permission_mode": "plan",
                "allowed_tools": ["Read"],
                "max_turns": 3,
                "env": {"AWS_REGION": "us-west-2"}
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["permission_mode"], "plan");

    let applied = harness.environment.applied();
    assert_eq!(applied.len(), 1);
    let (_, env) = &applied[0];
    assert_eq!(env.get("CLAUDE_CODE_USE_BEDROCK"), Some("1"));
    assert_eq!(env.get("AWS_REGION"), Some("us-west-2"));

    let connects = harness.runtime.connects();
    assert_eq!(connects.len(), 1);
    assert_eq!(connects[0].permission_mode, PermissionMode::Default);
    assert_eq!(connects[0].allowed_tools, vec!["Read".to_string()]);
    assert_eq!(connects[0].max_turns, Some(3));
}

#[tokio::test]
async fn test_query_with_editor_context() {
    let dir = TempDir::new().unwrap();
    let harness = Harness::new();
    initialize(&harness, &dir, json!({})).await;

    let events = harness
        .query(json!({
            "prompt": "explain this",
            "context": {
                "path": "src/lib.rs",
                "selection": {"text": "fn main() {}"},
                "content": "ignored when a selection exists"
            }
        }))
        .await;
    assert_eq!(kinds(&events), vec!["result", "complete"]);

    let prompts = harness.runtime.prompts();
    assert_eq!(
        prompts[0],
        "Current file: src/lib.rs\n\nSelected code:\n```\nfn main() {}\n```\n\nexplain this"
    );
}

#[tokio::test]
async fn test_deny_with_message_reaches_runtime() {
    let dir = TempDir::new().unwrap();
    let harness = Harness::new();
    harness.runtime.push_query(vec![
        ScriptStep::Permission {
            tool_name: "Write".into(),
            input: json!({"file_path": "a.txt"}),
        },
        ScriptStep::Message(AgentMessage::assistant_text("Understood, not writing.")),
        ScriptStep::Message(AgentMessage::Result(ResultMessage::default())),
    ]);
    initialize(&harness, &dir, json!({})).await;

    let resp = harness.open_query(json!({"prompt": "write a.txt"})).await;
    let mut body = resp.into_body().into_data_stream();
    let mut buffer = String::new();
    let request = read_until(&mut body, &mut buffer, "permission_request").await;
    assert_eq!(request["tool_name"], "Write");
    assert_eq!(request["input"]["file_path"], "a.txt");

    let (status, _) = harness
        .post(
            "/approve",
            json!({
                "request_id": request["request_id"],
                "approved": false,
                "message": "read-only session"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    drain(body, &mut buffer).await;
    assert_eq!(
        kinds(&parse_sse(&buffer)),
        vec!["permission_request", "text", "result", "complete"]
    );
    assert_eq!(
        harness.runtime.decisions(),
        vec![PermissionDecision::Deny {
            message: "read-only session".into()
        }]
    );
}

#[tokio::test]
async fn test_allow_with_updated_input() {
    let dir = TempDir::new().unwrap();
    let harness = Harness::new();
    harness.runtime.push_query(vec![
        ScriptStep::Permission {
            tool_name: "Bash".into(),
            input: json!({"command": "rm -rf build"}),
        },
        ScriptStep::Message(AgentMessage::Result(ResultMessage::default())),
    ]);
    initialize(&harness, &dir, json!({})).await;

    let resp = harness.open_query(json!({"prompt": "clean"})).await;
    let mut body = resp.into_body().into_data_stream();
    let mut buffer = String::new();
    let request = read_until(&mut body, &mut buffer, "permission_request").await;

    harness
        .post(
            "/approve",
            json!({
                "request_id": request["request_id"],
                "approved": true,
                "updated_input": {"command": "rm -rf build/tmp"}
            }),
        )
        .await;
    drain(body, &mut buffer).await;

    assert_eq!(
        harness.runtime.decisions(),
        vec![PermissionDecision::Allow {
            updated_input: json!({"command": "rm -rf build/tmp"})
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_permission_times_out() {
    let dir = TempDir::new().unwrap();
    let harness = Harness::with_approval_timeout(Duration::from_secs(60));
    harness.runtime.push_query(vec![
        ScriptStep::Permission {
            tool_name: "Bash".into(),
            input: json!({"command": "ls"}),
        },
        ScriptStep::Message(AgentMessage::Result(ResultMessage::default())),
    ]);
    initialize(&harness, &dir, json!({})).await;

    let events = harness.query(json!({"prompt": "ls"})).await;
    assert_eq!(
        kinds(&events),
        vec!["permission_request", "result", "complete"]
    );

    let decisions = harness.runtime.decisions();
    assert!(matches!(&decisions[0], PermissionDecision::Deny { message } if message.contains("timed out")));

    let (_, health) = harness.get("/health").await;
    assert_eq!(health["pending_approvals"], 0);
    assert_eq!(health["query_active"], false);
}

#[tokio::test]
async fn test_concurrent_query_conflicts() {
    let dir = TempDir::new().unwrap();
    let harness = Harness::new();
    harness.runtime.push_query(vec![
        ScriptStep::Permission {
            tool_name: "Bash".into(),
            input: json!({"command": "sleep 1"}),
        },
        ScriptStep::Message(AgentMessage::Result(ResultMessage::default())),
    ]);
    initialize(&harness, &dir, json!({})).await;

    let resp = harness.open_query(json!({"prompt": "first"})).await;
    let mut body = resp.into_body().into_data_stream();
    let mut buffer = String::new();
    let request = read_until(&mut body, &mut buffer, "permission_request").await;

    let (status, reply) = harness.post("/query", json!({"prompt": "second"})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(reply["detail"].is_string());

    harness
        .post(
            "/approve",
            json!({"request_id": request["request_id"], "approved": true}),
        )
        .await;
    drain(body, &mut buffer).await;

    // The slot frees once the first stream finishes.
    let events = harness.query(json!({"prompt": "third"})).await;
    assert_eq!(kinds(&events), vec!["result", "complete"]);
}

#[tokio::test]
async fn test_runtime_failure_becomes_error_event() {
    let dir = TempDir::new().unwrap();
    let harness = Harness::new();
    harness.runtime.push_query(vec![
        ScriptStep::Message(AgentMessage::assistant(vec![ContentBlock::Text {
            text: "Working".into(),
        }])),
        ScriptStep::Fail(AgentError::process(Some(137), "killed")),
    ]);
    initialize(&harness, &dir, json!({})).await;

    let events = harness.query(json!({"prompt": "go"})).await;
    assert_eq!(kinds(&events), vec!["text", "error"]);
    let error = &events[1].1;
    assert_eq!(error["error_type"], "process_error");
    assert_eq!(error["exit_code"], 137);
    assert_eq!(harness.runtime.interrupts(), 1);

    // The session survives a failed query.
    let (_, health) = harness.get("/health").await;
    assert_eq!(health["status"], "ok");
}

#[tokio::test]
async fn test_shutdown_then_reinitialize() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    let harness = Harness::new();

    initialize(&harness, &first, json!({})).await;
    let (status, _) = harness.post("/shutdown", json!({})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = harness.post("/query", json!({"prompt": "hi"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    initialize(&harness, &second, json!({"model": "claude-other"})).await;
    let (_, health) = harness.get("/health").await;
    assert_eq!(health["model"], "claude-other");
    assert_eq!(harness.runtime.connects().len(), 2);
    assert_eq!(harness.runtime.disconnects(), 1);
}
