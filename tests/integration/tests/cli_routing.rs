//! CLI binary integration tests.
//!
//! These run the compiled `agentbridge` binary to check command routing,
//! config resolution, and that diagnostics stay off stdout.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::NamedTempFile;

/// Locate the compiled `agentbridge` binary in the workspace target directory.
fn agentbridge_bin() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    // tests/integration -> workspace root
    let workspace_root = manifest_dir
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root");
    let target = std::env::var_os("CARGO_TARGET_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| workspace_root.join("target"));
    let bin = target.join("debug").join("agentbridge");
    assert!(
        bin.exists(),
        "agentbridge binary not found at {}; run `cargo build -p agentbridge-cli` first",
        bin.display()
    );
    bin
}

fn run(args: &[&str]) -> Output {
    Command::new(agentbridge_bin())
        .args(args)
        .env_remove("AGENTBRIDGE_CONFIG")
        .env_remove("HOST")
        .env_remove("PORT")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run agentbridge")
}

fn config_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_cli_version() {
    let output = run(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.starts_with("agentbridge "),
        "unexpected version output: {}",
        stdout
    );
}

#[test]
fn test_cli_help_lists_commands() {
    let output = run(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["serve", "doctor", "config", "version"] {
        assert!(stdout.contains(command), "help should mention '{}': {}", command, stdout);
    }
}

#[test]
fn test_cli_unknown_command_fails() {
    let output = run(&["frobnicate"]);
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_config_path() {
    let output = run(&["config", "path"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.trim().ends_with("agentbridge.json5"), "got: {}", stdout);
}

#[test]
fn test_config_show_reads_json5_file() {
    let file = config_file(
        r#"{
            // loopback only
            server: { port: 9321, cors: false },
            agent: { approval_timeout_secs: 90 },
        }"#,
    );
    let path = file.path().to_string_lossy().to_string();

    let output = run(&["--config", &path, "config", "show"]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let shown: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(shown["server"]["port"], 9321);
    assert_eq!(shown["server"]["cors"], false);
    assert_eq!(shown["server"]["host"], "127.0.0.1");
    assert_eq!(shown["agent"]["approval_timeout_secs"], 90);
}

#[test]
fn test_config_show_env_overrides_file() {
    let file = config_file("{ server: { port: 9321 } }");
    let output = Command::new(agentbridge_bin())
        .args(["config", "show"])
        .env("AGENTBRIDGE_CONFIG", file.path())
        .env("PORT", "9400")
        .output()
        .expect("failed to run agentbridge");
    assert!(output.status.success());

    let shown: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(shown["server"]["port"], 9400);
}

#[test]
fn test_invalid_config_is_rejected() {
    let file = config_file("{ server: { port: 0 } }");
    let path = file.path().to_string_lossy().to_string();

    let output = run(&["--config", &path, "config", "show"]);
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("port"));
}

#[test]
fn test_missing_config_file_is_rejected() {
    let output = run(&["--config", "/nonexistent/agentbridge.json5", "serve"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("not found"));
}
