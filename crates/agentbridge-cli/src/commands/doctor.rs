//! Diagnostic command.

use agentbridge_agent::cli::probe_version;
use agentbridge_agent::ClaudeCliRuntime;
use agentbridge_core::aws::{self, CredentialStatus};
use agentbridge_core::env::{self, vars};
use agentbridge_core::{paths, Config};
use console::{style, Emoji};
use std::path::Path;

static CHECK: Emoji = Emoji("✓", "+");
static CROSS: Emoji = Emoji("✗", "x");
static WARN: Emoji = Emoji("⚠", "!");

/// Outcome of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Ok,
    Warning,
    Error,
}

/// Accumulates check results and prints them as it goes.
#[derive(Debug, Default)]
pub struct Report {
    pub errors: usize,
    pub warnings: usize,
}

impl Report {
    fn section(&self, title: &str) {
        println!("\n{}", style(title).bold());
    }

    fn record(&mut self, level: Level, message: impl AsRef<str>) {
        let marker = match level {
            Level::Ok => style(CHECK).green(),
            Level::Warning => {
                self.warnings += 1;
                style(WARN).yellow()
            }
            Level::Error => {
                self.errors += 1;
                style(CROSS).red()
            }
        };
        println!("  {} {}", marker, message.as_ref());
    }

    fn note(&self, message: impl AsRef<str>) {
        println!("    {}", message.as_ref());
    }
}

/// Describe how a session started with each auth method would authenticate.
pub fn auth_summary(api_key_set: bool, bedrock_flag: bool) -> Vec<(Level, String)> {
    let mut lines = vec![(
        Level::Ok,
        "subscription: uses stored Claude CLI credentials".to_string(),
    )];

    lines.push(if api_key_set {
        (Level::Ok, format!("api_key: {} is set", vars::ANTHROPIC_API_KEY))
    } else {
        (
            Level::Warning,
            format!(
                "api_key: {} not set; clients must pass api_key to /initialize",
                vars::ANTHROPIC_API_KEY
            ),
        )
    });

    if bedrock_flag {
        lines.push((
            Level::Ok,
            format!("{} is set in this environment", vars::CLAUDE_CODE_USE_BEDROCK),
        ));
    }

    lines
}

/// Map AWS detection to a report line.
pub fn aws_summary(status: &CredentialStatus) -> (Level, String) {
    match (status.available, status.source) {
        (true, Some(source)) => (Level::Ok, format!("AWS credentials found ({})", source)),
        (false, Some(source)) => (
            Level::Warning,
            format!("AWS credentials from {} failed validation", source),
        ),
        _ => (
            Level::Warning,
            "No AWS credentials detected; bedrock sessions will fail".to_string(),
        ),
    }
}

/// Run the doctor command.
pub async fn run(config_path: Option<&Path>) -> anyhow::Result<()> {
    println!("agentbridge doctor");
    let mut report = Report::default();

    report.section("Configuration");
    let config = match Config::resolve(config_path) {
        Ok(config) => {
            report.record(Level::Ok, "Configuration loaded and valid");
            config
        }
        Err(e) => {
            report.record(Level::Error, format!("Configuration error: {}", e));
            Config::default()
        }
    };
    match paths::config_file() {
        Ok(path) if path.exists() => report.note(format!("Default file: {}", path.display())),
        Ok(path) => report.note(format!("Default file (absent): {}", path.display())),
        Err(e) => report.record(Level::Warning, format!("No home directory: {}", e)),
    }
    report.note(format!("Listen address: {}", config.bind_addr()));
    report.note(format!("Default model: {}", config.agent.default_model));

    report.section("Claude CLI");
    match ClaudeCliRuntime::from_config(&config.agent).locate() {
        Ok(location) => {
            report.record(
                Level::Ok,
                format!("Found {} (via {})", location.path.display(), location.source),
            );
            match probe_version(&location.path).await {
                Some(version) => report.note(format!("Version: {}", version)),
                None => report.record(Level::Warning, "`claude --version` did not answer"),
            }
        }
        Err(e) => {
            report.record(Level::Error, e.to_string());
            report.note("Install Claude Code or set CLAUDE_BIN / agent.cli_path");
        }
    }

    report.section("Authentication");
    for (level, line) in auth_summary(
        env::get_var(vars::ANTHROPIC_API_KEY).is_some(),
        env::get_var(vars::CLAUDE_CODE_USE_BEDROCK).is_some(),
    ) {
        report.record(level, line);
    }
    if let Some(model) = env::get_var(vars::ANTHROPIC_MODEL) {
        report.note(format!("{} = {}", vars::ANTHROPIC_MODEL, model));
    }

    report.section("AWS Bedrock");
    let (level, line) = aws_summary(&aws::detect_credentials().await);
    report.record(level, line);
    let defaults = aws::bedrock_defaults();
    report.note(format!("Region: {}", defaults.region));
    report.note(format!("Model: {}", defaults.model));
    report.note(format!("Small model: {}", defaults.small_model));

    println!("\n{}", style("Summary").bold());
    println!(
        "  Errors: {}",
        if report.errors > 0 { style(report.errors).red() } else { style(report.errors).green() }
    );
    println!(
        "  Warnings: {}",
        if report.warnings > 0 {
            style(report.warnings).yellow()
        } else {
            style(report.warnings).green()
        }
    );

    if report.errors > 0 {
        anyhow::bail!("{} error(s) found", report.errors);
    }

    Ok(())
}
