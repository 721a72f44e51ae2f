//! agentbridge command-line interface.

pub mod commands;

use agentbridge_core::config::{LogFormat, LogLevel};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// agentbridge - HTTP bridge to a Claude agent session
#[derive(Parser)]
#[command(name = "agentbridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file
    #[arg(short, long, env = "AGENTBRIDGE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log line format on stderr (text or json), overriding the config
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve(commands::serve::ServeArgs),

    /// Check the agent CLI, credentials, and configuration
    Doctor,

    /// Configuration management
    Config(commands::config::ConfigArgs),

    /// Show version information
    Version,
}

/// Run the CLI with the given arguments.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve(args) => commands::serve::run(args, config_path).await,
        Commands::Doctor => commands::doctor::run(config_path).await,
        Commands::Config(args) => commands::config::run(args, config_path),
        Commands::Version => {
            println!("agentbridge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Default `EnvFilter` directive when `RUST_LOG` is unset.
///
/// Each `-v` raises the configured level by one step.
pub fn log_filter(level: LogLevel, verbose: u8) -> &'static str {
    const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
    let base = LEVELS
        .iter()
        .position(|l| *l == level.as_str())
        .unwrap_or(2);
    LEVELS[(base + verbose as usize).min(LEVELS.len() - 1)]
}

/// Log format from the flag, else the config.
pub fn log_format(flag: Option<LogFormat>, configured: LogFormat) -> LogFormat {
    flag.unwrap_or(configured)
}
