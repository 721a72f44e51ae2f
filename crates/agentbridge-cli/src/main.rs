//! agentbridge CLI entry point.

use agentbridge_cli::{log_filter, log_format, run, Cli};
use agentbridge_core::config::LogFormat;
use agentbridge_core::Config;
use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Config errors surface from the command itself; logging falls back to defaults.
    let logging = Config::resolve(cli.config.as_deref())
        .map(|config| config.logging)
        .unwrap_or_default();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| log_filter(logging.level, cli.verbose).into());
    let registry = tracing_subscriber::registry().with(filter);

    // stdout is reserved for command output
    match log_format(cli.log_format, logging.format) {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }

    run(cli).await
}
