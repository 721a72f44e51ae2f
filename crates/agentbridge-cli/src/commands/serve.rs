//! Serve command.

use agentbridge_agent::{ClaudeCliRuntime, SessionManager, SessionSettings, SystemEnvironment};
use agentbridge_core::Config;
use agentbridge_gateway::{shutdown_signal, Gateway, GatewayConfig};
use clap::Args;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Serve command arguments.
#[derive(Args)]
pub struct ServeArgs {
    /// Bind host (overrides config and HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port number (overrides config and PORT)
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// Resolve the configuration the server runs with.
pub fn effective_config(args: &ServeArgs, config_path: Option<&Path>) -> anyhow::Result<Config> {
    let mut config = Config::resolve(config_path)?;
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate()?;
    Ok(config)
}

/// Run the serve command.
pub async fn run(args: ServeArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = effective_config(&args, config_path)?;

    let runtime = ClaudeCliRuntime::from_config(&config.agent);
    match runtime.locate() {
        Ok(location) => info!(
            path = %location.path.display(),
            source = %location.source,
            "Using Claude CLI"
        ),
        Err(e) => warn!("{}; /initialize will fail until it is installed", e),
    }

    let sessions = SessionManager::new(
        Arc::new(runtime),
        Arc::new(SystemEnvironment),
        SessionSettings::from(&config.agent),
    );

    info!(
        model = %config.agent.default_model,
        approval_timeout_secs = config.agent.approval_timeout_secs,
        "agentbridge {} listening on {}",
        env!("CARGO_PKG_VERSION"),
        config.bind_addr()
    );

    let gateway = Gateway::new(GatewayConfig::from(&config.server), Arc::new(sessions));
    gateway.run(shutdown_signal()).await?;
    Ok(())
}
