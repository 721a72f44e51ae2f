//! Configuration commands.

use agentbridge_core::config::Config;
use agentbridge_core::paths;
use clap::Args;
use std::path::Path;

/// Config command arguments.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(clap::Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration (file, environment, defaults)
    Show,

    /// Show the default configuration file path
    Path,
}

/// Run the config command.
pub fn run(args: ConfigArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show => {
            let config = Config::resolve(config_path)?;
            println!("{}", config.to_json5()?);
        }

        ConfigCommand::Path => {
            let path = paths::config_file()?;
            println!("{}", path.display());
        }
    }

    Ok(())
}
