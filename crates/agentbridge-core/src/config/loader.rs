//! Configuration loading, environment overrides, and validation.

use super::Config;
use crate::env;
use crate::error::ConfigError;
use crate::paths;
use std::fs;
use std::path::{Path, PathBuf};

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = paths::config_file()?;
        Self::load(&path)
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Json5(e.to_string()))
    }

    /// Serialize to JSON5 string.
    pub fn to_json5(&self) -> Result<String, ConfigError> {
        // json5 has no serializer; JSON is valid JSON5
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Resolve the effective configuration for a server process.
    ///
    /// An explicit path (flag or `AGENTBRIDGE_CONFIG`) must exist. Without one,
    /// the default file is used when present and built-in defaults otherwise.
    /// Environment overrides are applied on top and the result is validated.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let explicit: Option<PathBuf> = explicit
            .map(Path::to_path_buf)
            .or_else(|| env::get_var(env::vars::AGENTBRIDGE_CONFIG).map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => Self::load(&paths::expand_tilde(&path.to_string_lossy()))?,
            None => match Self::load_default() {
                Ok(config) => config,
                Err(ConfigError::NotFound(_)) => Self::default(),
                Err(e) => return Err(e),
            },
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `HOST`, `PORT`, `CLAUDE_BIN`, and `AGENTBRIDGE_APPROVAL_TIMEOUT_SECS`.
    pub fn apply_env_overrides(&mut self) {
        if let Some(host) = env::get_var(env::vars::HOST) {
            self.server.host = host;
        }
        if let Some(port) = env::get_u16(env::vars::PORT) {
            self.server.port = port;
        }
        if let Some(bin) = env::get_var(env::vars::CLAUDE_BIN) {
            self.agent.cli_path = Some(PathBuf::from(bin));
        }
        if let Some(secs) = env::get_u64(env::vars::AGENTBRIDGE_APPROVAL_TIMEOUT_SECS) {
            self.agent.approval_timeout_secs = secs;
        }
    }

    /// Validate the configuration, collecting all errors before returning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.server.host.trim().is_empty() {
            errors.push("Server host cannot be empty".to_string());
        }

        if self.server.port == 0 {
            errors.push("Server port cannot be 0".to_string());
        }

        if self.agent.default_model.trim().is_empty() {
            errors.push("Agent default_model cannot be empty".to_string());
        }

        if self.agent.approval_timeout_secs == 0 {
            errors.push("Agent approval_timeout_secs must be greater than 0".to_string());
        }

        if self.agent.connect_timeout_secs == 0 {
            errors.push("Agent connect_timeout_secs must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors.join("; ")))
        }
    }

    /// Socket address string for the HTTP listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
