//! Path resolution utilities.

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Get the agentbridge base directory (~/.agentbridge).
pub fn base_dir() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or_else(|| {
        ConfigError::Validation("Could not determine home directory".to_string())
    })?;
    Ok(home.join(".agentbridge"))
}

/// Get the main config file path (~/.agentbridge/agentbridge.json5).
pub fn config_file() -> Result<PathBuf, ConfigError> {
    Ok(base_dir()?.join("agentbridge.json5"))
}

/// Per-user install location of the agent CLI (~/.claude/local/claude).
pub fn claude_local_binary() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".claude").join("local").join("claude"))
}

/// Expand tilde (~) in a path.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Check that a session working directory exists and is a directory.
pub fn validate_working_dir(path: &Path) -> Result<PathBuf, ConfigError> {
    let expanded = expand_tilde(&path.to_string_lossy());
    if !expanded.exists() {
        return Err(ConfigError::MissingWorkingDir(expanded));
    }
    if !expanded.is_dir() {
        return Err(ConfigError::NotADirectory(expanded));
    }
    Ok(expanded)
}
