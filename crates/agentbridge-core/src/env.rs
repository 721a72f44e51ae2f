//! Environment variable handling.

use std::env;

/// Get an environment variable, returning None if not set or empty.
pub fn get_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable with a default value.
pub fn get_var_or(name: &str, default: &str) -> String {
    get_var(name).unwrap_or_else(|| default.to_string())
}

/// Get an environment variable as a u16 (e.g., for ports).
pub fn get_u16(name: &str) -> Option<u16> {
    get_var(name).and_then(|v| v.trim().parse().ok())
}

/// Get an environment variable as a u64.
pub fn get_u64(name: &str) -> Option<u64> {
    get_var(name).and_then(|v| v.trim().parse().ok())
}

/// Environment variable names read or written by agentbridge.
pub mod vars {
    /// Bind address override.
    pub const HOST: &str = "HOST";

    /// Listen port override.
    pub const PORT: &str = "PORT";

    /// Explicit agent CLI binary.
    pub const CLAUDE_BIN: &str = "CLAUDE_BIN";

    /// Config file override.
    pub const AGENTBRIDGE_CONFIG: &str = "AGENTBRIDGE_CONFIG";

    /// Approval timeout override, in seconds.
    pub const AGENTBRIDGE_APPROVAL_TIMEOUT_SECS: &str = "AGENTBRIDGE_APPROVAL_TIMEOUT_SECS";

    /// API key consumed by the agent runtime.
    pub const ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";

    /// Model override consumed by the agent runtime.
    pub const ANTHROPIC_MODEL: &str = "ANTHROPIC_MODEL";

    /// Small/fast model override for Bedrock.
    pub const ANTHROPIC_SMALL_FAST_MODEL: &str = "ANTHROPIC_SMALL_FAST_MODEL";

    /// Switches the agent runtime to Amazon Bedrock.
    pub const CLAUDE_CODE_USE_BEDROCK: &str = "CLAUDE_CODE_USE_BEDROCK";

    pub const AWS_REGION: &str = "AWS_REGION";
    pub const AWS_PROFILE: &str = "AWS_PROFILE";
    pub const AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
    pub const AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_var_empty_is_none() {
        env::set_var("AGENTBRIDGE_TEST_EMPTY", "");
        assert!(get_var("AGENTBRIDGE_TEST_EMPTY").is_none());
        assert!(get_var("AGENTBRIDGE_TEST_NONEXISTENT").is_none());
    }

    #[test]
    fn test_get_var_or() {
        assert_eq!(get_var_or("AGENTBRIDGE_TEST_UNSET_OR", "fallback"), "fallback");
    }

    #[test]
    fn test_get_numbers() {
        env::set_var("AGENTBRIDGE_TEST_PORT", "9001");
        env::set_var("AGENTBRIDGE_TEST_BAD_PORT", "70000");
        env::set_var("AGENTBRIDGE_TEST_SECS", "45");

        assert_eq!(get_u16("AGENTBRIDGE_TEST_PORT"), Some(9001));
        assert_eq!(get_u16("AGENTBRIDGE_TEST_BAD_PORT"), None);
        assert_eq!(get_u64("AGENTBRIDGE_TEST_SECS"), Some(45));
    }
}
