//! AWS credential detection and Bedrock defaults.

use crate::env::{self, vars};
use serde::Serialize;
use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Upper bound on one `aws sts get-caller-identity` probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default Bedrock region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default Bedrock model.
pub const DEFAULT_BEDROCK_MODEL: &str = "global.anthropic.claude-sonnet-4-5-20250929-v1:0";

/// Default Bedrock small/fast model.
pub const DEFAULT_BEDROCK_SMALL_MODEL: &str = "us.anthropic.claude-3-5-haiku-20241022-v1:0";

/// Where AWS credentials were found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    /// `AWS_ACCESS_KEY_ID` and `AWS_SECRET_ACCESS_KEY` are set.
    DirectCredentials,

    /// `AWS_PROFILE` is set.
    SsoProfile,

    /// The default profile chain answered the probe.
    DefaultProfile,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DirectCredentials => "direct_credentials",
            Self::SsoProfile => "sso_profile",
            Self::DefaultProfile => "default_profile",
        };
        f.write_str(s)
    }
}

/// Outcome of credential detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CredentialStatus {
    /// Credentials are usable.
    pub available: bool,

    /// Which source was consulted. A named profile is reported even when
    /// it fails validation.
    pub source: Option<CredentialSource>,
}

/// Detect AWS credentials from the process environment.
pub async fn detect_credentials() -> CredentialStatus {
    if env::get_var(vars::AWS_ACCESS_KEY_ID).is_some()
        && env::get_var(vars::AWS_SECRET_ACCESS_KEY).is_some()
    {
        return CredentialStatus {
            available: true,
            source: Some(CredentialSource::DirectCredentials),
        };
    }

    if let Some(profile) = env::get_var(vars::AWS_PROFILE) {
        return CredentialStatus {
            available: validate_profile(&profile).await,
            source: Some(CredentialSource::SsoProfile),
        };
    }

    if caller_identity(None).await {
        return CredentialStatus {
            available: true,
            source: Some(CredentialSource::DefaultProfile),
        };
    }

    CredentialStatus {
        available: false,
        source: None,
    }
}

/// Check that a named profile can call STS.
pub async fn validate_profile(profile: &str) -> bool {
    caller_identity(Some(profile)).await
}

async fn caller_identity(profile: Option<&str>) -> bool {
    let mut cmd = Command::new("aws");
    cmd.args(["sts", "get-caller-identity"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    if let Some(profile) = profile {
        cmd.env(vars::AWS_PROFILE, profile);
    }

    match tokio::time::timeout(PROBE_TIMEOUT, cmd.status()).await {
        Ok(Ok(status)) => status.success(),
        Ok(Err(e)) => {
            debug!(error = %e, "aws CLI unavailable");
            false
        }
        Err(_) => {
            debug!("aws sts probe timed out");
            false
        }
    }
}

/// Region and model defaults for Bedrock sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BedrockDefaults {
    pub region: String,
    pub model: String,
    pub small_model: String,
}

/// Resolve Bedrock defaults from the environment.
pub fn bedrock_defaults() -> BedrockDefaults {
    BedrockDefaults {
        region: env::get_var_or(vars::AWS_REGION, DEFAULT_REGION),
        model: env::get_var_or(vars::ANTHROPIC_MODEL, DEFAULT_BEDROCK_MODEL),
        small_model: env::get_var_or(
            vars::ANTHROPIC_SMALL_FAST_MODEL,
            DEFAULT_BEDROCK_SMALL_MODEL,
        ),
    }
}
