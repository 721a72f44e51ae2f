//! Resolution of the agent runtime's credential environment.
//!
//! A session's auth method decides which variables the runtime sees. Extra
//! variables supplied by the client are merged last and win.

use crate::env::{self, vars};
use crate::types::{AuthMethod, InitializeRequest};
use std::collections::BTreeMap;
use std::fmt;

/// Environment variables handed to the agent runtime.
///
/// Values may hold credentials, so `Debug` lists only the names.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RuntimeEnv {
    vars: BTreeMap<String, String>,
}

impl RuntimeEnv {
    /// Create an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Look up a variable.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Iterate over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Variable names in order.
    pub fn keys(&self) -> Vec<&str> {
        self.vars.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }
}

impl fmt::Debug for RuntimeEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.vars.keys()).finish()
    }
}

/// Build the runtime environment for a session.
pub fn resolve_env(method: AuthMethod, req: &InitializeRequest) -> RuntimeEnv {
    let mut env = RuntimeEnv::new();

    match method {
        AuthMethod::ApiKey => {
            if let Some(key) = req.api_key.as_ref().filter(|k| !k.is_blank()) {
                env.set(vars::ANTHROPIC_API_KEY, key.expose_secret());
            }
        }
        AuthMethod::Bedrock => {
            env.set(vars::CLAUDE_CODE_USE_BEDROCK, "1");
            if let Some(region) = &req.aws_region {
                env.set(vars::AWS_REGION, region.clone());
            }
            if let Some(profile) = &req.aws_profile {
                env.set(vars::AWS_PROFILE, profile.clone());
            }
        }
        AuthMethod::Subscription => {}
    }

    for (key, value) in &req.env {
        env.set(key.clone(), value.clone());
    }

    env
}

/// Pick the session model: the request, then `ANTHROPIC_MODEL` (session
/// environment first, process environment second), then the configured default.
pub fn resolve_model(requested: Option<&str>, session_env: &RuntimeEnv, default: &str) -> String {
    requested
        .filter(|m| !m.trim().is_empty())
        .map(str::to_string)
        .or_else(|| session_env.get(vars::ANTHROPIC_MODEL).map(str::to_string))
        .or_else(|| env::get_var(vars::ANTHROPIC_MODEL))
        .unwrap_or_else(|| default.to_string())
}
