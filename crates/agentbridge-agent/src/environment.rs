//! Process-level side effects of starting a session.

use crate::Result;
use agentbridge_core::auth::RuntimeEnv;
use std::path::Path;
use tracing::debug;

/// Applies a session's working directory and environment to the host process.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessEnvironment: Send + Sync {
    /// Change into `working_dir` and export `env`.
    fn apply(&self, working_dir: &Path, env: &RuntimeEnv) -> Result<()>;
}

/// Mutates the real process: `chdir` plus `setenv` for every variable.
///
/// Process-wide state, so concurrent sessions in one process would clobber
/// each other. The session manager allows only one.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemEnvironment;

impl ProcessEnvironment for SystemEnvironment {
    fn apply(&self, working_dir: &Path, env: &RuntimeEnv) -> Result<()> {
        std::env::set_current_dir(working_dir)?;
        for (key, value) in env.iter() {
            std::env::set_var(key, value);
        }
        debug!(
            working_dir = %working_dir.display(),
            vars = ?env.keys(),
            "Applied session environment"
        );
        Ok(())
    }
}
