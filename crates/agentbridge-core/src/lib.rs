//! # agentbridge-core
//!
//! Core types, configuration, and utilities for agentbridge.
//!
//! This crate provides shared functionality used across all agentbridge crates:
//!
//! - **Configuration**: Loading, validation, and environment overrides for the server config
//! - **Types**: Wire types for session setup, queries, approvals, and the streamed events
//! - **Auth**: Resolution of the agent runtime's credential environment
//! - **Utilities**: Path resolution, environment handling, and secret redaction

pub mod auth;
pub mod aws;
pub mod config;
pub mod env;
pub mod error;
pub mod paths;
pub mod secret;
pub mod types;

// Re-exports for convenience
pub use config::Config;
pub use error::{ConfigError, Error, Result};
pub use secret::SecretString;
pub use types::*;
