//! Shared tooling for the netctl workspace
//!
//! This crate holds the ambient pieces every other crate leans on, none of
//! which know anything about controller endpoints.
//!
//! # Modules
//!
//! - `async_utils` - Backoff policy for transient failures and per-task deadlines
//! - `config` - Prefixed environment variable loading
//! - `error` - Error chain rendering for diagnostics
//! - `logging` - Credential redaction and duration formatting for log lines

pub mod async_utils;
pub mod config;
pub mod error;
pub mod logging;

use thiserror::Error;

/// Errors that can occur in the tooling crate
#[derive(Debug, Error)]
pub enum ToolingError {
    /// A configuration value was present but unusable
    #[error("Invalid configuration value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    /// A task deadline elapsed before the operation finished
    #[error("Deadline of {0:?} exceeded")]
    DeadlineExceeded(std::time::Duration),
}

/// Result type for tooling operations
pub type Result<T> = std::result::Result<T, ToolingError>;

/// Get version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
