//! Error types for benchmark execution.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while executing a benchmark sweep.
#[derive(Error, Debug)]
pub enum RunError {
    /// Missing or malformed configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Solver binary missing from the resolved install path
    #[error("solver executable not found: {0}")]
    ExecutableNotFound(PathBuf),

    /// External command exited with a non-zero code
    #[error("command exited with non-zero code {code}; last lines of {log}:\n{log_tail}")]
    ExternalCommandFailed {
        code: i32,
        log: PathBuf,
        log_tail: String,
    },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for benchmark execution.
pub type Result<T> = std::result::Result<T, RunError>;
