//! Error types for build-plan resolution.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while building a benchmark build plan.
#[derive(Error, Debug)]
pub enum PlanError {
    /// Symbolic reference not advertised by any configured repository
    #[error("reference '{0}' not found in any configured repository")]
    ReferenceNotFound(String),

    /// More than one (repository, namespace) pair advertises the reference
    #[error("ambiguous reference '{name}': {matches} matches across repositories")]
    AmbiguousReference { name: String, matches: usize },

    /// Two variants in the same namespace share a name or directory
    #[error("duplicate {field} '{value}' across {scope} variants")]
    DuplicateField {
        field: &'static str,
        value: String,
        scope: &'static str,
    },

    /// Target variant references a library variant that was never declared
    #[error("target variant '{variant}' references unknown library variant '{dependency}'")]
    UnknownDependency { variant: String, dependency: String },

    /// Preset file or include target does not exist
    #[error("preset file not found: {0}")]
    PresetNotFound(PathBuf),

    /// Preset include graph loops back onto an ancestor
    #[error("cyclic preset include: {path} includes its ancestor {ancestor}")]
    CyclicInclude { path: PathBuf, ancestor: PathBuf },

    /// Missing or malformed configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for build-plan operations.
pub type Result<T> = std::result::Result<T, PlanError>;
