//! Error types for mvabatch

use thiserror::Error;

/// mvabatch error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// Configuration failed semantic validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Selection / feature / weight expression failed to parse
    #[error("Expression error: {0}")]
    Expression(String),

    /// External program could not be started
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        /// Program name as passed to the OS.
        program: String,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// External program exited unsuccessfully
    #[error("`{program}` exited with {status}")]
    Process {
        /// Program name as passed to the OS.
        program: String,
        /// Rendered exit status.
        status: String,
    },

    /// Remote listing command failed
    #[error("Listing error: {0}")]
    Listing(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
