//! Load-time workflow errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading, parsing or validating a workflow definition.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("DSL parse error: {0}")]
    DslParseError(String),
    #[error("Unknown step method `{method}` at step {index}")]
    UnknownMethod { index: usize, method: String },
    #[error("Invalid params for `{method}` at step {index}: {reason}")]
    InvalidParams {
        index: usize,
        method: String,
        reason: String,
    },
    #[error("Unknown catalog workflow: {0}")]
    UnknownWorkflow(String),
    #[error("Config error: {0}")]
    ConfigError(String),
    #[error("Failed to read `{}`", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
