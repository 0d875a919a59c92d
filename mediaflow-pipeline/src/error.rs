//! Pipeline error types.

use mediaflow_core::Error as CoreError;
use thiserror::Error;

/// Pipeline error type.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A stage failed.
    #[error("{0}")]
    Core(#[from] CoreError),

    /// The job description is not valid JSON for [`PipelineConfig`](crate::PipelineConfig).
    #[error("Job description error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A stream mapping names an input stream that does not exist.
    #[error("Stream {0} not found")]
    StreamNotFound(usize),

    /// The output exists and overwriting was not requested.
    #[error("Output already exists: {0}")]
    OutputExists(String),
}

impl PipelineError {
    /// The stage error behind this one, if any.
    pub fn core(&self) -> Option<&CoreError> {
        match self {
            PipelineError::Core(e) => Some(e),
            _ => None,
        }
    }
}

/// Pipeline result type.
pub type Result<T> = std::result::Result<T, PipelineError>;
