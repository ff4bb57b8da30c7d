use std::path::PathBuf;
use thiserror::Error;

/// Main error type for smokegate
#[derive(Debug, Error)]
pub enum GateError {
    #[error("Corpus error: {0}")]
    Corpus(#[from] CorpusError),

    #[error("Matrix error: {0}")]
    Matrix(#[from] MatrixError),

    #[error("Invocation error: {0}")]
    Invocation(#[from] InvocationError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Report error: {0}")]
    Report(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Corpus retrieval and extraction errors
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("Invalid corpus URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Archive extraction failed: {0}")]
    Extract(String),

    #[error("Corpus path not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Corpus at {} contains no files", .0.display())]
    Empty(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Matrix file loading and validation errors
#[derive(Debug, Error)]
pub enum MatrixError {
    #[error("Failed to parse matrix: {0}")]
    Parse(String),

    #[error("Invalid matrix: {0}")]
    Validation(String),

    #[error("No steps matched the selection filters")]
    NoStepsSelected,

    #[error("Failed to read matrix file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Errors raised while preparing or launching invocations
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("Program '{0}' was not found on PATH")]
    ProgramNotFound(String),

    #[error("Failed to prepare step '{step}': {reason}")]
    Prepare { step: String, reason: String },
}

impl CorpusError {
    /// Wrap an I/O error with the path it occurred on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CorpusError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for smokegate operations
pub type GateResult<T> = Result<T, GateError>;
