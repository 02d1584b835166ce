//! Error types for the stacking toolkit

use thiserror::Error;

/// Result type alias for stacking operations
pub type Result<T> = std::result::Result<T, StackError>;

/// Main error type for the stacking toolkit
#[derive(Error, Debug)]
pub enum StackError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Candidate {candidate} failed to fit{}: {reason}", fold_suffix(.fold))]
    CandidateFitFailure {
        candidate: String,
        fold: Option<usize>,
        reason: String,
    },

    #[error("Alignment error: {0}")]
    AlignmentError(String),

    #[error("Degenerate blend: {0}")]
    DegenerateBlendError(String),

    #[error("Finalization of {candidate} failed: {reason}")]
    FinalizationError { candidate: String, reason: String },

    #[error("Convergence failed after {iterations} iterations")]
    ConvergenceError { iterations: usize },

    #[error("Fit exceeded its time budget of {limit_ms} ms")]
    Timeout { limit_ms: u128 },

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

fn fold_suffix(fold: &Option<usize>) -> String {
    match fold {
        Some(k) => format!(" on fold {}", k),
        None => String::new(),
    }
}

impl StackError {
    /// Wrap a model-level error as the failure of one candidate column.
    pub fn candidate_failure(candidate: impl Into<String>, fold: Option<usize>, source: StackError) -> Self {
        StackError::CandidateFitFailure {
            candidate: candidate.into(),
            fold,
            reason: source.to_string(),
        }
    }

    /// Whether the run may continue after this error (the column is dropped).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, StackError::CandidateFitFailure { .. })
    }
}

impl From<polars::error::PolarsError> for StackError {
    fn from(err: polars::error::PolarsError) -> Self {
        StackError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for StackError {
    fn from(err: serde_json::Error) -> Self {
        StackError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for StackError {
    fn from(err: ndarray::ShapeError) -> Self {
        StackError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
