//! Error taxonomy for the Moral Spectrometry Engine

use thiserror::Error;

/// The engine's error taxonomy.
///
/// Parser errors are *returned*, never raised as this type — `submit_response`
/// reports them inline via `SubmitOutcome::errors`. `EngineError` covers
/// everything that crosses a state-machine, storage, or provider boundary.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("state violation: {0}")]
    StateViolation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("version error: {0}")]
    Version(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("numerical error: {0}")]
    Numerical(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Validation error raised by the response parser (C1). Never propagated as
/// an `EngineError` — the caller of `submit_response` receives it inline.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ValidationError {
    MissingChoice,
    InvalidChoice(String),
    InvalidRange { field: String, value: f64 },
    NotAString,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::MissingChoice => write!(f, "missing_choice"),
            ValidationError::InvalidChoice(c) => write!(f, "invalid_choice: {}", c),
            ValidationError::InvalidRange { field, value } => {
                write!(f, "invalid_range: {} = {}", field, value)
            }
            ValidationError::NotAString => write!(f, "not_a_string"),
        }
    }
}
