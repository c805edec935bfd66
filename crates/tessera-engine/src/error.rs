//! Engine error types.

use tessera_core::error::TesseraError;
use tessera_core::models::validation::{Reason, ValidationResult};
use thiserror::Error;

/// Why autobind could not cover one requested product.
#[derive(Debug, Clone)]
pub struct CoverageFailure {
    pub product_id: String,
    /// Eligibility reasons from the pools that would have provided it.
    pub reasons: Vec<Reason>,
}

fn product_list(failures: &[CoverageFailure]) -> String {
    failures
        .iter()
        .map(|f| f.product_id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// A bind was evaluated and rejected. The full result, warnings
    /// included, rides along for callers that want details.
    #[error("bind refused: {}", .0.summary())]
    Refused(ValidationResult),

    /// Autobind found no pool combination covering these products.
    #[error("no eligible pools cover: {}", product_list(.failures))]
    Coverage { failures: Vec<CoverageFailure> },

    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error(transparent)]
    Core(#[from] TesseraError),
}

impl From<EngineError> for TesseraError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Core(e) => e,
            other => TesseraError::Validation {
                message: other.to_string(),
            },
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
