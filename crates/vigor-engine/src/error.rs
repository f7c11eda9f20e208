//! # Engine Error Types
//!
//! The error surface callers of vigor-engine see.
//!
//! ## Propagation Policy
//! Engine operations fail fast and whole: a precondition or persistence
//! error means no partial mutation (single-entity ops) or an explicit
//! compensation (sales, see `sales.rs`). The two deliberate
//! catch-and-continue sites are the bulk orchestrator (per-item errors)
//! and up-front stock validation (collects every insufficiency before
//! failing).

use thiserror::Error;

use vigor_core::CoreError;
use vigor_db::DbError;

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Business rule / precondition violation.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Persistence failure.
    #[error(transparent)]
    Db(#[from] DbError),

    /// Collected stock-insufficiency messages from up-front validation.
    ///
    /// Holds EVERY failing line, not just the first, so the caller can
    /// show the user everything that is wrong in one pass.
    #[error("Stock validation failed: {}", errors.join("; "))]
    StockValidation { errors: Vec<String> },
}

impl From<vigor_core::ValidationError> for EngineError {
    fn from(err: vigor_core::ValidationError) -> Self {
        EngineError::Core(CoreError::Validation(err))
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_validation_lists_every_error() {
        let err = EngineError::StockValidation {
            errors: vec![
                "Insufficient stock for Protein Bar: available 3, requested 5".to_string(),
                "Insufficient stock for Shaker: available 0, requested 1".to_string(),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("Protein Bar"));
        assert!(msg.contains("Shaker"));
    }

    #[test]
    fn test_core_error_passes_through() {
        let err: EngineError = CoreError::MissingFreezeDate {
            id: "m-1".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Membership m-1 has no freeze date recorded");
    }
}
