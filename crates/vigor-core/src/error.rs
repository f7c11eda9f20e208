//! # Error Types
//!
//! Domain-specific error types for vigor-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  vigor-core errors (this file)                                         │
//! │  ├── CoreError        - Business rule / precondition violations        │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  vigor-db errors (separate crate)                                      │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  vigor-engine errors (separate crate)                                  │
//! │  └── EngineError      - Wraps all of the above for callers             │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → Caller              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (id, status, quantities)
//! 3. Errors are enum variants, never String
//! 4. Each error variant maps to a user-facing message

use thiserror::Error;

use crate::types::{MembershipStatus, SaleStatus};

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent business rule violations or precondition failures.
/// Every precondition is checked before any mutation, so a `CoreError` always
/// means the targeted row was left untouched.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Freeze was requested for a membership that is not active.
    #[error("Membership {id} is {status:?}, only active memberships can be frozen")]
    MembershipNotActive {
        id: String,
        status: MembershipStatus,
    },

    /// Unfreeze was requested for a membership that is not frozen.
    #[error("Membership {id} is {status:?}, only frozen memberships can be reactivated")]
    MembershipNotFrozen {
        id: String,
        status: MembershipStatus,
    },

    /// Automatic unfreeze needs a freeze_date to compute the day credit.
    #[error("Membership {id} has no freeze date recorded")]
    MissingFreezeDate { id: String },

    /// Insufficient stock to complete a decrease-type movement.
    ///
    /// ## When This Occurs
    /// - Selling or reserving more than the available stock
    ///   (current_stock - reserved_stock)
    #[error("Insufficient stock for {name}: available {available}, requested {requested}")]
    InsufficientStock {
        name: String,
        available: i64,
        requested: i64,
    },

    /// Sale is not in a state that allows the requested operation.
    ///
    /// ## When This Occurs
    /// - Completing a layaway that is not pending
    /// - Cancelling an already cancelled layaway
    /// - Refunding a sale that was never completed
    #[error("Sale {sale_id} is {status:?}, cannot perform operation")]
    InvalidSaleStatus { sale_id: String, status: SaleStatus },

    /// Layaway still has an outstanding balance.
    #[error("Layaway {sale_id} has {pending_cents} cents pending, cannot complete")]
    LayawayBalanceOutstanding { sale_id: String, pending_cents: i64 },

    /// A bulk request resolved to zero eligible memberships.
    #[error("No eligible memberships for bulk {action}: {reason}")]
    NoEligibleMemberships { action: String, reason: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, invalid date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// A collection that must not be empty was empty.
    #[error("{field} must contain at least one entry")]
    Empty { field: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            name: "Protein Bar".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for Protein Bar: available 3, requested 5"
        );

        let err = CoreError::MembershipNotActive {
            id: "m-1".to_string(),
            status: MembershipStatus::Cancelled,
        };
        assert!(err.to_string().contains("only active memberships"));
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "reason".to_string(),
        };
        assert_eq!(err.to_string(), "reason is required");

        let err = ValidationError::OutOfRange {
            field: "deposit_percentage".to_string(),
            min: 1,
            max: 100,
        };
        assert_eq!(
            err.to_string(),
            "deposit_percentage must be between 1 and 100"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::MustBePositive {
            field: "quantity".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
