//! # Validation Module
//!
//! Input validation utilities for Vigor Gym.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Caller (UI / API boundary)                                   │
//! │  ├── Basic format checks, immediate feedback                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE - business rule validation                       │
//! │  ├── Ranges, required fields, id formats                               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / UNIQUE / CHECK / foreign key constraints               │
//! │                                                                         │
//! │  Defense in depth: multiple layers catch different errors              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::{MAX_FREEZE_DAYS, MAX_ITEM_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a movement or sale-line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a manual freeze day count.
///
/// ## Rules
/// - Must be positive
/// - Capped at MAX_FREEZE_DAYS (a year; longer pauses are a plan change,
///   not a freeze)
pub fn validate_freeze_days(days: i64) -> ValidationResult<()> {
    if days <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "freeze_days".to_string(),
        });
    }

    if days > MAX_FREEZE_DAYS {
        return Err(ValidationError::OutOfRange {
            field: "freeze_days".to_string(),
            min: 1,
            max: MAX_FREEZE_DAYS,
        });
    }

    Ok(())
}

/// Validates a layaway deposit percentage (1-100).
pub fn validate_deposit_percentage(percent: u32) -> ValidationResult<()> {
    if !(1..=100).contains(&percent) {
        return Err(ValidationError::OutOfRange {
            field: "deposit_percentage".to_string(),
            min: 1,
            max: 100,
        });
    }

    Ok(())
}

/// Validates a price/amount in cents.
///
/// ## Rules
/// - Must be non-negative (>= 0)
/// - Zero is allowed (free items, waived fees)
pub fn validate_amount_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "amount".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a payment amount in cents (must be strictly positive).
pub fn validate_payment_amount(cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "payment amount".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates that a free-text field is present and non-blank.
pub fn validate_required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates a UUID string format.
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_freeze_days() {
        assert!(validate_freeze_days(7).is_ok());
        assert!(validate_freeze_days(365).is_ok());

        assert!(validate_freeze_days(0).is_err());
        assert!(validate_freeze_days(-5).is_err());
        assert!(validate_freeze_days(366).is_err());
    }

    #[test]
    fn test_validate_deposit_percentage() {
        assert!(validate_deposit_percentage(1).is_ok());
        assert!(validate_deposit_percentage(50).is_ok());
        assert!(validate_deposit_percentage(100).is_ok());

        assert!(validate_deposit_percentage(0).is_err());
        assert!(validate_deposit_percentage(101).is_err());
    }

    #[test]
    fn test_validate_amounts() {
        assert!(validate_amount_cents(0).is_ok());
        assert!(validate_amount_cents(1099).is_ok());
        assert!(validate_amount_cents(-100).is_err());

        assert!(validate_payment_amount(100).is_ok());
        assert!(validate_payment_amount(0).is_err());
    }

    #[test]
    fn test_validate_required() {
        assert!(validate_required("reason", "damaged goods").is_ok());
        assert!(validate_required("reason", "").is_err());
        assert!(validate_required("reason", "   ").is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("").is_err());
        assert!(validate_uuid("not-a-uuid").is_err());
    }
}
