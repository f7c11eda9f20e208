//! # vigor-core: Pure Business Logic for Vigor Gym
//!
//! This crate is the **heart** of Vigor Gym's backend. It contains all
//! business logic as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Vigor Gym Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  Callers (admin UI / API layer)                 │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    vigor-engine                                 │   │
//! │  │    InventoryLedger, FreezeEngine, BulkOrchestrator, Sales      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ vigor-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │  freeze   │  │ calendar  │  │   │
//! │  │   │Membership │  │   Money   │  │  plans    │  │ civil-day │  │   │
//! │  │   │ Movement  │  │  TaxRate  │  │  credits  │  │   math    │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    vigor-db (Database Layer)                    │   │
//! │  │              SQLite queries, migrations, repositories           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Membership, Product, Sale, movements, ...)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`calendar`] - Civil-date arithmetic in the business timezone
//! - [`freeze`] - Freeze/unfreeze state-machine planning
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic - same input = same output
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: All monetary values are in cents (i64) to avoid float errors
//! 4. **Explicit Errors**: All errors are typed, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod calendar;
pub mod error;
pub mod freeze;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use vigor_core::Money` instead of
// `use vigor_core::money::Money`

pub use calendar::BusinessCalendar;
pub use error::{CoreError, CoreResult, ValidationError};
pub use freeze::{FreezeMode, FreezePlan, UnfreezePlan};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default tax rate in basis points: 16% IVA.
///
/// ## Why a constant?
/// Single-location deployment with one tax regime. Becomes per-product or
/// per-tenant configuration if the business ever crosses a border.
pub const DEFAULT_TAX_RATE_BPS: u32 = 1600;

/// Maximum quantity of a single line item or movement.
///
/// ## Business Reason
/// Prevents accidental over-entry (e.g., typing 1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum days for a single manual freeze.
///
/// ## Business Reason
/// A pause longer than a year is a cancellation/re-enrollment decision,
/// not a freeze.
pub const MAX_FREEZE_DAYS: i64 = 365;

/// Default layaway deposit requirement, in percent of the total.
pub const DEFAULT_DEPOSIT_PERCENTAGE: u32 = 50;

/// Days a layaway holds its reservation before expiring.
pub const LAYAWAY_HOLD_DAYS: i64 = 30;
