//! # Domain Types
//!
//! Core domain types used throughout Vigor Gym.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   Membership    │   │    Product      │   │      Sale       │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  status         │   │  sku (business) │   │  sale_number    │       │
//! │  │  freeze_date    │   │  current_stock  │   │  status         │       │
//! │  │  end_date       │   │  reserved_stock │   │  payment_status │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────────┐   ┌─────────────────┐   ┌───────────────┐     │
//! │  │ InventoryMovement   │   │  MovementType   │   │ PaymentDetail │     │
//! │  │  ─────────────────  │   │  ─────────────  │   │ ───────────── │     │
//! │  │  signed quantity    │   │  12 variants    │   │  split tender │     │
//! │  │  previous/new stock │   │  ± direction    │   │  rows         │     │
//! │  └─────────────────────┘   └─────────────────┘   └───────────────┘     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID where applicable: (sku, sale_number, refund_number)
//!
//! ## Versioned Mutability
//! Mutable entities (Membership, Product, Sale) carry a `row_version`
//! counter. Every update is conditional on the version read, so two
//! concurrent writers cannot silently overwrite each other.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 1600 bps = 16% (Mexican IVA)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate(crate::DEFAULT_TAX_RATE_BPS)
    }
}

// =============================================================================
// Membership
// =============================================================================

/// The lifecycle state of one membership.
///
/// ## State Machine
/// ```text
/// active ⇄ frozen      (freeze / unfreeze)
/// active → expired     (end_date passes)
/// active → cancelled   (operator action)
/// ```
/// `expired` and `cancelled` are terminal; rows are never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Active,
    Frozen,
    Expired,
    Cancelled,
}

/// One customer's subscription instance.
///
/// ## Freeze Bookkeeping
/// - `freeze_date` is set while frozen and cleared on reactivation
/// - `unfreeze_date` records the most recent reactivation
/// - `total_frozen_days` only ever increases (sum of all credits)
/// - `end_date`, once shifted by a credit, only moves forward
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Membership {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Customer this membership belongs to.
    pub customer_id: String,

    /// Plan purchased.
    pub plan_id: String,

    pub status: MembershipStatus,

    /// First day of coverage.
    pub start_date: NaiveDate,

    /// Last day of coverage. `None` for open-ended plans.
    pub end_date: Option<NaiveDate>,

    /// Set while the membership is frozen.
    pub freeze_date: Option<NaiveDate>,

    /// Most recent reactivation date.
    pub unfreeze_date: Option<NaiveDate>,

    /// Accumulated freeze credits in days. Monotonically non-decreasing.
    pub total_frozen_days: i64,

    pub amount_paid_cents: i64,
    pub subtotal_cents: i64,
    pub inscription_cents: i64,
    pub discount_cents: i64,

    /// Card-processing commission rate in basis points.
    pub commission_rate_bps: i64,
    pub commission_cents: i64,

    pub payment_method: String,

    /// Free-text annotations. Append-only: freeze/unfreeze operations add
    /// timestamped lines, never rewrite existing content.
    pub notes: Option<String>,

    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<String>,

    /// Optimistic-concurrency counter, incremented on every update.
    pub row_version: i64,
}

impl Membership {
    /// Checks if the membership can be frozen.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == MembershipStatus::Active
    }

    /// Checks if the membership can be reactivated.
    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.status == MembershipStatus::Frozen
    }

    /// Returns the amount paid as Money.
    #[inline]
    pub fn amount_paid(&self) -> Money {
        Money::from_cents(self.amount_paid_cents)
    }

    /// Appends a note line, preserving everything already there.
    pub fn appended_notes(&self, line: &str) -> String {
        match &self.notes {
            Some(existing) if !existing.is_empty() => format!("{}\n{}", existing, line),
            _ => line.to_string(),
        }
    }
}

// =============================================================================
// Product
// =============================================================================

/// An inventory-tracked item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Stock Keeping Unit - business identifier.
    pub sku: String,

    /// Display name shown on movements and stock error messages.
    pub name: String,

    /// Physical units on hand. Never negative.
    pub current_stock: i64,

    /// Units held for pending layaways. Part of `current_stock`.
    pub reserved_stock: i64,

    /// Reorder threshold.
    pub min_stock: i64,

    /// Optional storage ceiling.
    pub max_stock: Option<i64>,

    /// Unit of measure ("pieza", "caja", ...).
    pub unit: String,

    /// Warehouse location label.
    pub location: Option<String>,

    /// Whether product is active (soft delete).
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<String>,

    /// Optimistic-concurrency counter, incremented on every update.
    pub row_version: i64,
}

impl Product {
    /// Units that can still be sold or reserved.
    #[inline]
    pub fn available_stock(&self) -> i64 {
        self.current_stock - self.reserved_stock
    }

    /// Checks whether `quantity` units can be taken or reserved right now.
    #[inline]
    pub fn can_fulfill(&self, quantity: i64) -> bool {
        self.available_stock() >= quantity
    }

    /// Checks whether stock has fallen to or below the reorder threshold.
    #[inline]
    pub fn is_low_stock(&self) -> bool {
        self.current_stock <= self.min_stock
    }
}

// =============================================================================
// Inventory Movements
// =============================================================================

/// Which way a movement type pushes the physical stock count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockDirection {
    /// Adds units to `current_stock`.
    Increase,
    /// Removes units from `current_stock`.
    Decrease,
    /// Moves units between `reserved_stock` and available, leaving
    /// `current_stock` untouched.
    Reservation,
}

/// The business reason behind one stock change.
///
/// Values keep the warehouse team's Spanish terminology; the ledger and all
/// reporting queries key off these exact strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    /// Direct point-of-sale sale.
    VentaDirecta,
    /// Final sale of a completed layaway.
    VentaApartado,
    /// Stock held for a new layaway.
    ReservaApartado,
    /// Release of a layaway hold.
    CancelarReserva,
    /// Customer refund return.
    Devolucion,
    /// Purchase receipt from a supplier.
    RecepcionCompra,
    /// Manual adjustment up (cycle count found extra units).
    AjusteManualMas,
    /// Manual adjustment down (cycle count found missing units).
    AjusteManualMenos,
    /// Transfer in from another location.
    TransferenciaEntrada,
    /// Transfer out to another location.
    TransferenciaSalida,
    /// Shrinkage: damage, theft, expiry.
    Merma,
    /// Opening balance when a product enters the catalog.
    InventarioInicial,
}

impl MovementType {
    /// Classifies the movement's effect on physical stock.
    pub fn direction(&self) -> StockDirection {
        match self {
            MovementType::Devolucion
            | MovementType::RecepcionCompra
            | MovementType::AjusteManualMas
            | MovementType::TransferenciaEntrada
            | MovementType::InventarioInicial => StockDirection::Increase,

            MovementType::VentaDirecta
            | MovementType::VentaApartado
            | MovementType::AjusteManualMenos
            | MovementType::TransferenciaSalida
            | MovementType::Merma => StockDirection::Decrease,

            MovementType::ReservaApartado | MovementType::CancelarReserva => {
                StockDirection::Reservation
            }
        }
    }

    /// Applies the direction's sign to a raw quantity.
    ///
    /// Increase types store positive quantities, decrease types negative.
    /// Reservation types keep the caller's magnitude positive; the
    /// reservation itself is tracked on `Product::reserved_stock`.
    pub fn signed_quantity(&self, quantity: i64) -> i64 {
        match self.direction() {
            StockDirection::Increase => quantity.abs(),
            StockDirection::Decrease => -quantity.abs(),
            StockDirection::Reservation => quantity.abs(),
        }
    }

    /// True for types that must be preceded by an available-stock check.
    pub fn requires_stock_check(&self) -> bool {
        matches!(
            self,
            MovementType::VentaDirecta | MovementType::ReservaApartado
        )
    }
}

/// One immutable ledger entry.
///
/// ## Invariants
/// - Append-only: never mutated or deleted once written
/// - For increase/decrease types: `new_stock == previous_stock + quantity`
///   (quantity already signed)
/// - `previous_stock` equals the product's `current_stock` at the instant
///   the movement was recorded (enforced by the recording transaction)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct InventoryMovement {
    pub id: String,
    pub product_id: String,
    pub movement_type: MovementType,

    /// Signed quantity: positive for increases, negative for decreases.
    pub quantity: i64,

    pub previous_stock: i64,
    pub new_stock: i64,

    pub reason: Option<String>,

    /// The business transaction that caused this movement (sale id,
    /// refund id, purchase order id).
    pub reference_id: Option<String>,

    pub notes: Option<String>,

    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
}

// =============================================================================
// Sales
// =============================================================================

/// Whether a transaction releases goods immediately or reserves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum SaleType {
    /// Paid in full, goods leave inventory immediately.
    Sale,
    /// Deposit paid, goods reserved until the balance clears.
    Layaway,
}

/// The status of a sale transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Layaway awaiting full payment.
    Pending,
    /// Goods delivered, transaction closed.
    Completed,
    /// Cancelled before completion; reservations released.
    Cancelled,
    /// Fully refunded after completion.
    Refunded,
    /// Layaway whose pickup window lapsed.
    Expired,
}

/// How much of the total has been collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Paid,
    Refunded,
}

/// A sale or layaway transaction aggregate.
///
/// ## Monetary Invariants
/// - `total_cents == subtotal_cents + tax_cents - discount_cents`
/// - `pending_cents == max(total_cents - paid_cents, 0)`
/// - The sum of payment-detail amounts equals `paid_cents` when
///   payment details exist
/// - A layaway cannot reach `Completed` while `pending_cents > 0`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Sale {
    pub id: String,

    /// Date-prefixed sequential business number, e.g. `202502010007`.
    pub sale_number: String,

    pub customer_id: Option<String>,
    pub sale_type: SaleType,
    pub status: SaleStatus,
    pub payment_status: PaymentStatus,

    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,

    /// Minimum deposit a layaway must collect up front.
    pub required_deposit_cents: i64,
    pub deposit_percentage: i64,

    pub paid_cents: i64,
    pub pending_cents: i64,
    pub refunded_cents: i64,

    pub requires_stock_reservation: bool,
    pub stock_reserved_at: Option<DateTime<Utc>>,
    pub stock_released_at: Option<DateTime<Utc>>,

    /// Layaways expire if not picked up within the hold window.
    pub layaway_expires_at: Option<DateTime<Utc>>,

    pub cancellation_reason: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<String>,

    /// Optimistic-concurrency counter, incremented on every update.
    pub row_version: i64,
}

impl Sale {
    #[inline]
    pub fn is_layaway(&self) -> bool {
        self.sale_type == SaleType::Layaway
    }

    /// Returns the outstanding balance as Money.
    #[inline]
    pub fn pending(&self) -> Money {
        Money::from_cents(self.pending_cents)
    }

    /// Derives a payment status from paid vs total amounts.
    pub fn derive_payment_status(total_cents: i64, paid_cents: i64) -> PaymentStatus {
        if paid_cents >= total_cents {
            PaymentStatus::Paid
        } else if paid_cents > 0 {
            PaymentStatus::Partial
        } else {
            PaymentStatus::Pending
        }
    }
}

/// A line item in a sale.
/// Uses snapshot pattern to freeze product data at time of sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub product_id: String,
    /// SKU at time of sale (frozen).
    pub sku_snapshot: Option<String>,
    /// Product name at time of sale (frozen).
    pub name_snapshot: String,
    /// Unit price in cents at time of sale (frozen).
    pub unit_price_cents: i64,
    /// Quantity sold.
    pub quantity: i64,
    /// Line total before tax (unit_price × quantity).
    pub line_total_cents: i64,
    /// Tax rate applied to this line, in basis points.
    pub tax_rate_bps: i64,
    /// Tax for this line item.
    pub tax_cents: i64,
    /// Discount applied to this line.
    pub discount_cents: i64,
    pub created_at: DateTime<Utc>,
}

/// One payment-method row of a (possibly split) tender.
///
/// A sale settled across cash + card produces two rows ordered by
/// `sequence_order`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PaymentDetail {
    pub id: String,
    pub sale_id: String,
    pub payment_method: String,
    pub amount_cents: i64,
    /// External reference (card auth code, transfer folio).
    pub payment_reference: Option<String>,
    pub sequence_order: i64,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Refunds
// =============================================================================

/// Whether the whole sale or only part of it was returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum RefundType {
    Full,
    Partial,
}

/// A refund aggregate against a completed sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Refund {
    pub id: String,
    pub sale_id: String,
    /// Business number, e.g. `DEV202502010003`.
    pub refund_number: String,
    pub refund_type: RefundType,
    pub total_refunded_cents: i64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
}

/// One refunded line of a refund.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct RefundItem {
    pub id: String,
    pub refund_id: String,
    pub sale_item_id: String,
    pub quantity_refunded: i64,
    pub refund_amount_cents: i64,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tax_rate_default_is_iva() {
        let rate = TaxRate::default();
        assert_eq!(rate.bps(), 1600);
        assert!((rate.percentage() - 16.0).abs() < 0.001);
    }

    #[test]
    fn test_movement_direction_classification() {
        assert_eq!(
            MovementType::VentaDirecta.direction(),
            StockDirection::Decrease
        );
        assert_eq!(
            MovementType::Devolucion.direction(),
            StockDirection::Increase
        );
        assert_eq!(MovementType::Merma.direction(), StockDirection::Decrease);
        assert_eq!(
            MovementType::InventarioInicial.direction(),
            StockDirection::Increase
        );
        assert_eq!(
            MovementType::ReservaApartado.direction(),
            StockDirection::Reservation
        );
        assert_eq!(
            MovementType::CancelarReserva.direction(),
            StockDirection::Reservation
        );
    }

    #[test]
    fn test_signed_quantity() {
        assert_eq!(MovementType::VentaDirecta.signed_quantity(3), -3);
        assert_eq!(MovementType::VentaDirecta.signed_quantity(-3), -3);
        assert_eq!(MovementType::Devolucion.signed_quantity(3), 3);
        assert_eq!(MovementType::Devolucion.signed_quantity(-3), 3);
        assert_eq!(MovementType::ReservaApartado.signed_quantity(3), 3);
    }

    #[test]
    fn test_product_available_stock() {
        let product = Product {
            id: "p-1".to_string(),
            sku: "PROT-001".to_string(),
            name: "Protein Bar".to_string(),
            current_stock: 10,
            reserved_stock: 4,
            min_stock: 2,
            max_stock: None,
            unit: "pieza".to_string(),
            location: None,
            is_active: true,
            created_at: Utc::now(),
            created_by: None,
            updated_at: Utc::now(),
            updated_by: None,
            row_version: 0,
        };

        assert_eq!(product.available_stock(), 6);
        assert!(product.can_fulfill(6));
        assert!(!product.can_fulfill(7));
        assert!(!product.is_low_stock());
    }

    #[test]
    fn test_derive_payment_status() {
        assert_eq!(Sale::derive_payment_status(1000, 1000), PaymentStatus::Paid);
        assert_eq!(Sale::derive_payment_status(1000, 1200), PaymentStatus::Paid);
        assert_eq!(
            Sale::derive_payment_status(1000, 500),
            PaymentStatus::Partial
        );
        assert_eq!(Sale::derive_payment_status(1000, 0), PaymentStatus::Pending);
    }

    #[test]
    fn test_appended_notes_preserves_existing() {
        let m = Membership {
            id: "m-1".to_string(),
            customer_id: "c-1".to_string(),
            plan_id: "pl-1".to_string(),
            status: MembershipStatus::Active,
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            end_date: None,
            freeze_date: None,
            unfreeze_date: None,
            total_frozen_days: 0,
            amount_paid_cents: 0,
            subtotal_cents: 0,
            inscription_cents: 0,
            discount_cents: 0,
            commission_rate_bps: 0,
            commission_cents: 0,
            payment_method: "cash".to_string(),
            notes: None,
            created_at: Utc::now(),
            created_by: None,
            updated_at: Utc::now(),
            updated_by: None,
            row_version: 0,
        };

        assert_eq!(m.appended_notes("first line"), "first line");

        let mut with_notes = m.clone();
        with_notes.notes = Some("first line".to_string());
        assert_eq!(
            with_notes.appended_notes("second line"),
            "first line\nsecond line"
        );
    }
}
