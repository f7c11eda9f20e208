//! # vigor-engine: Business Engines for Vigor Gym
//!
//! The operational layer: composes pure plans from vigor-core with
//! repositories from vigor-db.
//!
//! ## Engines
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          vigor-engine                                   │
//! │                                                                         │
//! │  ┌──────────────────┐      ┌──────────────────┐                        │
//! │  │ InventoryLedger  │      │   FreezeEngine   │                        │
//! │  │ ──────────────── │      │ ──────────────── │                        │
//! │  │ record_movement  │      │ freeze/unfreeze  │                        │
//! │  │ composite ops    │      │ plan + apply     │                        │
//! │  └────────┬─────────┘      └────────┬─────────┘                        │
//! │           │                         │                                   │
//! │  ┌────────┴─────────┐      ┌────────┴─────────┐                        │
//! │  │   SalesService   │      │ BulkOrchestrator │                        │
//! │  │ ──────────────── │      │ ──────────────── │                        │
//! │  │ sales, layaways, │      │ sequential runs, │                        │
//! │  │ refunds, saga    │      │ live progress    │                        │
//! │  └──────────────────┘      └──────────────────┘                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wiring
//! ```rust,ignore
//! use vigor_core::BusinessCalendar;
//! use vigor_db::{Auditor, Database, DbConfig};
//! use vigor_engine::{BulkOrchestrator, FreezeEngine, InventoryLedger, SalesService};
//!
//! let db = Database::new(DbConfig::new("vigor.db")).await?;
//! let calendar = BusinessCalendar::default();
//! let auditor = Auditor::new(operator_id);
//!
//! let ledger = InventoryLedger::new(db.clone(), auditor.clone());
//! let freeze = FreezeEngine::new(db.clone(), calendar, auditor.clone());
//! let bulk = BulkOrchestrator::new(db.clone(), freeze.clone());
//! let sales = SalesService::new(db.clone(), ledger.clone(), calendar, auditor);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod bulk;
pub mod error;
pub mod freeze;
pub mod ledger;
pub mod sales;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use bulk::{
    BulkAction, BulkItemError, BulkOrchestrator, BulkOutcome, BulkPreviewItem, BulkProgress,
    BulkRequest, BulkRun,
};
pub use error::{EngineError, EngineResult};
pub use freeze::FreezeEngine;
pub use ledger::{InventoryLedger, StockOperation};
pub use sales::{
    CreateSaleRequest, PaymentRequest, RefundItemRequest, RefundRequest, SaleItemRequest,
    SalesService,
};
