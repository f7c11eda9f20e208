//! # vigor-db: Database Layer for Vigor Gym
//!
//! This crate provides database access for Vigor Gym's engines.
//! It uses SQLite for local storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Vigor Gym Data Flow                              │
//! │                                                                         │
//! │  Engine operation (freeze, record_movement, create_direct_sale)       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     vigor-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │ membership,   │    │  (embedded)  │  │   │
//! │  │   │               │    │ product,      │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ inventory,    │    │ 001_init.sql │  │   │
//! │  │   │ WAL mode      │    │ sale          │    │              │  │   │
//! │  │   └───────────────┘    └───────┬───────┘    └──────────────┘  │   │
//! │  │                                │                               │   │
//! │  │                        ┌───────▼───────┐                       │   │
//! │  │                        │  AuditStamp   │  every write stamped  │   │
//! │  │                        └───────────────┘                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database file (WAL)                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`audit`] - Actor/timestamp stamping for writes
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vigor_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/vigor.db")).await?;
//! let frozen = db.memberships().list_by_status(MembershipStatus::Frozen, 50).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod audit;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use audit::{AuditStamp, Auditor};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::inventory::InventoryMovementRepository;
pub use repository::membership::{FreezeStateUpdate, MembershipRepository};
pub use repository::product::ProductRepository;
pub use repository::sale::SaleRepository;
