//! # Audit Stamping
//!
//! Actor/timestamp stamping for every database write.
//!
//! ## Table Policy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Audit Field Policy                                 │
//! │                                                                         │
//! │  Mutable tables (memberships, products, sales)                         │
//! │  ├── INSERT stamps created_by/created_at AND updated_by/updated_at     │
//! │  └── UPDATE stamps updated_by/updated_at only                          │
//! │                                                                         │
//! │  Append-only tables (inventory_movements, sale_items,                  │
//! │  sale_payment_details, refunds, refund_items)                          │
//! │  └── INSERT stamps created_by/created_at; rows are never updated       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Repositories take an [`AuditStamp`] on every write and bind the right
//! column subset for their table; nothing writes without one.

use chrono::{DateTime, Utc};

/// The actor performing a batch of writes.
///
/// One `Auditor` is created per logical caller (an operator session, a
/// scheduled job) and handed to the engines, which mint a fresh stamp per
/// write.
#[derive(Debug, Clone)]
pub struct Auditor {
    actor_id: Option<String>,
}

impl Auditor {
    /// An auditor for a known operator.
    pub fn new(actor_id: impl Into<String>) -> Self {
        Auditor {
            actor_id: Some(actor_id.into()),
        }
    }

    /// An auditor for system-initiated writes (scheduled jobs, migrations).
    pub fn system() -> Self {
        Auditor { actor_id: None }
    }

    /// Mints a stamp with the current time.
    pub fn stamp(&self) -> AuditStamp {
        AuditStamp {
            by: self.actor_id.clone(),
            at: Utc::now(),
        }
    }
}

/// One actor + timestamp pair, bound into audit columns by repositories.
#[derive(Debug, Clone)]
pub struct AuditStamp {
    /// Actor id, `None` for system writes.
    pub by: Option<String>,
    pub at: DateTime<Utc>,
}
