//! # Membership Repository
//!
//! Database operations for memberships.
//!
//! ## Freeze Updates
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │              Version-Guarded Freeze Update                              │
//! │                                                                         │
//! │  Engine reads row (row_version = 7)                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Engine computes FreezeStateUpdate from the snapshot                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  UPDATE memberships SET ..., row_version = row_version + 1             │
//! │  WHERE id = ? AND row_version = 7                                      │
//! │       │                                                                 │
//! │       ├── 1 row  → committed, exactly-once                             │
//! │       └── 0 rows → someone else wrote version 8 first:                 │
//! │                    VersionConflict, row untouched, caller re-reads     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! Without the guard, two concurrent unfreezes could both read the same
//! freeze_date and double-credit the frozen days.

use chrono::NaiveDate;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::audit::AuditStamp;
use crate::error::{DbError, DbResult};
use vigor_core::{Membership, MembershipStatus};

/// All columns of the memberships table, in struct order.
const MEMBERSHIP_COLUMNS: &str = "\
    id, customer_id, plan_id, status, start_date, end_date, \
    freeze_date, unfreeze_date, total_frozen_days, \
    amount_paid_cents, subtotal_cents, inscription_cents, discount_cents, \
    commission_rate_bps, commission_cents, payment_method, notes, \
    created_at, created_by, updated_at, updated_by, row_version";

/// The full field-set a freeze/unfreeze writes in one statement.
///
/// Built by the freeze engine from a core plan; the repository persists it
/// atomically or not at all.
#[derive(Debug, Clone)]
pub struct FreezeStateUpdate {
    pub status: MembershipStatus,
    pub freeze_date: Option<NaiveDate>,
    pub unfreeze_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub total_frozen_days: i64,
    /// Complete replacement notes text (existing notes + appended line).
    pub notes: Option<String>,
}

/// Repository for membership database operations.
#[derive(Debug, Clone)]
pub struct MembershipRepository {
    pool: SqlitePool,
}

impl MembershipRepository {
    /// Creates a new MembershipRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MembershipRepository { pool }
    }

    /// Gets a membership by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Membership>> {
        let query = format!("SELECT {} FROM memberships WHERE id = ?1", MEMBERSHIP_COLUMNS);

        let membership = sqlx::query_as::<_, Membership>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(membership)
    }

    /// Lists memberships in a given status, newest first.
    pub async fn list_by_status(
        &self,
        status: MembershipStatus,
        limit: u32,
    ) -> DbResult<Vec<Membership>> {
        let query = format!(
            "SELECT {} FROM memberships WHERE status = ?1 ORDER BY created_at DESC LIMIT ?2",
            MEMBERSHIP_COLUMNS
        );

        let memberships = sqlx::query_as::<_, Membership>(&query)
            .bind(status)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(memberships)
    }

    /// Lists all memberships for a customer, newest first.
    pub async fn list_by_customer(&self, customer_id: &str) -> DbResult<Vec<Membership>> {
        let query = format!(
            "SELECT {} FROM memberships WHERE customer_id = ?1 ORDER BY created_at DESC",
            MEMBERSHIP_COLUMNS
        );

        let memberships = sqlx::query_as::<_, Membership>(&query)
            .bind(customer_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(memberships)
    }

    /// Inserts a new membership.
    pub async fn insert(&self, membership: &Membership) -> DbResult<()> {
        debug!(id = %membership.id, customer = %membership.customer_id, "Inserting membership");

        sqlx::query(
            r#"
            INSERT INTO memberships (
                id, customer_id, plan_id, status, start_date, end_date,
                freeze_date, unfreeze_date, total_frozen_days,
                amount_paid_cents, subtotal_cents, inscription_cents, discount_cents,
                commission_rate_bps, commission_cents, payment_method, notes,
                created_at, created_by, updated_at, updated_by, row_version
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9,
                ?10, ?11, ?12, ?13,
                ?14, ?15, ?16, ?17,
                ?18, ?19, ?20, ?21, ?22
            )
            "#,
        )
        .bind(&membership.id)
        .bind(&membership.customer_id)
        .bind(&membership.plan_id)
        .bind(membership.status)
        .bind(membership.start_date)
        .bind(membership.end_date)
        .bind(membership.freeze_date)
        .bind(membership.unfreeze_date)
        .bind(membership.total_frozen_days)
        .bind(membership.amount_paid_cents)
        .bind(membership.subtotal_cents)
        .bind(membership.inscription_cents)
        .bind(membership.discount_cents)
        .bind(membership.commission_rate_bps)
        .bind(membership.commission_cents)
        .bind(&membership.payment_method)
        .bind(&membership.notes)
        .bind(membership.created_at)
        .bind(&membership.created_by)
        .bind(membership.updated_at)
        .bind(&membership.updated_by)
        .bind(membership.row_version)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Applies a freeze/unfreeze state change, guarded on `row_version`.
    ///
    /// ## Returns
    /// * `Ok(())` - exactly one row written, version incremented
    /// * `Err(DbError::VersionConflict)` - the row changed since it was read
    /// * `Err(DbError::NotFound)` - no such membership
    pub async fn apply_freeze_state(
        &self,
        id: &str,
        expected_version: i64,
        update: &FreezeStateUpdate,
        stamp: &AuditStamp,
    ) -> DbResult<()> {
        debug!(
            id = %id,
            status = ?update.status,
            expected_version = expected_version,
            "Applying freeze state"
        );

        let result = sqlx::query(
            r#"
            UPDATE memberships SET
                status = ?3,
                freeze_date = ?4,
                unfreeze_date = ?5,
                end_date = ?6,
                total_frozen_days = ?7,
                notes = ?8,
                updated_at = ?9,
                updated_by = ?10,
                row_version = row_version + 1
            WHERE id = ?1 AND row_version = ?2
            "#,
        )
        .bind(id)
        .bind(expected_version)
        .bind(update.status)
        .bind(update.freeze_date)
        .bind(update.unfreeze_date)
        .bind(update.end_date)
        .bind(update.total_frozen_days)
        .bind(&update.notes)
        .bind(stamp.at)
        .bind(&stamp.by)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Distinguish a stale version from a missing row
            return match self.get_by_id(id).await? {
                Some(_) => Err(DbError::version_conflict("Membership", id)),
                None => Err(DbError::not_found("Membership", id)),
            };
        }

        Ok(())
    }

    /// Counts memberships per status (for diagnostics).
    pub async fn count_by_status(&self, status: MembershipStatus) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM memberships WHERE status = ?1")
            .bind(status)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Helper to generate a new membership ID.
pub fn generate_membership_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::Auditor;
    use crate::pool::{Database, DbConfig};
    use chrono::Utc;

    fn sample_membership(id: &str, status: MembershipStatus) -> Membership {
        let now = Utc::now();
        Membership {
            id: id.to_string(),
            customer_id: "c-1".to_string(),
            plan_id: "pl-1".to_string(),
            status,
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            end_date: Some(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()),
            freeze_date: None,
            unfreeze_date: None,
            total_frozen_days: 0,
            amount_paid_cents: 50000,
            subtotal_cents: 50000,
            inscription_cents: 0,
            discount_cents: 0,
            commission_rate_bps: 0,
            commission_cents: 0,
            payment_method: "cash".to_string(),
            notes: None,
            created_at: now,
            created_by: Some("tester".to_string()),
            updated_at: now,
            updated_by: Some("tester".to_string()),
            row_version: 0,
        }
    }

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_get_roundtrip() {
        let db = test_db().await;
        let repo = db.memberships();

        let m = sample_membership("m-1", MembershipStatus::Active);
        repo.insert(&m).await.unwrap();

        let loaded = repo.get_by_id("m-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, MembershipStatus::Active);
        assert_eq!(loaded.end_date, m.end_date);
        assert_eq!(loaded.row_version, 0);

        assert!(repo.get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apply_freeze_state_increments_version() {
        let db = test_db().await;
        let repo = db.memberships();

        repo.insert(&sample_membership("m-1", MembershipStatus::Active))
            .await
            .unwrap();

        let update = FreezeStateUpdate {
            status: MembershipStatus::Frozen,
            freeze_date: Some(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()),
            unfreeze_date: None,
            end_date: Some(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()),
            total_frozen_days: 0,
            notes: Some("Frozen automatically on 01 Feb 2025.".to_string()),
        };
        let stamp = Auditor::new("tester").stamp();

        repo.apply_freeze_state("m-1", 0, &update, &stamp)
            .await
            .unwrap();

        let loaded = repo.get_by_id("m-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, MembershipStatus::Frozen);
        assert_eq!(loaded.row_version, 1);
        assert_eq!(
            loaded.notes.as_deref(),
            Some("Frozen automatically on 01 Feb 2025.")
        );
    }

    #[tokio::test]
    async fn test_stale_version_conflicts_and_leaves_row_unchanged() {
        let db = test_db().await;
        let repo = db.memberships();

        repo.insert(&sample_membership("m-1", MembershipStatus::Active))
            .await
            .unwrap();

        let update = FreezeStateUpdate {
            status: MembershipStatus::Frozen,
            freeze_date: Some(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()),
            unfreeze_date: None,
            end_date: None,
            total_frozen_days: 0,
            notes: None,
        };
        let stamp = Auditor::system().stamp();

        // Stale version: the row is at 0, we claim 5
        let err = repo
            .apply_freeze_state("m-1", 5, &update, &stamp)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::VersionConflict { .. }));

        let loaded = repo.get_by_id("m-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, MembershipStatus::Active);
        assert_eq!(loaded.row_version, 0);

        // Missing row reports NotFound, not a conflict
        let err = repo
            .apply_freeze_state("ghost", 0, &update, &stamp)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_by_status() {
        let db = test_db().await;
        let repo = db.memberships();

        repo.insert(&sample_membership("m-1", MembershipStatus::Active))
            .await
            .unwrap();
        repo.insert(&sample_membership("m-2", MembershipStatus::Frozen))
            .await
            .unwrap();
        repo.insert(&sample_membership("m-3", MembershipStatus::Active))
            .await
            .unwrap();

        let active = repo.list_by_status(MembershipStatus::Active, 10).await.unwrap();
        assert_eq!(active.len(), 2);

        assert_eq!(
            repo.count_by_status(MembershipStatus::Frozen).await.unwrap(),
            1
        );
    }
}
