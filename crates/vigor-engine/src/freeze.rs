//! # Membership Freeze Engine
//!
//! Applies freeze/unfreeze plans to persisted memberships.
//!
//! ## Division Of Labor
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  vigor-core::freeze      decides WHAT changes (pure, tested in core)   │
//! │  FreezeEngine (here)     reads the row, applies the plan, version-     │
//! │                          guarded, audit-stamped, notes appended        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A precondition failure or version conflict leaves the row untouched.
//! On success the engine re-reads and returns the fresh row rather than
//! trusting its in-memory copy.

use tracing::{debug, info};

use crate::error::EngineResult;
use vigor_core::validation::validate_freeze_days;
use vigor_core::{
    freeze as freeze_plan, BusinessCalendar, CoreError, FreezeMode, Membership,
};
use vigor_db::{Auditor, Database, DbError, FreezeStateUpdate};

/// The membership freeze/unfreeze engine.
#[derive(Debug, Clone)]
pub struct FreezeEngine {
    db: Database,
    calendar: BusinessCalendar,
    auditor: Auditor,
}

impl FreezeEngine {
    /// Creates a freeze engine writing as the given auditor.
    pub fn new(db: Database, calendar: BusinessCalendar, auditor: Auditor) -> Self {
        FreezeEngine {
            db,
            calendar,
            auditor,
        }
    }

    /// The calendar this engine resolves "today" against.
    pub fn calendar(&self) -> &BusinessCalendar {
        &self.calendar
    }

    /// Freezes an active membership.
    ///
    /// ## Variants
    /// - `Manual` with `freeze_days`: expiration extended immediately
    /// - `Auto`: credit deferred until reactivation
    ///
    /// ## Returns
    /// The membership as re-read after the update.
    pub async fn freeze(
        &self,
        membership_id: &str,
        mode: FreezeMode,
        freeze_days: Option<i64>,
        reason: Option<&str>,
    ) -> EngineResult<Membership> {
        if let Some(days) = freeze_days {
            validate_freeze_days(days).map_err(CoreError::from)?;
        }

        let repo = self.db.memberships();
        let membership = repo
            .get_by_id(membership_id)
            .await?
            .ok_or_else(|| DbError::not_found("Membership", membership_id))?;

        let today = self.calendar.today();
        let plan = freeze_plan::plan_freeze(
            &membership,
            mode,
            freeze_days,
            reason,
            &self.calendar,
            today,
        )?;

        debug!(
            membership_id = %membership_id,
            mode = ?mode,
            days_credited = plan.days_credited,
            "Applying freeze"
        );

        let update = FreezeStateUpdate {
            status: plan.status,
            freeze_date: Some(plan.freeze_date),
            unfreeze_date: membership.unfreeze_date,
            end_date: plan.end_date,
            total_frozen_days: plan.total_frozen_days,
            notes: Some(membership.appended_notes(&plan.note_line)),
        };

        repo.apply_freeze_state(
            membership_id,
            membership.row_version,
            &update,
            &self.auditor.stamp(),
        )
        .await?;

        info!(
            membership_id = %membership_id,
            mode = ?mode,
            days_credited = plan.days_credited,
            new_end_date = ?plan.end_date,
            "Membership frozen"
        );

        self.reload(membership_id).await
    }

    /// Reactivates a frozen membership.
    ///
    /// ## Variants
    /// - `Auto`: credits `days_between(freeze_date, today)` onto the
    ///   expiration date and the accumulator
    /// - `Manual`: no credit applied
    ///
    /// ## Returns
    /// The membership as re-read after the update.
    pub async fn unfreeze(
        &self,
        membership_id: &str,
        mode: FreezeMode,
        reason: Option<&str>,
    ) -> EngineResult<Membership> {
        let repo = self.db.memberships();
        let membership = repo
            .get_by_id(membership_id)
            .await?
            .ok_or_else(|| DbError::not_found("Membership", membership_id))?;

        let today = self.calendar.today();
        let plan = freeze_plan::plan_unfreeze(&membership, mode, reason, &self.calendar, today)?;

        debug!(
            membership_id = %membership_id,
            mode = ?mode,
            days_credited = plan.days_credited,
            "Applying unfreeze"
        );

        let update = FreezeStateUpdate {
            status: plan.status,
            // Reactivation always clears the freeze marker
            freeze_date: None,
            unfreeze_date: Some(plan.unfreeze_date),
            end_date: plan.end_date,
            total_frozen_days: plan.total_frozen_days,
            notes: Some(membership.appended_notes(&plan.note_line)),
        };

        repo.apply_freeze_state(
            membership_id,
            membership.row_version,
            &update,
            &self.auditor.stamp(),
        )
        .await?;

        info!(
            membership_id = %membership_id,
            mode = ?mode,
            days_credited = plan.days_credited,
            new_end_date = ?plan.end_date,
            "Membership reactivated"
        );

        self.reload(membership_id).await
    }

    async fn reload(&self, membership_id: &str) -> EngineResult<Membership> {
        self.db
            .memberships()
            .get_by_id(membership_id)
            .await?
            .ok_or_else(|| DbError::not_found("Membership", membership_id).into())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use vigor_core::MembershipStatus;
    use vigor_db::DbConfig;

    async fn test_engine() -> (Database, FreezeEngine) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let engine = FreezeEngine::new(
            db.clone(),
            BusinessCalendar::default(),
            Auditor::new("tester"),
        );
        (db, engine)
    }

    async fn seed_membership(
        db: &Database,
        id: &str,
        status: MembershipStatus,
        end_date: Option<NaiveDate>,
        freeze_date: Option<NaiveDate>,
    ) {
        let now = Utc::now();
        db.memberships()
            .insert(&Membership {
                id: id.to_string(),
                customer_id: "c-1".to_string(),
                plan_id: "pl-1".to_string(),
                status,
                start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                end_date,
                freeze_date,
                unfreeze_date: None,
                total_frozen_days: 0,
                amount_paid_cents: 50000,
                subtotal_cents: 50000,
                inscription_cents: 0,
                discount_cents: 0,
                commission_rate_bps: 0,
                commission_cents: 0,
                payment_method: "cash".to_string(),
                notes: Some("Created at signup.".to_string()),
                created_at: now,
                created_by: None,
                updated_at: now,
                updated_by: None,
                row_version: 0,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_manual_freeze_shifts_end_date_and_appends_note() {
        let (db, engine) = test_engine().await;
        let today = engine.calendar().today();
        let end = engine.calendar().add_days(today, 30);
        seed_membership(&db, "m-1", MembershipStatus::Active, Some(end), None).await;

        let frozen = engine
            .freeze("m-1", FreezeMode::Manual, Some(10), Some("vacation"))
            .await
            .unwrap();

        assert_eq!(frozen.status, MembershipStatus::Frozen);
        assert_eq!(frozen.freeze_date, Some(today));
        assert_eq!(frozen.end_date, Some(engine.calendar().add_days(end, 10)));
        assert_eq!(frozen.total_frozen_days, 10);
        assert_eq!(frozen.row_version, 1);
        assert_eq!(frozen.updated_by.as_deref(), Some("tester"));

        let notes = frozen.notes.unwrap();
        assert!(notes.starts_with("Created at signup.\n"));
        assert!(notes.contains("Frozen manually for 10 days"));
        assert!(notes.contains("Reason: vacation"));
    }

    #[tokio::test]
    async fn test_automatic_cycle_credits_elapsed_days() {
        let (db, engine) = test_engine().await;
        let today = engine.calendar().today();
        let end = engine.calendar().add_days(today, 30);
        seed_membership(&db, "m-1", MembershipStatus::Active, Some(end), None).await;

        let frozen = engine
            .freeze("m-1", FreezeMode::Auto, None, None)
            .await
            .unwrap();
        assert_eq!(frozen.end_date, Some(end)); // untouched on auto freeze
        assert_eq!(frozen.total_frozen_days, 0);

        // Same-day reactivation credits zero days
        let active = engine
            .unfreeze("m-1", FreezeMode::Auto, None)
            .await
            .unwrap();
        assert_eq!(active.status, MembershipStatus::Active);
        assert_eq!(active.freeze_date, None);
        assert_eq!(active.unfreeze_date, Some(today));
        assert_eq!(active.end_date, Some(end));
        assert_eq!(active.total_frozen_days, 0);
    }

    #[tokio::test]
    async fn test_automatic_unfreeze_after_ten_frozen_days() {
        let (db, engine) = test_engine().await;
        let today = engine.calendar().today();
        let end = engine.calendar().add_days(today, 30);
        // Frozen ten days ago
        let froze_on = today - chrono::Duration::days(10);
        seed_membership(
            &db,
            "m-1",
            MembershipStatus::Frozen,
            Some(end),
            Some(froze_on),
        )
        .await;

        let active = engine
            .unfreeze("m-1", FreezeMode::Auto, None)
            .await
            .unwrap();

        assert_eq!(active.end_date, Some(engine.calendar().add_days(end, 10)));
        assert_eq!(active.total_frozen_days, 10);
    }

    #[tokio::test]
    async fn test_manual_unfreeze_credits_nothing() {
        let (db, engine) = test_engine().await;
        let today = engine.calendar().today();
        let end = engine.calendar().add_days(today, 30);
        let froze_on = today - chrono::Duration::days(10);
        seed_membership(
            &db,
            "m-1",
            MembershipStatus::Frozen,
            Some(end),
            Some(froze_on),
        )
        .await;

        let active = engine
            .unfreeze("m-1", FreezeMode::Manual, Some("member request"))
            .await
            .unwrap();

        assert_eq!(active.end_date, Some(end));
        assert_eq!(active.total_frozen_days, 0);
        assert_eq!(active.freeze_date, None);
        assert!(active.notes.unwrap().contains("Reactivated manually"));
    }

    #[tokio::test]
    async fn test_precondition_failures_leave_row_unchanged() {
        let (db, engine) = test_engine().await;
        seed_membership(&db, "m-1", MembershipStatus::Cancelled, None, None).await;

        let err = engine
            .freeze("m-1", FreezeMode::Auto, None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::EngineError::Core(CoreError::MembershipNotActive { .. })
        ));

        let row = db.memberships().get_by_id("m-1").await.unwrap().unwrap();
        assert_eq!(row.status, MembershipStatus::Cancelled);
        assert_eq!(row.row_version, 0);
        assert_eq!(row.notes.as_deref(), Some("Created at signup."));

        let err = engine
            .unfreeze("m-1", FreezeMode::Auto, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::EngineError::Core(CoreError::MembershipNotFrozen { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_freeze_days_rejected_before_read() {
        let (db, engine) = test_engine().await;
        seed_membership(&db, "m-1", MembershipStatus::Active, None, None).await;

        let err = engine
            .freeze("m-1", FreezeMode::Manual, Some(0), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::EngineError::Core(CoreError::Validation(_))
        ));

        let err = engine
            .freeze("m-1", FreezeMode::Manual, Some(400), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::EngineError::Core(CoreError::Validation(_))
        ));
    }
}
