//! # Bulk Operation Orchestrator
//!
//! Drives the freeze engine over a set of selected memberships.
//!
//! ## One Run, Start To Finish
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Bulk Run Lifecycle                               │
//! │                                                                         │
//! │  prepare(request)                                                      │
//! │    ├── validate the request                                            │
//! │    ├── load selected memberships                                       │
//! │    ├── filter to eligible ones (status matches the action)             │
//! │    │     ineligible ids dropped SILENTLY - they never enter the run    │
//! │    └── zero eligible? reject before starting                           │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  run.preview()      dry run: projected end dates, no mutation          │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  run.execute()      STRICTLY SEQUENTIAL, one membership at a time      │
//! │    ├── item ok    → success_count += 1                                 │
//! │    ├── item fails → record {id, message}, KEEP GOING                   │
//! │    ├── after each → publish progress on the watch channel              │
//! │    └── done       → re-read every membership from the store            │
//! │                                                                         │
//! │  No cancellation once started; observers can stop watching but the    │
//! │  run completes.                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sequential execution is deliberate: the progress counter stays
//! accurate and the store sees at most one membership mutation at a time
//! from this run. Each item's outcome is independent: one failure rolls
//! nothing back and blocks nothing.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::EngineResult;
use crate::freeze::FreezeEngine;
use vigor_core::{freeze as freeze_plan, CoreError, FreezeMode, Membership, MembershipStatus};
use vigor_db::Database;

// =============================================================================
// Request / Result Types
// =============================================================================

/// Which direction a bulk run pushes its memberships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    Freeze,
    Unfreeze,
}

impl BulkAction {
    fn label(&self) -> &'static str {
        match self {
            BulkAction::Freeze => "freeze",
            BulkAction::Unfreeze => "unfreeze",
        }
    }

    /// The status a membership must currently have to enter the run.
    fn eligible_status(&self) -> MembershipStatus {
        match self {
            BulkAction::Freeze => MembershipStatus::Active,
            BulkAction::Unfreeze => MembershipStatus::Frozen,
        }
    }
}

/// One batch freeze/unfreeze request. Ephemeral: lives for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkRequest {
    pub action: BulkAction,
    pub mode: FreezeMode,
    pub membership_ids: Vec<String>,
    /// Manual freeze only: days credited immediately per membership.
    pub freeze_days: Option<i64>,
    pub reason: Option<String>,
}

/// Dry-run line for one eligible membership.
#[derive(Debug, Clone, Serialize)]
pub struct BulkPreviewItem {
    pub membership_id: String,
    pub customer_id: String,
    pub plan_id: String,
    pub current_status: MembershipStatus,
    pub current_end_date: Option<chrono::NaiveDate>,
    pub new_end_date: Option<chrono::NaiveDate>,
    pub days_to_add: i64,
    pub action_description: String,
}

/// One failed item of a bulk run.
#[derive(Debug, Clone, Serialize)]
pub struct BulkItemError {
    pub membership_id: String,
    pub message: String,
}

/// Live progress snapshot, published after every item.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkProgress {
    pub completed: usize,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Final result of a bulk run.
#[derive(Debug)]
pub struct BulkOutcome {
    pub success_count: usize,
    pub failed_count: usize,
    pub errors: Vec<BulkItemError>,
    /// The affected memberships, re-read from the store after the run.
    pub memberships: Vec<Membership>,
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Builds bulk runs over the freeze engine.
#[derive(Debug, Clone)]
pub struct BulkOrchestrator {
    db: Database,
    engine: FreezeEngine,
    /// Optional pause between items, to keep progress observers
    /// responsive on large batches. Not a correctness requirement.
    item_delay: Option<Duration>,
}

impl BulkOrchestrator {
    /// Creates an orchestrator over an existing freeze engine.
    pub fn new(db: Database, engine: FreezeEngine) -> Self {
        BulkOrchestrator {
            db,
            engine,
            item_delay: None,
        }
    }

    /// Inserts a pause between items.
    pub fn with_item_delay(mut self, delay: Duration) -> Self {
        self.item_delay = Some(delay);
        self
    }

    /// Validates a request, loads the selection, filters to eligible
    /// memberships, and returns a ready-to-run batch.
    ///
    /// ## Eligibility
    /// Only status is filtered on (`active` for freeze, `frozen` for
    /// unfreeze). Ineligible and unknown ids are dropped silently; they
    /// are excluded before the run starts, not reported as failures.
    ///
    /// ## Errors
    /// - Empty selection or invalid freeze_days: validation error
    /// - Zero eligible memberships after filtering: the whole request is
    ///   rejected before anything runs
    pub async fn prepare(&self, request: BulkRequest) -> EngineResult<BulkRun> {
        if request.membership_ids.is_empty() {
            return Err(CoreError::Validation(vigor_core::ValidationError::Empty {
                field: "membership_ids".to_string(),
            })
            .into());
        }
        if let Some(days) = request.freeze_days {
            vigor_core::validation::validate_freeze_days(days).map_err(CoreError::from)?;
        }

        let repo = self.db.memberships();
        let wanted_status = request.action.eligible_status();
        let mut eligible = Vec::new();

        for id in &request.membership_ids {
            match repo.get_by_id(id).await? {
                Some(m) if m.status == wanted_status => eligible.push(m),
                Some(m) => {
                    debug!(
                        membership_id = %id,
                        status = ?m.status,
                        "Dropping ineligible membership from batch"
                    );
                }
                None => {
                    debug!(membership_id = %id, "Dropping unknown membership from batch");
                }
            }
        }

        if eligible.is_empty() {
            return Err(CoreError::NoEligibleMemberships {
                action: request.action.label().to_string(),
                reason: format!(
                    "none of the {} selected memberships are {:?}",
                    request.membership_ids.len(),
                    wanted_status
                ),
            }
            .into());
        }

        info!(
            action = request.action.label(),
            mode = ?request.mode,
            selected = request.membership_ids.len(),
            eligible = eligible.len(),
            "Bulk run prepared"
        );

        let total = eligible.len();
        let (progress_tx, _) = watch::channel(BulkProgress {
            total,
            ..BulkProgress::default()
        });

        Ok(BulkRun {
            request,
            eligible,
            db: self.db.clone(),
            engine: self.engine.clone(),
            item_delay: self.item_delay,
            progress_tx,
        })
    }
}

// =============================================================================
// A prepared run
// =============================================================================

/// One prepared bulk run: eligible snapshots plus the progress channel.
///
/// All mutable run state lives here, owned by the run; two concurrent
/// runs share nothing.
#[derive(Debug)]
pub struct BulkRun {
    request: BulkRequest,
    eligible: Vec<Membership>,
    db: Database,
    engine: FreezeEngine,
    item_delay: Option<Duration>,
    progress_tx: watch::Sender<BulkProgress>,
}

impl BulkRun {
    /// Number of memberships that made it through the eligibility filter.
    pub fn eligible_count(&self) -> usize {
        self.eligible.len()
    }

    /// A receiver for live progress snapshots during `execute`.
    pub fn subscribe(&self) -> watch::Receiver<BulkProgress> {
        self.progress_tx.subscribe()
    }

    /// Dry run: what each eligible membership's end_date would become,
    /// with a human description per item. Writes nothing.
    pub fn preview(&self) -> Vec<BulkPreviewItem> {
        let calendar = self.engine.calendar();
        let today = calendar.today();

        self.eligible
            .iter()
            .map(|m| {
                let (new_end_date, days_to_add, action_description) =
                    match (self.request.action, self.request.mode) {
                        (BulkAction::Freeze, FreezeMode::Manual) => {
                            match (self.request.freeze_days, m.end_date) {
                                (Some(days), Some(end)) => (
                                    Some(calendar.add_days(end, days as u64)),
                                    days,
                                    format!(
                                        "Will be frozen manually, adding {} days immediately",
                                        days
                                    ),
                                ),
                                _ => (
                                    m.end_date,
                                    0,
                                    "Will be frozen manually (expiration unchanged)".to_string(),
                                ),
                            }
                        }
                        (BulkAction::Freeze, FreezeMode::Auto) => (
                            m.end_date,
                            0,
                            "Will be frozen automatically (days credited on reactivation)"
                                .to_string(),
                        ),
                        (BulkAction::Unfreeze, FreezeMode::Auto) => {
                            let days = freeze_plan::current_frozen_days(m, calendar, today);
                            match m.end_date {
                                Some(_) => (
                                    freeze_plan::projected_end_date(m, calendar, today),
                                    days,
                                    format!(
                                        "Will be reactivated, crediting {} frozen days",
                                        days
                                    ),
                                ),
                                None => (
                                    None,
                                    days,
                                    "Will be reactivated (no expiration date to extend)"
                                        .to_string(),
                                ),
                            }
                        }
                        (BulkAction::Unfreeze, FreezeMode::Manual) => (
                            m.end_date,
                            0,
                            "Will be reactivated manually (no days credited)".to_string(),
                        ),
                    };

                BulkPreviewItem {
                    membership_id: m.id.clone(),
                    customer_id: m.customer_id.clone(),
                    plan_id: m.plan_id.clone(),
                    current_status: m.status,
                    current_end_date: m.end_date,
                    new_end_date,
                    days_to_add,
                    action_description,
                }
            })
            .collect()
    }

    /// Executes the run: strictly sequential, per-item failure isolation.
    ///
    /// Consumes the run; progress receivers obtained via [`subscribe`]
    /// keep receiving until the last item completes.
    ///
    /// [`subscribe`]: BulkRun::subscribe
    pub async fn execute(self) -> EngineResult<BulkOutcome> {
        let total = self.eligible.len();
        let mut succeeded = 0usize;
        let mut errors: Vec<BulkItemError> = Vec::new();

        info!(
            action = self.request.action.label(),
            mode = ?self.request.mode,
            total,
            "Bulk run starting"
        );

        for (index, membership) in self.eligible.iter().enumerate() {
            let reason = self.request.reason.as_deref();

            let result = match self.request.action {
                BulkAction::Freeze => {
                    self.engine
                        .freeze(
                            &membership.id,
                            self.request.mode,
                            self.request.freeze_days,
                            reason,
                        )
                        .await
                }
                BulkAction::Unfreeze => {
                    self.engine
                        .unfreeze(&membership.id, self.request.mode, reason)
                        .await
                }
            };

            match result {
                Ok(_) => succeeded += 1,
                Err(err) => {
                    warn!(
                        membership_id = %membership.id,
                        error = %err,
                        "Bulk item failed, continuing"
                    );
                    errors.push(BulkItemError {
                        membership_id: membership.id.clone(),
                        message: err.to_string(),
                    });
                }
            }

            // Publish after every item so observers can render live progress
            let _ = self.progress_tx.send(BulkProgress {
                completed: index + 1,
                total,
                succeeded,
                failed: errors.len(),
            });

            if let Some(delay) = self.item_delay {
                if index + 1 < total {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        // Don't trust our in-memory mutations: re-read everything touched
        let repo = self.db.memberships();
        let mut memberships = Vec::with_capacity(total);
        for m in &self.eligible {
            if let Some(fresh) = repo.get_by_id(&m.id).await? {
                memberships.push(fresh);
            }
        }

        let outcome = BulkOutcome {
            success_count: succeeded,
            failed_count: errors.len(),
            errors,
            memberships,
        };

        info!(
            succeeded = outcome.success_count,
            failed = outcome.failed_count,
            "Bulk run finished"
        );

        Ok(outcome)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use vigor_core::BusinessCalendar;
    use vigor_db::{Auditor, DbConfig};

    async fn test_setup() -> (Database, FreezeEngine, BulkOrchestrator) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let engine = FreezeEngine::new(
            db.clone(),
            BusinessCalendar::default(),
            Auditor::new("tester"),
        );
        let orchestrator = BulkOrchestrator::new(db.clone(), engine.clone());
        (db, engine, orchestrator)
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
                customer_id: format!("c-{}", id),
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
                notes: None,
                created_at: now,
                created_by: None,
                updated_at: now,
                updated_by: None,
                row_version: 0,
            })
            .await
            .unwrap();
    }

    fn freeze_request(ids: &[&str], mode: FreezeMode, freeze_days: Option<i64>) -> BulkRequest {
        BulkRequest {
            action: BulkAction::Freeze,
            mode,
            membership_ids: ids.iter().map(|s| s.to_string()).collect(),
            freeze_days,
            reason: Some("maintenance closure".to_string()),
        }
    }

    #[tokio::test]
    async fn test_eligibility_filter_drops_silently() {
        let (db, engine, orchestrator) = test_setup().await;
        let today = engine.calendar().today();
        let end = engine.calendar().add_days(today, 30);

        seed_membership(&db, "m-1", MembershipStatus::Active, Some(end), None).await;
        seed_membership(&db, "m-2", MembershipStatus::Frozen, Some(end), Some(today)).await;
        seed_membership(&db, "m-3", MembershipStatus::Active, Some(end), None).await;

        // Selection includes a frozen membership and an unknown id; both
        // are dropped without becoming failures
        let run = orchestrator
            .prepare(freeze_request(
                &["m-1", "m-2", "m-3", "ghost"],
                FreezeMode::Auto,
                None,
            ))
            .await
            .unwrap();

        assert_eq!(run.eligible_count(), 2);

        let outcome = run.execute().await.unwrap();
        assert_eq!(outcome.success_count, 2);
        assert_eq!(outcome.failed_count, 0);
        assert!(outcome.errors.is_empty());
    }

    #[tokio::test]
    async fn test_zero_eligible_rejects_before_starting() {
        let (db, _engine, orchestrator) = test_setup().await;
        seed_membership(&db, "m-1", MembershipStatus::Cancelled, None, None).await;

        let err = orchestrator
            .prepare(freeze_request(&["m-1"], FreezeMode::Auto, None))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::EngineError::Core(CoreError::NoEligibleMemberships { .. })
        ));

        let err = orchestrator
            .prepare(freeze_request(&[], FreezeMode::Auto, None))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::EngineError::Core(CoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_preview_projects_without_mutation() {
        let (db, engine, orchestrator) = test_setup().await;
        let today = engine.calendar().today();
        let end = engine.calendar().add_days(today, 30);
        seed_membership(&db, "m-1", MembershipStatus::Active, Some(end), None).await;

        let run = orchestrator
            .prepare(freeze_request(&["m-1"], FreezeMode::Manual, Some(7)))
            .await
            .unwrap();

        let preview = run.preview();
        assert_eq!(preview.len(), 1);
        assert_eq!(preview[0].days_to_add, 7);
        assert_eq!(
            preview[0].new_end_date,
            Some(engine.calendar().add_days(end, 7))
        );
        assert!(preview[0].action_description.contains("7 days"));

        // Nothing was written by the preview
        let row = db.memberships().get_by_id("m-1").await.unwrap().unwrap();
        assert_eq!(row.status, MembershipStatus::Active);
        assert_eq!(row.end_date, Some(end));
        assert_eq!(row.row_version, 0);
    }

    #[tokio::test]
    async fn test_partial_failure_isolation() {
        // N eligible, K engineered to fail: outcome reports N-K / K and
        // the non-failing memberships end up correctly mutated.
        let (db, engine, orchestrator) = test_setup().await;
        let today = engine.calendar().today();
        let end = engine.calendar().add_days(today, 30);

        seed_membership(&db, "m-1", MembershipStatus::Active, Some(end), None).await;
        seed_membership(&db, "m-2", MembershipStatus::Active, Some(end), None).await;
        seed_membership(&db, "m-3", MembershipStatus::Active, Some(end), None).await;

        let run = orchestrator
            .prepare(freeze_request(&["m-1", "m-2", "m-3"], FreezeMode::Auto, None))
            .await
            .unwrap();

        // Engineer a failure for m-2: freeze it behind the run's back so
        // its precondition no longer holds at execution time
        engine
            .freeze("m-2", FreezeMode::Auto, None, None)
            .await
            .unwrap();

        let outcome = run.execute().await.unwrap();

        assert_eq!(outcome.success_count, 2);
        assert_eq!(outcome.failed_count, 1);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].membership_id, "m-2");
        assert!(outcome.errors[0].message.contains("only active memberships"));

        // The survivors were mutated despite the failure in the middle
        for id in ["m-1", "m-3"] {
            let row = db.memberships().get_by_id(id).await.unwrap().unwrap();
            assert_eq!(row.status, MembershipStatus::Frozen);
        }

        // Re-read snapshots reflect the store, including the failed item
        assert_eq!(outcome.memberships.len(), 3);
    }

    #[tokio::test]
    async fn test_progress_reaches_final_counts() {
        let (db, engine, orchestrator) = test_setup().await;
        let today = engine.calendar().today();

        for id in ["m-1", "m-2", "m-3", "m-4"] {
            seed_membership(&db, id, MembershipStatus::Frozen, None, Some(today)).await;
        }

        let run = orchestrator
            .prepare(BulkRequest {
                action: BulkAction::Unfreeze,
                mode: FreezeMode::Auto,
                membership_ids: vec![
                    "m-1".to_string(),
                    "m-2".to_string(),
                    "m-3".to_string(),
                    "m-4".to_string(),
                ],
                freeze_days: None,
                reason: None,
            })
            .await
            .unwrap();

        let progress = run.subscribe();
        let outcome = run.execute().await.unwrap();

        assert_eq!(outcome.success_count, 4);
        let last = progress.borrow();
        assert_eq!(last.completed, 4);
        assert_eq!(last.total, 4);
        assert_eq!(last.succeeded, 4);
        assert_eq!(last.failed, 0);
    }
}
