//! # Freeze Planning
//!
//! Pure planning for the membership freeze/unfreeze state machine.
//!
//! ## The State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 Membership Freeze State Machine                         │
//! │                                                                         │
//! │             freeze (manual │ automatic)                                 │
//! │        ┌──────────────────────────────────┐                            │
//! │        │                                  ▼                            │
//! │   ┌─────────┐                        ┌─────────┐                       │
//! │   │ active  │                        │ frozen  │                       │
//! │   └─────────┘                        └─────────┘                       │
//! │        ▲                                  │                            │
//! │        └──────────────────────────────────┘                            │
//! │             unfreeze (manual │ automatic)                               │
//! │                                                                         │
//! │   Credit timing differs by trigger:                                     │
//! │   • manual freeze     → end_date += freeze_days IMMEDIATELY            │
//! │   • automatic freeze  → credit deferred until reactivation             │
//! │   • manual unfreeze   → NO credit applied                              │
//! │   • automatic unfreeze→ end_date += days frozen (freeze_date → today)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Planning is pure: given a membership snapshot and today's date, these
//! functions either return a precondition error or a plan value describing
//! every field the persistence layer must write. The engine crate applies
//! plans; nothing here touches I/O.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calendar::BusinessCalendar;
use crate::error::{CoreError, CoreResult};
use crate::types::{Membership, MembershipStatus};

// =============================================================================
// Modes and Plans
// =============================================================================

/// How a freeze/unfreeze was triggered.
///
/// `Auto` is the scheduled/system path; `Manual` is an operator decision
/// with an explicit day count (freeze) or no credit at all (unfreeze).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreezeMode {
    Auto,
    Manual,
}

/// Everything a freeze writes to the membership row.
#[derive(Debug, Clone, PartialEq)]
pub struct FreezePlan {
    pub status: MembershipStatus,
    pub freeze_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub total_frozen_days: i64,
    /// Days credited onto end_date by this operation (manual freeze only).
    pub days_credited: i64,
    /// Human-readable line appended to the membership notes.
    pub note_line: String,
}

/// Everything an unfreeze writes to the membership row.
#[derive(Debug, Clone, PartialEq)]
pub struct UnfreezePlan {
    pub status: MembershipStatus,
    pub unfreeze_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub total_frozen_days: i64,
    /// Days credited onto end_date by this operation (automatic only).
    pub days_credited: i64,
    pub note_line: String,
}

// =============================================================================
// Planning
// =============================================================================

/// Plans a freeze for an active membership.
///
/// ## Preconditions
/// - `membership.status == Active`, otherwise `MembershipNotActive` and the
///   row stays untouched.
///
/// ## Credit Timing
/// - Manual with `freeze_days`: the credit lands on `end_date` immediately
///   (the member knows their exact new expiration up front) and
///   `total_frozen_days` accumulates now. A membership without an
///   `end_date` still accumulates the counter; there is no date to shift.
/// - Automatic: nothing changes besides status and `freeze_date`; the
///   credit is computed from elapsed days at reactivation.
pub fn plan_freeze(
    membership: &Membership,
    mode: FreezeMode,
    freeze_days: Option<i64>,
    reason: Option<&str>,
    calendar: &BusinessCalendar,
    today: NaiveDate,
) -> CoreResult<FreezePlan> {
    if !membership.is_active() {
        return Err(CoreError::MembershipNotActive {
            id: membership.id.clone(),
            status: membership.status,
        });
    }

    let display_date = calendar.format_for_display(today);

    let plan = match (mode, freeze_days) {
        (FreezeMode::Manual, Some(days)) => {
            let new_end = membership
                .end_date
                .map(|end| calendar.add_days(end, days as u64));
            FreezePlan {
                status: MembershipStatus::Frozen,
                freeze_date: today,
                end_date: new_end,
                total_frozen_days: membership.total_frozen_days + days,
                days_credited: days,
                note_line: with_reason(
                    format!("Frozen manually for {} days on {}.", days, display_date),
                    reason,
                ),
            }
        }
        (FreezeMode::Manual, None) => FreezePlan {
            status: MembershipStatus::Frozen,
            freeze_date: today,
            end_date: membership.end_date,
            total_frozen_days: membership.total_frozen_days,
            days_credited: 0,
            note_line: with_reason(format!("Frozen manually on {}.", display_date), reason),
        },
        (FreezeMode::Auto, _) => FreezePlan {
            status: MembershipStatus::Frozen,
            freeze_date: today,
            end_date: membership.end_date,
            total_frozen_days: membership.total_frozen_days,
            days_credited: 0,
            note_line: with_reason(format!("Frozen automatically on {}.", display_date), reason),
        },
    };

    Ok(plan)
}

/// Plans a reactivation for a frozen membership.
///
/// ## Preconditions
/// - `membership.status == Frozen`, otherwise `MembershipNotFrozen`.
/// - Automatic mode additionally requires `freeze_date` to be set
///   (`MissingFreezeDate` otherwise); without it there is nothing to
///   measure the elapsed credit against.
///
/// Automatic reactivation credits `days_between(freeze_date, today)` onto
/// `end_date` and the accumulator. Manual reactivation applies no credit;
/// it exists for cases where the operator decides the pause should not
/// extend the membership.
pub fn plan_unfreeze(
    membership: &Membership,
    mode: FreezeMode,
    reason: Option<&str>,
    calendar: &BusinessCalendar,
    today: NaiveDate,
) -> CoreResult<UnfreezePlan> {
    if !membership.is_frozen() {
        return Err(CoreError::MembershipNotFrozen {
            id: membership.id.clone(),
            status: membership.status,
        });
    }

    let display_date = calendar.format_for_display(today);

    let plan = match mode {
        FreezeMode::Auto => {
            let freeze_date =
                membership
                    .freeze_date
                    .ok_or_else(|| CoreError::MissingFreezeDate {
                        id: membership.id.clone(),
                    })?;
            let days = calendar.days_between(freeze_date, today);
            let new_end = membership
                .end_date
                .map(|end| calendar.add_days(end, days as u64));
            UnfreezePlan {
                status: MembershipStatus::Active,
                unfreeze_date: today,
                end_date: new_end,
                total_frozen_days: membership.total_frozen_days + days,
                days_credited: days,
                note_line: format!("Reactivated automatically on {}.", display_date),
            }
        }
        FreezeMode::Manual => UnfreezePlan {
            status: MembershipStatus::Active,
            unfreeze_date: today,
            end_date: membership.end_date,
            total_frozen_days: membership.total_frozen_days,
            days_credited: 0,
            note_line: with_reason(format!("Reactivated manually on {}.", display_date), reason),
        },
    };

    Ok(plan)
}

// =============================================================================
// Projections (dry-run support)
// =============================================================================

/// Days the membership has been frozen so far, clamped to ≥ 0.
///
/// Returns 0 for memberships without a recorded freeze_date.
pub fn current_frozen_days(
    membership: &Membership,
    calendar: &BusinessCalendar,
    today: NaiveDate,
) -> i64 {
    match membership.freeze_date {
        Some(freeze_date) => calendar.days_between(freeze_date, today),
        None => 0,
    }
}

/// What `end_date` would become if the membership were automatically
/// reactivated today. Used to render previews before committing.
pub fn projected_end_date(
    membership: &Membership,
    calendar: &BusinessCalendar,
    today: NaiveDate,
) -> Option<NaiveDate> {
    let end = membership.end_date?;
    if membership.freeze_date.is_none() {
        return Some(end);
    }
    let days = current_frozen_days(membership, calendar, today);
    Some(calendar.add_days(end, days as u64))
}

fn with_reason(base: String, reason: Option<&str>) -> String {
    match reason {
        Some(r) if !r.trim().is_empty() => format!("{} Reason: {}", base, r.trim()),
        _ => base,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
