//! # Business Calendar
//!
//! Civil-date arithmetic anchored to the gym's local timezone.
//!
//! ## Why Not Wall-Clock Math?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Freeze credits are counted in CALENDAR DAYS, not elapsed hours.        │
//! │                                                                         │
//! │  A membership frozen at 23:50 and reactivated at 00:10 the next day    │
//! │  was frozen for 1 civil day, even though only 20 minutes elapsed.      │
//! │                                                                         │
//! │  Millisecond math also drifts across DST transitions; whole-day        │
//! │  NaiveDate arithmetic does not.                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The server may run in any UTC offset; "today" is always resolved at the
//! business's fixed offset before truncating to a date.

use chrono::{DateTime, Days, FixedOffset, NaiveDate, Utc};

/// Default business offset: UTC-6 (central Mexico, no DST since 2022).
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = -6;

/// Calendar utilities pinned to a fixed business timezone.
///
/// ## Usage
/// ```rust
/// use vigor_core::calendar::BusinessCalendar;
/// use chrono::NaiveDate;
///
/// let cal = BusinessCalendar::default();
/// let start = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
/// let end = cal.add_days(start, 10);
/// assert_eq!(end, NaiveDate::from_ymd_opt(2025, 2, 11).unwrap());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct BusinessCalendar {
    offset: FixedOffset,
}

impl BusinessCalendar {
    /// Creates a calendar with an explicit UTC offset in hours.
    ///
    /// Falls back to the default offset if the hour value is out of the
    /// representable range (±23).
    pub fn with_offset_hours(hours: i32) -> Self {
        let offset = FixedOffset::east_opt(hours * 3600)
            .unwrap_or_else(|| FixedOffset::east_opt(DEFAULT_UTC_OFFSET_HOURS * 3600).unwrap());
        BusinessCalendar { offset }
    }

    /// Today's civil date at the business offset.
    pub fn today(&self) -> NaiveDate {
        self.civil_date_of(Utc::now())
    }

    /// The civil date a given instant falls on at the business offset.
    ///
    /// Split out from [`today`](Self::today) so tests can pin the clock.
    pub fn civil_date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    /// Shifts a date forward by `n` calendar days (n may be 0).
    pub fn add_days(&self, date: NaiveDate, n: u64) -> NaiveDate {
        // NaiveDate covers ±262000 years; adding a day count that overflows
        // it is not reachable from validated inputs
        date.checked_add_days(Days::new(n)).unwrap_or(date)
    }

    /// Whole civil days from `a` to `b`, clamped to ≥ 0.
    pub fn days_between(&self, a: NaiveDate, b: NaiveDate) -> i64 {
        (b - a).num_days().max(0)
    }

    /// Human-readable date for embedding into membership notes.
    ///
    /// Example output: `01 Feb 2025`.
    pub fn format_for_display(&self, date: NaiveDate) -> String {
        date.format("%d %b %Y").to_string()
    }
}

impl Default for BusinessCalendar {
    fn default() -> Self {
        BusinessCalendar::with_offset_hours(DEFAULT_UTC_OFFSET_HOURS)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
