use crate::domain::{Term, TimeMs};
use serde::Serialize;

/// Minimum whole days held for long-term treatment (strictly more than 365).
pub const LONG_TERM_MIN_DAYS: i64 = 366;

/// Whole days between acquisition and disposal, floored and never negative.
pub fn holding_period_days(acquired_at: TimeMs, disposed_at: TimeMs) -> i64 {
    disposed_at.whole_days_since(acquired_at).max(0)
}

/// Short/long-term classification from the two timestamps alone.
///
/// Exactly 365 days is short-term; 366 days is long-term. Day counts are fixed
/// 24h spans, so a leap year does not shift the boundary.
pub fn classify(acquired_at: TimeMs, disposed_at: TimeMs) -> Term {
    if holding_period_days(acquired_at, disposed_at) >= LONG_TERM_MIN_DAYS {
        Term::Long
    } else {
        Term::Short
    }
}

/// Badge data for a holding as of a reference date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermStatus {
    pub term: Term,
    pub holding_days: i64,
    /// Zero once the holding is long-term.
    pub days_until_long_term: i64,
}

pub fn term_status(acquired_at: TimeMs, as_of: TimeMs) -> TermStatus {
    let holding_days = holding_period_days(acquired_at, as_of);
    TermStatus {
        term: classify(acquired_at, as_of),
        holding_days,
        days_until_long_term: (LONG_TERM_MIN_DAYS - holding_days).max(0),
    }
}
