//! Domain primitives: TimeMs, identifiers, TaxMethod, Term.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Milliseconds in one day.
pub const MS_PER_DAY: i64 = 86_400_000;

/// Time in milliseconds since Unix epoch (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    pub fn as_ms(&self) -> i64 {
        self.0
    }

    /// Wall-clock now. Only the API edge uses this; the engine never reads the clock.
    pub fn now() -> Self {
        TimeMs(Utc::now().timestamp_millis())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        TimeMs(dt.timestamp_millis())
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.0)
    }

    /// Midnight UTC of the given calendar date.
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| TimeMs(naive.and_utc().timestamp_millis()))
    }

    /// Whole days elapsed from `earlier` to `self`, floored.
    ///
    /// Saturates at the `i64` bounds instead of wrapping.
    pub fn whole_days_since(&self, earlier: TimeMs) -> i64 {
        self.0.saturating_sub(earlier.0).div_euclid(MS_PER_DAY)
    }
}

impl std::fmt::Display for TimeMs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339()),
            None => write!(f, "{}ms", self.0),
        }
    }
}

/// Authenticated user identifier supplied by the session layer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Acquisition lot identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LotId(pub String);

impl LotId {
    pub fn new(id: impl Into<String>) -> Self {
        LotId(id.into())
    }

    /// Fresh random identifier for lots created without an external id.
    pub fn generate() -> Self {
        LotId(format!("lot_{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Disposal (sell/spend) identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DisposalId(pub String);

impl DisposalId {
    pub fn new(id: impl Into<String>) -> Self {
        DisposalId(id.into())
    }

    pub fn generate() -> Self {
        DisposalId(format!("dsp_{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DisposalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lot selection method for cost-basis matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxMethod {
    /// Oldest lot first.
    #[default]
    Fifo,
    /// Newest lot first.
    Lifo,
    /// Highest cost basis per unit first.
    Hifo,
}

impl TaxMethod {
    pub const ALL: [TaxMethod; 3] = [TaxMethod::Fifo, TaxMethod::Lifo, TaxMethod::Hifo];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaxMethod::Fifo => "fifo",
            TaxMethod::Lifo => "lifo",
            TaxMethod::Hifo => "hifo",
        }
    }
}

impl std::fmt::Display for TaxMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown tax method: {0} (expected fifo, lifo, or hifo)")]
pub struct TaxMethodParseError(pub String);

impl FromStr for TaxMethod {
    type Err = TaxMethodParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fifo" => Ok(TaxMethod::Fifo),
            "lifo" => Ok(TaxMethod::Lifo),
            "hifo" => Ok(TaxMethod::Hifo),
            _ => Err(TaxMethodParseError(s.to_string())),
        }
    }
}

/// Holding-period classification of a realized gain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Term {
    Short,
    Long,
}

impl Term {
    pub fn as_str(&self) -> &'static str {
        match self {
            Term::Short => "short",
            Term::Long => "long",
        }
    }
}

impl std::fmt::Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Term {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "short" => Ok(Term::Short),
            "long" => Ok(Term::Long),
            other => Err(format!("unknown term: {}", other)),
        }
    }
}
