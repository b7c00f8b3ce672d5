//! Pure computation engine for deterministic tax-lot accounting.
//!
//! Nothing in here touches the clock, the database or the network: the ledger is
//! an in-memory snapshot, the matcher plans then commits against it, and the
//! estimator is a fold over fragments.

use crate::domain::{Decimal, DisposalId, LotId};
use thiserror::Error;

pub mod ledger;
pub mod liability;
pub mod matcher;
pub mod term;

pub use ledger::{LedgerSummary, LotLedger};
pub use liability::{BucketLiability, EstimateOptions, TaxLiability, TaxRate, TaxRates};
pub use matcher::{DisposalMatcher, MatchPlan};
pub use term::{classify, holding_period_days, term_status, TermStatus, LONG_TERM_MIN_DAYS};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("invalid lot {lot_id}: {reason}")]
    InvalidLot { lot_id: LotId, reason: String },
    #[error("duplicate lot id: {0}")]
    DuplicateLot(LotId),
    #[error("invalid disposal {disposal_id}: {reason}")]
    InvalidDisposal {
        disposal_id: DisposalId,
        reason: String,
    },
    #[error("consumption quantity must be positive, got {0}")]
    InvalidQuantity(Decimal),
    #[error(
        "insufficient basis for disposal {disposal_id}: requested {requested}, available {available}"
    )]
    InsufficientBasis {
        disposal_id: DisposalId,
        requested: Decimal,
        available: Decimal,
    },
    /// A caller tried to consume more than a lot holds. This is a logic defect, not
    /// a user error.
    #[error("lot {lot_id} has {remaining} remaining, cannot consume {requested}")]
    InsufficientLotQuantity {
        lot_id: LotId,
        requested: Decimal,
        remaining: Decimal,
    },
    #[error("unknown lot: {0}")]
    UnknownLot(LotId),
    #[error("invalid tax rate: {0}")]
    InvalidRate(String),
    #[error("amount out of range: {0}")]
    Overflow(String),
}
