//! Domain types for the BitBasis tax-lot engine.
//!
//! This module provides:
//! - Lossless numeric handling via the Decimal wrapper
//! - Primitives: TimeMs, UserId, LotId, DisposalId, TaxMethod, Term
//! - Lot, Disposal and RealizedGainFragment records
//! - Deterministic candidate ordering per tax method

pub mod decimal;
pub mod disposal;
pub mod fragment;
pub mod lot;
pub mod ordering;
pub mod primitives;

pub use decimal::Decimal;
pub use disposal::Disposal;
pub use fragment::RealizedGainFragment;
pub use lot::Lot;
pub use primitives::{
    DisposalId, LotId, TaxMethod, TaxMethodParseError, Term, TimeMs, UserId, MS_PER_DAY,
};
