//! Tax liability estimation over realized-gain fragments.
//!
//! Stateless: every call folds the supplied fragments with the supplied rates.
//! Rates and method selection change per request, so nothing here is cached.

use crate::domain::{Decimal, RealizedGainFragment, Term};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal as RustDecimal;
use serde::Serialize;
use std::str::FromStr;

use super::LedgerError;

/// A validated, non-negative tax rate expressed as a fraction (0.15 = 15%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct TaxRate(Decimal);

impl TaxRate {
    /// # Errors
    /// `InvalidRate` for a negative rate.
    pub fn new(rate: Decimal) -> Result<Self, LedgerError> {
        if rate.is_negative() {
            return Err(LedgerError::InvalidRate(format!(
                "rate must not be negative, got {}",
                rate
            )));
        }
        Ok(TaxRate(rate))
    }

    /// # Errors
    /// `InvalidRate` for NaN, infinities, negatives, or values outside decimal range.
    pub fn from_f64(rate: f64) -> Result<Self, LedgerError> {
        if !rate.is_finite() {
            return Err(LedgerError::InvalidRate(format!(
                "rate must be finite, got {}",
                rate
            )));
        }
        let value = RustDecimal::from_f64(rate).ok_or_else(|| {
            LedgerError::InvalidRate(format!("rate out of range: {}", rate))
        })?;
        Self::new(Decimal::new(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl FromStr for TaxRate {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str_canonical(s)
            .map_err(|_| LedgerError::InvalidRate(format!("not a finite number: {}", s)))?;
        Self::new(value)
    }
}

/// Short- and long-term rates supplied by the rate configuration source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxRates {
    pub short_term: TaxRate,
    pub long_term: TaxRate,
}

impl TaxRates {
    pub fn new(short_term: TaxRate, long_term: TaxRate) -> Self {
        Self {
            short_term,
            long_term,
        }
    }

    pub fn for_term(&self, term: Term) -> TaxRate {
        match term {
            Term::Short => self.short_term,
            Term::Long => self.long_term,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EstimateOptions {
    /// Net losses against gains inside each term bucket before applying the rate.
    pub include_loss_offset: bool,
}

/// One term bucket of the estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketLiability {
    /// Sum of positive gains.
    pub realized_gains: Decimal,
    /// Magnitude of the sum of negative gains.
    pub realized_losses: Decimal,
    /// Gain the rate was applied to; never negative.
    pub taxable_gain: Decimal,
    pub rate: Decimal,
    pub liability: Decimal,
}

impl BucketLiability {
    fn compute(
        fragments: &[RealizedGainFragment],
        term: Term,
        rate: TaxRate,
        options: EstimateOptions,
    ) -> Result<Self, LedgerError> {
        let overflow = || LedgerError::Overflow(format!("{} liability", term));

        let mut realized_gains = Decimal::zero();
        let mut realized_losses = Decimal::zero();
        for fragment in fragments.iter().filter(|f| f.term == term) {
            if fragment.gain.is_negative() {
                realized_losses = realized_losses
                    .checked_add(fragment.gain.abs())
                    .ok_or_else(overflow)?;
            } else {
                realized_gains = realized_gains
                    .checked_add(fragment.gain)
                    .ok_or_else(overflow)?;
            }
        }

        // Both sums are non-negative, so the difference always fits.
        let taxable_gain = if options.include_loss_offset {
            (realized_gains - realized_losses).floor_zero()
        } else {
            realized_gains
        };
        let liability = taxable_gain
            .checked_mul(rate.value())
            .ok_or_else(overflow)?;

        Ok(BucketLiability {
            realized_gains,
            realized_losses,
            taxable_gain,
            rate: rate.value(),
            liability,
        })
    }

    pub fn net_gain(&self) -> Decimal {
        self.realized_gains - self.realized_losses
    }
}

/// Estimated liability split by holding term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxLiability {
    pub short_term: BucketLiability,
    pub long_term: BucketLiability,
    #[serde(skip)]
    total: Decimal,
}

impl TaxLiability {
    pub fn total(&self) -> Decimal {
        self.total
    }
}

/// Sum gains per term and apply the matching rate.
///
/// Losses are ignored unless `options.include_loss_offset` is set, in which case
/// they net against gains within the same bucket only, floored at zero.
///
/// # Errors
/// `Overflow` if a bucket sum or liability does not fit in a `Decimal`.
pub fn estimate(
    fragments: &[RealizedGainFragment],
    rates: &TaxRates,
    options: EstimateOptions,
) -> Result<TaxLiability, LedgerError> {
    let short_term = BucketLiability::compute(fragments, Term::Short, rates.short_term, options)?;
    let long_term = BucketLiability::compute(fragments, Term::Long, rates.long_term, options)?;
    let total = short_term
        .liability
        .checked_add(long_term.liability)
        .ok_or_else(|| LedgerError::Overflow("total liability".to_string()))?;
    Ok(TaxLiability {
        short_term,
        long_term,
        total,
    })
}
