//! Realized gain fragment: one disposal matched against one lot.

use crate::domain::{Decimal, Disposal, DisposalId, Lot, LotId, TaxMethod, Term, TimeMs, UserId};
use serde::{Deserialize, Serialize};

/// The immutable audit record produced when part of a disposal consumes part of a lot.
///
/// Several fragments may share a disposal (it spanned lots) or a lot (it was sold
/// across several disposals). `cost_basis`, `proceeds` and `gain` are exact
/// products of the matched quantity and the per-unit values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealizedGainFragment {
    /// Stable key derived from the (disposal, lot) pair.
    pub id: String,
    pub user: UserId,
    pub lot_id: LotId,
    pub disposal_id: DisposalId,
    pub method: TaxMethod,
    pub quantity_matched: Decimal,
    pub cost_basis: Decimal,
    pub proceeds: Decimal,
    pub gain: Decimal,
    pub acquired_at: TimeMs,
    pub disposed_at: TimeMs,
    pub holding_period_days: i64,
    pub term: Term,
}

impl RealizedGainFragment {
    /// Build a fragment for `quantity_matched` units of `lot` consumed by `disposal`.
    ///
    /// `quantity_matched` is at most the lot's and the disposal's quantity, and
    /// both of their totals are range-checked before matching.
    pub fn new(
        lot: &Lot,
        disposal: &Disposal,
        method: TaxMethod,
        quantity_matched: Decimal,
        holding_period_days: i64,
        term: Term,
    ) -> Self {
        let cost_basis = quantity_matched * lot.cost_basis_per_unit;
        let proceeds = quantity_matched * disposal.proceeds_per_unit;
        RealizedGainFragment {
            id: Self::compute_fragment_key(&disposal.id, &lot.id),
            user: disposal.user.clone(),
            lot_id: lot.id.clone(),
            disposal_id: disposal.id.clone(),
            method,
            quantity_matched,
            cost_basis,
            proceeds,
            gain: proceeds - cost_basis,
            acquired_at: lot.acquired_at,
            disposed_at: disposal.disposed_at,
            holding_period_days,
            term,
        }
    }

    /// Deterministic fragment key.
    ///
    /// A disposal touches each lot at most once, so the pair is unique. The key is a
    /// truncated SHA-256 so it stays short regardless of the caller's id format.
    pub fn compute_fragment_key(disposal_id: &DisposalId, lot_id: &LotId) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update((disposal_id.as_str().len() as u64).to_le_bytes());
        hasher.update(disposal_id.as_str());
        hasher.update((lot_id.as_str().len() as u64).to_le_bytes());
        hasher.update(lot_id.as_str());
        let hash = hasher.finalize();
        format!("frag:{}", hex::encode(&hash[..16]))
    }

    pub fn is_loss(&self) -> bool {
        self.gain.is_negative()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_fragment_amounts() {
        let lot = Lot::new(
            LotId::new("lot-1"),
            UserId::new("u"),
            d("10"),
            d("10000"),
            TimeMs::new(0),
        );
        let disposal = Disposal::new(
            DisposalId::new("d-1"),
            UserId::new("u"),
            d("12"),
            d("50000"),
            TimeMs::new(1),
        );
        let frag =
            RealizedGainFragment::new(&lot, &disposal, TaxMethod::Fifo, d("10"), 0, Term::Short);
        assert_eq!(frag.cost_basis, d("100000"));
        assert_eq!(frag.proceeds, d("500000"));
        assert_eq!(frag.gain, d("400000"));
        assert!(!frag.is_loss());
    }

    #[test]
    fn test_fragment_key_is_deterministic_and_pair_sensitive() {
        let key = |disposal: &str, lot: &str| {
            RealizedGainFragment::compute_fragment_key(&DisposalId::new(disposal), &LotId::new(lot))
        };
        let a = key("d1", "l1");
        let b = key("d1", "l1");
        let c = key("d1", "l2");
        let swapped = key("l1", "d1");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, swapped);
        assert!(a.starts_with("frag:"));
        assert_eq!(a.len(), "frag:".len() + 32);
    }
}
