//! Candidate lot ordering per tax method.

use crate::domain::{Lot, TaxMethod};
use std::cmp::{Ordering, Reverse};

/// Total order over lots for one tax method.
///
/// - FIFO: acquired_at ascending
/// - LIFO: acquired_at descending
/// - HIFO: cost_basis_per_unit descending, then acquired_at ascending
///
/// Every method falls back to lot id ascending so equal keys still sort the same
/// way on every run.
pub fn compare_lots(method: TaxMethod, a: &Lot, b: &Lot) -> Ordering {
    let primary = match method {
        TaxMethod::Fifo => a.acquired_at.cmp(&b.acquired_at),
        TaxMethod::Lifo => Reverse(a.acquired_at).cmp(&Reverse(b.acquired_at)),
        TaxMethod::Hifo => Reverse(a.cost_basis_per_unit)
            .cmp(&Reverse(b.cost_basis_per_unit))
            .then_with(|| a.acquired_at.cmp(&b.acquired_at)),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

/// Sort lots into consumption order for `method`.
pub fn sort_lots_for_method(method: TaxMethod, lots: &mut [Lot]) {
    lots.sort_by(|a, b| compare_lots(method, a, b));
}

/// Sort lots into ledger order (oldest first).
pub fn sort_lots_chronological(lots: &mut [Lot]) {
    sort_lots_for_method(TaxMethod::Fifo, lots);
}
