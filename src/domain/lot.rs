//! Acquisition lot.

use crate::domain::{Decimal, LotId, TimeMs, UserId};
use serde::{Deserialize, Serialize};

/// A discrete acquisition of BTC with its own cost basis and date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lot {
    pub id: LotId,
    pub user: UserId,
    /// Quantity acquired. Always > 0.
    pub quantity: Decimal,
    /// Cost per unit in the ledger's base currency. Always > 0.
    pub cost_basis_per_unit: Decimal,
    pub acquired_at: TimeMs,
    /// What is left after disposals; `0 <= remaining_quantity <= quantity`.
    pub remaining_quantity: Decimal,
}

impl Lot {
    /// Create a fresh, fully open lot.
    pub fn new(
        id: LotId,
        user: UserId,
        quantity: Decimal,
        cost_basis_per_unit: Decimal,
        acquired_at: TimeMs,
    ) -> Self {
        Lot {
            id,
            user,
            quantity,
            cost_basis_per_unit,
            acquired_at,
            remaining_quantity: quantity,
        }
    }

    pub fn is_open(&self) -> bool {
        self.remaining_quantity.is_positive()
    }

    pub fn consumed_quantity(&self) -> Decimal {
        self.quantity - self.remaining_quantity
    }

    /// Cost basis attached to what is still held. `None` if it overflows.
    pub fn remaining_cost_basis(&self) -> Option<Decimal> {
        self.remaining_quantity.checked_mul(self.cost_basis_per_unit)
    }

    pub fn total_cost_basis(&self) -> Option<Decimal> {
        self.quantity.checked_mul(self.cost_basis_per_unit)
    }
}
