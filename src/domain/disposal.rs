//! Disposal (sell/spend) event.

use crate::domain::{Decimal, DisposalId, TimeMs, UserId};
use serde::{Deserialize, Serialize};

/// A request to remove a quantity of BTC from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disposal {
    pub id: DisposalId,
    pub user: UserId,
    pub quantity: Decimal,
    pub proceeds_per_unit: Decimal,
    pub disposed_at: TimeMs,
}

impl Disposal {
    pub fn new(
        id: DisposalId,
        user: UserId,
        quantity: Decimal,
        proceeds_per_unit: Decimal,
        disposed_at: TimeMs,
    ) -> Self {
        Disposal {
            id,
            user,
            quantity,
            proceeds_per_unit,
            disposed_at,
        }
    }

    /// `None` if the product overflows.
    pub fn total_proceeds(&self) -> Option<Decimal> {
        self.quantity.checked_mul(self.proceeds_per_unit)
    }
}
