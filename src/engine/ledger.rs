use crate::domain::ordering::compare_lots;
use crate::domain::{Decimal, Lot, LotId, TaxMethod, TimeMs, UserId};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, error};

use super::LedgerError;

/// One user's acquisition lots, open and consumed.
///
/// Lots are kept in insertion order; the index maps ids to positions. Consumed
/// lots stay in place so the audit trail can always resolve a fragment's lot.
///
/// The acquired quantity and cost basis summed over every lot always fit in a
/// `Decimal`, so sums over any subset of remaining amounts cannot overflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotLedger {
    user: UserId,
    lots: Vec<Lot>,
    index: HashMap<LotId, usize>,
    total_quantity: Decimal,
    total_cost_basis: Decimal,
}

/// Aggregate view of the open part of a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSummary {
    pub open_lots: usize,
    pub open_quantity: Decimal,
    pub open_cost_basis: Decimal,
    /// None when nothing is held.
    pub average_cost_per_unit: Option<Decimal>,
}

impl LotLedger {
    pub fn new(user: UserId) -> Self {
        Self {
            user,
            lots: Vec::new(),
            index: HashMap::new(),
            total_quantity: Decimal::zero(),
            total_cost_basis: Decimal::zero(),
        }
    }

    /// Rebuild a ledger from a repository snapshot, validating every lot.
    pub fn from_lots(user: UserId, lots: Vec<Lot>) -> Result<Self, LedgerError> {
        let mut ledger = Self::new(user);
        for lot in lots {
            ledger.add_lot(lot)?;
        }
        Ok(ledger)
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// Append a lot.
    ///
    /// # Errors
    /// `InvalidLot` for a non-positive quantity or cost basis, a remaining quantity
    /// outside `[0, quantity]`, a lot owned by another user, or amounts that would
    /// push the ledger totals out of decimal range. `DuplicateLot` if the id is
    /// already present. The ledger is unchanged on error.
    pub fn add_lot(&mut self, lot: Lot) -> Result<(), LedgerError> {
        let cost_basis = self.validate_lot(&lot)?;
        if self.index.contains_key(&lot.id) {
            return Err(LedgerError::DuplicateLot(lot.id));
        }

        let totals = self
            .total_quantity
            .checked_add(lot.quantity)
            .zip(self.total_cost_basis.checked_add(cost_basis));
        let Some((total_quantity, total_cost_basis)) = totals else {
            return Err(LedgerError::InvalidLot {
                lot_id: lot.id,
                reason: "ledger totals would exceed decimal range".to_string(),
            });
        };
        self.total_quantity = total_quantity;
        self.total_cost_basis = total_cost_basis;

        debug!(
            user = %self.user,
            lot_id = %lot.id,
            quantity = %lot.quantity,
            cost_basis_per_unit = %lot.cost_basis_per_unit,
            "lot added to ledger"
        );

        self.index.insert(lot.id.clone(), self.lots.len());
        self.lots.push(lot);
        Ok(())
    }

    /// Returns the lot's total cost basis.
    fn validate_lot(&self, lot: &Lot) -> Result<Decimal, LedgerError> {
        let invalid = |reason: &str| LedgerError::InvalidLot {
            lot_id: lot.id.clone(),
            reason: reason.to_string(),
        };

        if lot.user != self.user {
            return Err(invalid("lot belongs to another user"));
        }
        if !lot.quantity.is_positive() {
            return Err(invalid("quantity must be positive"));
        }
        if !lot.cost_basis_per_unit.is_positive() {
            return Err(invalid("cost basis per unit must be positive"));
        }
        if lot.remaining_quantity.is_negative() || lot.remaining_quantity > lot.quantity {
            return Err(invalid("remaining quantity must be within [0, quantity]"));
        }
        lot.total_cost_basis()
            .ok_or_else(|| invalid("quantity times cost basis exceeds decimal range"))
    }

    pub fn get(&self, lot_id: &LotId) -> Option<&Lot> {
        self.index.get(lot_id).map(|&i| &self.lots[i])
    }

    /// Every lot, including fully consumed ones, in insertion order.
    pub fn lots(&self) -> &[Lot] {
        &self.lots
    }

    pub fn len(&self) -> usize {
        self.lots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }

    /// Lots with quantity left that were acquired at or before `as_of`, oldest first.
    pub fn list_open_lots(&self, as_of: TimeMs) -> Vec<&Lot> {
        let mut open: Vec<&Lot> = self
            .lots
            .iter()
            .filter(|lot| lot.is_open() && lot.acquired_at <= as_of)
            .collect();
        open.sort_by(|a, b| compare_lots(TaxMethod::Fifo, a, b));
        open
    }

    /// Total remaining quantity available to a disposal at `as_of`.
    pub fn open_quantity(&self, as_of: TimeMs) -> Decimal {
        self.lots
            .iter()
            .filter(|lot| lot.is_open() && lot.acquired_at <= as_of)
            .map(|lot| lot.remaining_quantity)
            .sum()
    }

    /// # Errors
    /// `Overflow` if an aggregate does not fit in a `Decimal`.
    pub fn summary(&self, as_of: TimeMs) -> Result<LedgerSummary, LedgerError> {
        let overflow = || LedgerError::Overflow(format!("open lot summary for {}", self.user));

        let open = self.list_open_lots(as_of);
        let open_quantity = Decimal::checked_sum(open.iter().map(|lot| lot.remaining_quantity))
            .ok_or_else(overflow)?;
        let open_cost_basis = open
            .iter()
            .map(|lot| lot.remaining_cost_basis())
            .try_fold(Decimal::zero(), |acc, cost| acc.checked_add(cost?))
            .ok_or_else(overflow)?;
        let average_cost_per_unit = if open_quantity.is_positive() {
            Some(
                open_cost_basis
                    .checked_div(open_quantity)
                    .ok_or_else(overflow)?,
            )
        } else {
            None
        };

        Ok(LedgerSummary {
            open_lots: open.len(),
            open_quantity,
            open_cost_basis,
            average_cost_per_unit,
        })
    }

    /// Decrease a lot's remaining quantity.
    ///
    /// Returns the new remaining quantity.
    ///
    /// # Errors
    /// `InvalidQuantity` for a non-positive amount, `UnknownLot` for a missing id,
    /// `InsufficientLotQuantity` if `quantity` exceeds what remains.
    pub fn apply_consumption(
        &mut self,
        lot_id: &LotId,
        quantity: Decimal,
    ) -> Result<Decimal, LedgerError> {
        let idx = self.check_consumption(lot_id, quantity)?;
        let lot = &mut self.lots[idx];
        lot.remaining_quantity -= quantity;
        Ok(lot.remaining_quantity)
    }

    /// Apply several consumptions all-or-nothing.
    ///
    /// Amounts against the same lot are summed before checking, so either every
    /// consumption fits and all are applied, or none are.
    pub fn apply_consumptions(
        &mut self,
        consumptions: &[(LotId, Decimal)],
    ) -> Result<(), LedgerError> {
        let mut per_lot: Vec<(usize, Decimal)> = Vec::new();
        for (lot_id, quantity) in consumptions {
            if !quantity.is_positive() {
                return Err(LedgerError::InvalidQuantity(*quantity));
            }
            let idx = *self
                .index
                .get(lot_id)
                .ok_or_else(|| LedgerError::UnknownLot(lot_id.clone()))?;
            match per_lot.iter_mut().find(|(i, _)| *i == idx) {
                Some((_, total)) => {
                    *total = total.checked_add(*quantity).ok_or_else(|| {
                        LedgerError::Overflow(format!("consumptions against lot {}", lot_id))
                    })?;
                }
                None => per_lot.push((idx, *quantity)),
            }
        }

        for &(idx, total) in &per_lot {
            self.check_consumption(&self.lots[idx].id, total)?;
        }

        for (idx, total) in per_lot {
            self.lots[idx].remaining_quantity -= total;
        }
        Ok(())
    }

    fn check_consumption(&self, lot_id: &LotId, quantity: Decimal) -> Result<usize, LedgerError> {
        if !quantity.is_positive() {
            return Err(LedgerError::InvalidQuantity(quantity));
        }
        let idx = *self
            .index
            .get(lot_id)
            .ok_or_else(|| LedgerError::UnknownLot(lot_id.clone()))?;
        let lot = &self.lots[idx];
        if quantity > lot.remaining_quantity {
            error!(
                lot_id = %lot_id,
                requested = %quantity,
                remaining = %lot.remaining_quantity,
                "consumption exceeds remaining lot quantity"
            );
            return Err(LedgerError::InsufficientLotQuantity {
                lot_id: lot_id.clone(),
                requested: quantity,
                remaining: lot.remaining_quantity,
            });
        }
        Ok(idx)
    }
}
