use crate::domain::ordering::compare_lots;
use crate::domain::{Decimal, Disposal, Lot, LotId, RealizedGainFragment, TaxMethod, Term};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::term::{classify, holding_period_days};
use super::{LedgerError, LotLedger};

/// The fragments a disposal would produce under one method, not yet applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchPlan {
    pub method: TaxMethod,
    pub fragments: Vec<RealizedGainFragment>,
}

impl MatchPlan {
    /// (lot, quantity) pairs to apply against the ledger.
    pub fn consumptions(&self) -> Vec<(LotId, Decimal)> {
        self.fragments
            .iter()
            .map(|f| (f.lot_id.clone(), f.quantity_matched))
            .collect()
    }

    pub fn quantity_matched(&self) -> Decimal {
        self.fragments.iter().map(|f| f.quantity_matched).sum()
    }

    pub fn total_gain(&self) -> Decimal {
        self.fragments.iter().map(|f| f.gain).sum()
    }

    pub fn gain_for_term(&self, term: Term) -> Decimal {
        self.fragments
            .iter()
            .filter(|f| f.term == term)
            .map(|f| f.gain)
            .sum()
    }
}

/// Selects lots for a disposal and emits realized-gain fragments.
pub struct DisposalMatcher;

impl DisposalMatcher {
    /// Compute the fragments for `disposal` under `method` without touching the ledger.
    ///
    /// Candidates are the lots open at `disposal.disposed_at`, walked in method
    /// order; each contributes `min(remaining, outstanding)`.
    ///
    /// # Errors
    /// `InvalidDisposal` for a malformed disposal or one whose total proceeds do
    /// not fit in a `Decimal`, `InsufficientBasis` when the open lots cannot cover
    /// the requested quantity.
    pub fn plan(
        ledger: &LotLedger,
        disposal: &Disposal,
        method: TaxMethod,
    ) -> Result<MatchPlan, LedgerError> {
        Self::validate_disposal(ledger, disposal)?;

        let mut candidates: Vec<&Lot> = ledger.list_open_lots(disposal.disposed_at);
        candidates.sort_by(|a, b| compare_lots(method, a, b));

        let available = Decimal::checked_sum(candidates.iter().map(|lot| lot.remaining_quantity))
            .ok_or_else(|| LedgerError::Overflow(format!("open basis for {}", disposal.id)))?;
        if available < disposal.quantity {
            warn!(
                user = %disposal.user,
                disposal_id = %disposal.id,
                requested = %disposal.quantity,
                available = %available,
                "disposal exceeds open basis"
            );
            return Err(LedgerError::InsufficientBasis {
                disposal_id: disposal.id.clone(),
                requested: disposal.quantity,
                available,
            });
        }

        let mut outstanding = disposal.quantity;
        let mut fragments = Vec::new();
        for lot in candidates {
            if outstanding.is_zero() {
                break;
            }
            let take = lot.remaining_quantity.min(outstanding);
            let days = holding_period_days(lot.acquired_at, disposal.disposed_at);
            let term = classify(lot.acquired_at, disposal.disposed_at);
            fragments.push(RealizedGainFragment::new(
                lot, disposal, method, take, days, term,
            ));
            outstanding -= take;
        }

        debug!(
            disposal_id = %disposal.id,
            method = %method,
            fragments = fragments.len(),
            "match planned"
        );

        Ok(MatchPlan { method, fragments })
    }

    /// Match `disposal` and commit the consumptions to `ledger`.
    ///
    /// All-or-nothing: on any error the ledger is exactly as it was.
    pub fn match_disposal(
        ledger: &mut LotLedger,
        disposal: &Disposal,
        method: TaxMethod,
    ) -> Result<Vec<RealizedGainFragment>, LedgerError> {
        let plan = Self::plan(ledger, disposal, method)?;
        ledger.apply_consumptions(&plan.consumptions())?;

        info!(
            user = %disposal.user,
            disposal_id = %disposal.id,
            method = %method,
            quantity = %disposal.quantity,
            fragments = plan.fragments.len(),
            "disposal matched"
        );

        Ok(plan.fragments)
    }

    /// Preview the disposal under every method, in FIFO, LIFO, HIFO order.
    pub fn compare_methods(
        ledger: &LotLedger,
        disposal: &Disposal,
    ) -> Result<Vec<MatchPlan>, LedgerError> {
        TaxMethod::ALL
            .iter()
            .map(|&method| Self::plan(ledger, disposal, method))
            .collect()
    }

    fn validate_disposal(ledger: &LotLedger, disposal: &Disposal) -> Result<(), LedgerError> {
        let invalid = |reason: &str| LedgerError::InvalidDisposal {
            disposal_id: disposal.id.clone(),
            reason: reason.to_string(),
        };

        if &disposal.user != ledger.user() {
            return Err(invalid("disposal belongs to another user"));
        }
        if !disposal.quantity.is_positive() {
            return Err(invalid("quantity must be positive"));
        }
        if disposal.proceeds_per_unit.is_negative() {
            return Err(invalid("proceeds per unit must not be negative"));
        }
        if disposal.total_proceeds().is_none() {
            return Err(invalid("quantity times proceeds exceeds decimal range"));
        }
        Ok(())
    }
}
