//! Orchestration between the pure engine and a `LotRepository`.
//!
//! Every mutation for a user runs under that user's lock:
//! load snapshot -> match in memory -> commit through the repository. Reads go
//! straight to the repository.

use crate::domain::{
    Decimal, Disposal, DisposalId, Lot, LotId, RealizedGainFragment, TaxMethod, TimeMs, UserId,
};
use crate::engine::{
    liability, DisposalMatcher, EstimateOptions, LedgerError, LedgerSummary, LotLedger,
    MatchPlan, TaxLiability, TaxRates,
};
use crate::import::{self, ImportError, ImportedTransaction, TransactionKind};
use crate::store::{DisposalCommit, LotRepository, LotUpdate, StoreError};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

pub mod locks;

pub use locks::UserLocks;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Import(#[from] ImportError),
    /// A replayed import row failed; rows before it are committed.
    #[error("import line {line}: {source}")]
    ImportRow {
        line: usize,
        #[source]
        source: Box<ServiceError>,
    },
}

/// Open lots of a user at a point in time plus their aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenLotsView {
    pub as_of: TimeMs,
    pub lots: Vec<Lot>,
    pub summary: LedgerSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub lots_added: usize,
    pub disposals_matched: usize,
    pub transfers_skipped: usize,
    pub fragments_created: usize,
    pub realized_gain: Decimal,
}

#[derive(Debug, Clone)]
pub struct LedgerService {
    store: Arc<dyn LotRepository>,
    locks: Arc<UserLocks>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn LotRepository>) -> Self {
        Self {
            store,
            locks: Arc::new(UserLocks::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn LotRepository> {
        &self.store
    }

    /// Validate and persist a new lot.
    ///
    /// The lot is checked against every lot the user already holds, so the
    /// user's totals stay within decimal range.
    pub async fn add_lot(&self, lot: Lot) -> Result<Lot, ServiceError> {
        let _guard = self.locks.lock(&lot.user).await;

        let existing = self.store.load_lots(&lot.user).await?;
        LotLedger::from_lots(lot.user.clone(), existing)?.add_lot(lot.clone())?;
        self.store.insert_lot(&lot).await.map_err(|e| match e {
            StoreError::Duplicate(_) => LedgerError::DuplicateLot(lot.id.clone()).into(),
            other => ServiceError::Store(other),
        })?;

        info!(
            user = %lot.user,
            lot_id = %lot.id,
            quantity = %lot.quantity,
            acquired_at = %lot.acquired_at,
            "lot recorded"
        );
        Ok(lot)
    }

    pub async fn open_lots(
        &self,
        user: &UserId,
        as_of: TimeMs,
    ) -> Result<OpenLotsView, ServiceError> {
        let ledger = self.snapshot(user, as_of).await?;
        let summary = ledger.summary(as_of)?;
        let lots = ledger.list_open_lots(as_of).into_iter().cloned().collect();
        Ok(OpenLotsView {
            as_of,
            lots,
            summary,
        })
    }

    /// Match a disposal under `method` and commit it.
    ///
    /// The commit carries the remaining quantities the match was computed
    /// against, so a racing writer surfaces as `StoreError::Conflict`.
    pub async fn dispose(
        &self,
        disposal: Disposal,
        method: TaxMethod,
    ) -> Result<Vec<RealizedGainFragment>, ServiceError> {
        let _guard = self.locks.lock(&disposal.user).await;

        let mut ledger = self.snapshot(&disposal.user, disposal.disposed_at).await?;
        let before: HashMap<LotId, Decimal> = ledger
            .lots()
            .iter()
            .map(|lot| (lot.id.clone(), lot.remaining_quantity))
            .collect();

        let fragments = DisposalMatcher::match_disposal(&mut ledger, &disposal, method)?;

        let mut lot_updates = Vec::with_capacity(fragments.len());
        for fragment in &fragments {
            let lot = ledger
                .get(&fragment.lot_id)
                .ok_or_else(|| LedgerError::UnknownLot(fragment.lot_id.clone()))?;
            let expected = before
                .get(&fragment.lot_id)
                .copied()
                .ok_or_else(|| LedgerError::UnknownLot(fragment.lot_id.clone()))?;
            lot_updates.push(LotUpdate {
                lot_id: lot.id.clone(),
                expected_remaining: expected,
                new_remaining: lot.remaining_quantity,
            });
        }

        let commit = DisposalCommit {
            disposal,
            fragments,
            lot_updates,
        };
        self.store.commit_disposal(&commit).await?;
        Ok(commit.fragments)
    }

    /// Dry-run a disposal. With no method, plans under every method.
    pub async fn preview(
        &self,
        disposal: &Disposal,
        method: Option<TaxMethod>,
    ) -> Result<Vec<MatchPlan>, ServiceError> {
        let ledger = self.snapshot(&disposal.user, disposal.disposed_at).await?;
        let plans = match method {
            Some(method) => vec![DisposalMatcher::plan(&ledger, disposal, method)?],
            None => DisposalMatcher::compare_methods(&ledger, disposal)?,
        };
        Ok(plans)
    }

    pub async fn fragments(
        &self,
        user: &UserId,
        from: Option<TimeMs>,
        to: Option<TimeMs>,
    ) -> Result<Vec<RealizedGainFragment>, ServiceError> {
        Ok(self.store.load_fragments(user, from, to).await?)
    }

    pub async fn disposals(&self, user: &UserId) -> Result<Vec<Disposal>, ServiceError> {
        Ok(self.store.load_disposals(user).await?)
    }

    pub async fn estimate_liability(
        &self,
        user: &UserId,
        from: Option<TimeMs>,
        to: Option<TimeMs>,
        rates: &TaxRates,
        options: EstimateOptions,
    ) -> Result<TaxLiability, ServiceError> {
        let fragments = self.store.load_fragments(user, from, to).await?;
        Ok(liability::estimate(&fragments, rates, options)?)
    }

    /// Parse a CSV export and replay it.
    pub async fn import_csv(
        &self,
        user: &UserId,
        csv_bytes: &[u8],
        method: TaxMethod,
    ) -> Result<ImportSummary, ServiceError> {
        let transactions = import::parse_transactions_csv(csv_bytes)?;
        self.import_transactions(user, transactions, method).await
    }

    /// Replay transactions chronologically through `add_lot` and `dispose`.
    ///
    /// Each row commits on its own. The first failing row stops the import and
    /// is reported with its line number.
    pub async fn import_transactions(
        &self,
        user: &UserId,
        mut transactions: Vec<ImportedTransaction>,
        method: TaxMethod,
    ) -> Result<ImportSummary, ServiceError> {
        import::sort_for_replay(&mut transactions);

        let mut summary = ImportSummary::default();
        for tx in transactions {
            let line = tx.line;
            let step = match tx.kind {
                TransactionKind::Buy => {
                    let id = tx.external_id.map(LotId::new).unwrap_or_else(LotId::generate);
                    let lot = Lot::new(id, user.clone(), tx.quantity, tx.price, tx.timestamp);
                    self.add_lot(lot).await.map(|_| summary.lots_added += 1)
                }
                TransactionKind::Sell => {
                    let id = tx
                        .external_id
                        .map(DisposalId::new)
                        .unwrap_or_else(DisposalId::generate);
                    let disposal =
                        Disposal::new(id, user.clone(), tx.quantity, tx.price, tx.timestamp);
                    self.dispose(disposal, method).await.and_then(|fragments| {
                        summary.disposals_matched += 1;
                        summary.fragments_created += fragments.len();
                        let gain = Decimal::checked_sum(fragments.iter().map(|f| f.gain));
                        summary.realized_gain = gain
                            .and_then(|gain| summary.realized_gain.checked_add(gain))
                            .ok_or_else(|| LedgerError::Overflow("import realized gain".into()))?;
                        Ok(())
                    })
                }
                TransactionKind::Transfer => {
                    warn!(user = %user, line, "transfer row skipped, no basis effect");
                    summary.transfers_skipped += 1;
                    Ok(())
                }
            };
            step.map_err(|source| ServiceError::ImportRow {
                line,
                source: Box::new(source),
            })?;
        }

        info!(
            user = %user,
            method = %method,
            lots_added = summary.lots_added,
            disposals_matched = summary.disposals_matched,
            transfers_skipped = summary.transfers_skipped,
            "import finished"
        );
        Ok(summary)
    }

    async fn snapshot(&self, user: &UserId, as_of: TimeMs) -> Result<LotLedger, ServiceError> {
        let lots = self.store.load_open_lots(user, as_of).await?;
        Ok(LotLedger::from_lots(user.clone(), lots)?)
    }
}
