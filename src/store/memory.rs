//! In-process store for tests and local development.

use super::{DisposalCommit, LotRepository, StoreError};
use crate::domain::ordering::sort_lots_chronological;
use crate::domain::{Decimal, Disposal, Lot, LotId, RealizedGainFragment, TimeMs, UserId};
use async_trait::async_trait;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct MemoryState {
    lots: Vec<Lot>,
    disposals: Vec<Disposal>,
    fragments: Vec<RealizedGainFragment>,
}

impl MemoryState {
    fn lot_mut(&mut self, lot_id: &LotId) -> Option<&mut Lot> {
        self.lots.iter_mut().find(|lot| &lot.id == lot_id)
    }

    fn check_update(&self, lot_id: &LotId, expected: Decimal) -> Result<(), StoreError> {
        let lot = self
            .lots
            .iter()
            .find(|lot| &lot.id == lot_id)
            .ok_or_else(|| StoreError::NotFound(lot_id.clone()))?;
        if lot.remaining_quantity != expected {
            return Err(StoreError::Conflict(lot_id.clone()));
        }
        Ok(())
    }
}

/// Store backed by a lock-guarded set of vectors.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed lots directly, bypassing duplicate checks.
    pub fn with_lots(lots: Vec<Lot>) -> Self {
        Self {
            state: RwLock::new(MemoryState {
                lots,
                ..MemoryState::default()
            }),
        }
    }
}

#[async_trait]
impl LotRepository for MemoryStore {
    async fn insert_lot(&self, lot: &Lot) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.lots.iter().any(|existing| existing.id == lot.id) {
            return Err(StoreError::Duplicate(format!("lot {}", lot.id)));
        }
        state.lots.push(lot.clone());
        Ok(())
    }

    async fn load_lots(&self, user: &UserId) -> Result<Vec<Lot>, StoreError> {
        let state = self.state.read().await;
        let mut lots: Vec<Lot> = state
            .lots
            .iter()
            .filter(|lot| &lot.user == user)
            .cloned()
            .collect();
        sort_lots_chronological(&mut lots);
        Ok(lots)
    }

    async fn load_open_lots(
        &self,
        user: &UserId,
        as_of: TimeMs,
    ) -> Result<Vec<Lot>, StoreError> {
        let mut lots = self.load_lots(user).await?;
        lots.retain(|lot| lot.is_open() && lot.acquired_at <= as_of);
        Ok(lots)
    }

    async fn save_fragments(
        &self,
        fragments: &[RealizedGainFragment],
    ) -> Result<usize, StoreError> {
        let mut state = self.state.write().await;
        let mut inserted = 0;
        for fragment in fragments {
            if state.fragments.iter().any(|f| f.id == fragment.id) {
                continue;
            }
            state.fragments.push(fragment.clone());
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn update_lot_remaining(
        &self,
        lot_id: &LotId,
        expected: Decimal,
        new_remaining: Decimal,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.check_update(lot_id, expected)?;
        if let Some(lot) = state.lot_mut(lot_id) {
            lot.remaining_quantity = new_remaining;
        }
        Ok(())
    }

    async fn commit_disposal(&self, commit: &DisposalCommit) -> Result<(), StoreError> {
        let mut state = self.state.write().await;

        if state.disposals.iter().any(|d| d.id == commit.disposal.id) {
            return Err(StoreError::Duplicate(format!(
                "disposal {}",
                commit.disposal.id
            )));
        }
        for update in &commit.lot_updates {
            state.check_update(&update.lot_id, update.expected_remaining)?;
        }

        for update in &commit.lot_updates {
            if let Some(lot) = state.lot_mut(&update.lot_id) {
                lot.remaining_quantity = update.new_remaining;
            }
        }
        state.disposals.push(commit.disposal.clone());
        state.fragments.extend(commit.fragments.iter().cloned());
        Ok(())
    }

    async fn load_fragments(
        &self,
        user: &UserId,
        from: Option<TimeMs>,
        to: Option<TimeMs>,
    ) -> Result<Vec<RealizedGainFragment>, StoreError> {
        let state = self.state.read().await;
        let mut fragments: Vec<RealizedGainFragment> = state
            .fragments
            .iter()
            .filter(|f| &f.user == user)
            .filter(|f| from.map_or(true, |from| f.disposed_at >= from))
            .filter(|f| to.map_or(true, |to| f.disposed_at <= to))
            .cloned()
            .collect();
        fragments.sort_by_key(|f| f.disposed_at);
        Ok(fragments)
    }

    async fn load_disposals(&self, user: &UserId) -> Result<Vec<Disposal>, StoreError> {
        let state = self.state.read().await;
        let mut disposals: Vec<Disposal> = state
            .disposals
            .iter()
            .filter(|d| &d.user == user)
            .cloned()
            .collect();
        disposals.sort_by_key(|d| d.disposed_at);
        Ok(disposals)
    }
}
