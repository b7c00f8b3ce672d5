//! Persistence seam for lots, disposals and realized-gain fragments.
//!
//! The engine never talks to storage directly. The service loads a snapshot
//! through `LotRepository`, matches in memory, and hands the result back as one
//! `DisposalCommit`.

use crate::domain::{Decimal, Disposal, Lot, LotId, RealizedGainFragment, TimeMs, UserId};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

pub mod memory;

pub use memory::MemoryStore;

/// Compare-and-swap of one lot's remaining quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotUpdate {
    pub lot_id: LotId,
    /// Remaining quantity the match was computed against.
    pub expected_remaining: Decimal,
    pub new_remaining: Decimal,
}

/// Everything one matched disposal writes, applied in a single transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisposalCommit {
    pub disposal: Disposal,
    pub fragments: Vec<RealizedGainFragment>,
    pub lot_updates: Vec<LotUpdate>,
}

/// Repository interface over the relational store.
///
/// Implementations must make `commit_disposal` atomic and must reject a
/// `LotUpdate` whose `expected_remaining` no longer matches the stored value.
#[async_trait]
pub trait LotRepository: Send + Sync + fmt::Debug {
    /// Insert a new lot. Fails with `Duplicate` if the id already exists.
    async fn insert_lot(&self, lot: &Lot) -> Result<(), StoreError>;

    /// Every lot of a user, consumed ones included, ordered by acquisition time.
    async fn load_lots(&self, user: &UserId) -> Result<Vec<Lot>, StoreError>;

    /// Lots with remaining quantity acquired at or before `as_of`, oldest first.
    async fn load_open_lots(&self, user: &UserId, as_of: TimeMs)
        -> Result<Vec<Lot>, StoreError>;

    /// Persist fragments idempotently; returns how many were new.
    async fn save_fragments(&self, fragments: &[RealizedGainFragment])
        -> Result<usize, StoreError>;

    /// Set a lot's remaining quantity if it still equals `expected`.
    async fn update_lot_remaining(
        &self,
        lot_id: &LotId,
        expected: Decimal,
        new_remaining: Decimal,
    ) -> Result<(), StoreError>;

    /// Record a disposal with its fragments and lot updates atomically.
    async fn commit_disposal(&self, commit: &DisposalCommit) -> Result<(), StoreError>;

    /// Fragments of a user whose disposal falls in `[from, to]`, in disposal order.
    async fn load_fragments(
        &self,
        user: &UserId,
        from: Option<TimeMs>,
        to: Option<TimeMs>,
    ) -> Result<Vec<RealizedGainFragment>, StoreError>;

    async fn load_disposals(&self, user: &UserId) -> Result<Vec<Disposal>, StoreError>;

    /// Cheap reachability check for readiness probes.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("lot {0} was modified concurrently")]
    Conflict(LotId),
    #[error("lot not found: {0}")]
    NotFound(LotId),
    #[error("duplicate record: {0}")]
    Duplicate(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}
