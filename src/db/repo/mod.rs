//! SQLite implementation of the lot repository.
//!
//! Methods are organized across submodules by record type:
//! - `lots.rs` - lot inserts, snapshots, and remaining-quantity CAS
//! - `fragments.rs` - disposals and realized-gain fragments
//!
//! Decimals are stored as canonical strings so the compare-and-swap on
//! `remaining_quantity` is an exact text comparison.

mod fragments;
mod lots;

use crate::domain::{Decimal, Disposal, Lot, LotId, RealizedGainFragment, TimeMs, UserId};
use crate::store::{DisposalCommit, LotRepository, StoreError};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use std::str::FromStr;

/// Repository for database operations.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn parse_decimal(column: &str, raw: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(raw)
        .map_err(|e| StoreError::Corrupt(format!("{} = {:?}: {}", column, raw, e)))
}

/// Map a unique-constraint failure to `Duplicate`, everything else to `Db`.
fn map_unique(err: sqlx::Error, what: String) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StoreError::Duplicate(what)
        }
        _ => StoreError::Db(err),
    }
}

#[async_trait]
impl LotRepository for Repository {
    async fn insert_lot(&self, lot: &Lot) -> Result<(), StoreError> {
        self.insert_lot_row(lot).await
    }

    async fn load_lots(&self, user: &UserId) -> Result<Vec<Lot>, StoreError> {
        self.query_lots(user, None).await
    }

    async fn load_open_lots(
        &self,
        user: &UserId,
        as_of: TimeMs,
    ) -> Result<Vec<Lot>, StoreError> {
        self.query_lots(user, Some(as_of)).await
    }

    async fn save_fragments(
        &self,
        fragments: &[RealizedGainFragment],
    ) -> Result<usize, StoreError> {
        self.insert_fragments_batch(fragments).await
    }

    async fn update_lot_remaining(
        &self,
        lot_id: &LotId,
        expected: Decimal,
        new_remaining: Decimal,
    ) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        lots::compare_and_set_remaining(&mut *conn, lot_id, expected, new_remaining).await
    }

    async fn commit_disposal(&self, commit: &DisposalCommit) -> Result<(), StoreError> {
        self.commit_disposal_atomic(commit).await
    }

    async fn load_fragments(
        &self,
        user: &UserId,
        from: Option<TimeMs>,
        to: Option<TimeMs>,
    ) -> Result<Vec<RealizedGainFragment>, StoreError> {
        self.query_fragments(user, from, to).await
    }

    async fn load_disposals(&self, user: &UserId) -> Result<Vec<Disposal>, StoreError> {
        self.query_disposals(user).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
