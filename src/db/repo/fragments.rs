//! Disposal and realized-gain fragment operations for the repository.

use crate::domain::{
    Disposal, DisposalId, LotId, RealizedGainFragment, TaxMethod, Term, TimeMs, UserId,
};
use crate::store::{DisposalCommit, StoreError};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use tracing::info;

use super::lots::compare_and_set_remaining;
use super::{map_unique, parse_decimal, Repository};

impl Repository {
    /// Insert fragments in one transaction, skipping ids already stored.
    pub(super) async fn insert_fragments_batch(
        &self,
        fragments: &[RealizedGainFragment],
    ) -> Result<usize, StoreError> {
        if fragments.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0usize;
        for fragment in fragments {
            if insert_fragment(&mut tx, fragment).await? {
                inserted += 1;
            }
        }
        tx.commit().await?;
        Ok(inserted)
    }

    /// Write the disposal, every lot CAS, and every fragment in one transaction.
    ///
    /// Any failed CAS aborts the transaction, so the store never holds fragments
    /// for a disposal whose lot updates did not land.
    pub(super) async fn commit_disposal_atomic(
        &self,
        commit: &DisposalCommit,
    ) -> Result<(), StoreError> {
        let disposal = &commit.disposal;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO disposals (
                id, user, quantity, proceeds_per_unit, disposed_at_ms, created_at_ms
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(disposal.id.as_str())
        .bind(disposal.user.as_str())
        .bind(disposal.quantity.to_canonical_string())
        .bind(disposal.proceeds_per_unit.to_canonical_string())
        .bind(disposal.disposed_at.as_ms())
        .bind(TimeMs::now().as_ms())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique(e, format!("disposal {}", disposal.id)))?;

        for update in &commit.lot_updates {
            compare_and_set_remaining(
                &mut tx,
                &update.lot_id,
                update.expected_remaining,
                update.new_remaining,
            )
            .await?;
        }

        for fragment in &commit.fragments {
            insert_fragment(&mut tx, fragment).await?;
        }

        tx.commit().await?;

        info!(
            user = %disposal.user,
            disposal_id = %disposal.id,
            fragments = commit.fragments.len(),
            lots_updated = commit.lot_updates.len(),
            "disposal committed"
        );
        Ok(())
    }

    pub(super) async fn query_fragments(
        &self,
        user: &UserId,
        from: Option<TimeMs>,
        to: Option<TimeMs>,
    ) -> Result<Vec<RealizedGainFragment>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user, lot_id, disposal_id, method, quantity_matched, cost_basis,
                   proceeds, gain, acquired_at_ms, disposed_at_ms, holding_period_days, term
            FROM realized_fragments
            WHERE user = ? AND disposed_at_ms >= ? AND disposed_at_ms <= ?
            ORDER BY disposed_at_ms ASC, rowid ASC
            "#,
        )
        .bind(user.as_str())
        .bind(from.map(|t| t.as_ms()).unwrap_or(i64::MIN))
        .bind(to.map(|t| t.as_ms()).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(fragment_from_row).collect()
    }

    pub(super) async fn query_disposals(&self, user: &UserId) -> Result<Vec<Disposal>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user, quantity, proceeds_per_unit, disposed_at_ms
            FROM disposals
            WHERE user = ?
            ORDER BY disposed_at_ms ASC, rowid ASC
            "#,
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let quantity: String = row.try_get("quantity")?;
                let proceeds: String = row.try_get("proceeds_per_unit")?;
                Ok(Disposal {
                    id: DisposalId::new(row.try_get::<String, _>("id")?),
                    user: UserId::new(row.try_get::<String, _>("user")?),
                    quantity: parse_decimal("quantity", &quantity)?,
                    proceeds_per_unit: parse_decimal("proceeds_per_unit", &proceeds)?,
                    disposed_at: TimeMs::new(row.try_get("disposed_at_ms")?),
                })
            })
            .collect()
    }
}

/// Returns true if the row was new.
async fn insert_fragment(
    conn: &mut SqliteConnection,
    fragment: &RealizedGainFragment,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO realized_fragments (
            id, user, lot_id, disposal_id, method, quantity_matched, cost_basis,
            proceeds, gain, acquired_at_ms, disposed_at_ms, holding_period_days, term
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO NOTHING
        "#,
    )
    .bind(fragment.id.as_str())
    .bind(fragment.user.as_str())
    .bind(fragment.lot_id.as_str())
    .bind(fragment.disposal_id.as_str())
    .bind(fragment.method.as_str())
    .bind(fragment.quantity_matched.to_canonical_string())
    .bind(fragment.cost_basis.to_canonical_string())
    .bind(fragment.proceeds.to_canonical_string())
    .bind(fragment.gain.to_canonical_string())
    .bind(fragment.acquired_at.as_ms())
    .bind(fragment.disposed_at.as_ms())
    .bind(fragment.holding_period_days)
    .bind(fragment.term.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

fn fragment_from_row(row: &SqliteRow) -> Result<RealizedGainFragment, StoreError> {
    let method: String = row.try_get("method")?;
    let term: String = row.try_get("term")?;
    let quantity: String = row.try_get("quantity_matched")?;
    let cost_basis: String = row.try_get("cost_basis")?;
    let proceeds: String = row.try_get("proceeds")?;
    let gain: String = row.try_get("gain")?;

    Ok(RealizedGainFragment {
        id: row.try_get("id")?,
        user: UserId::new(row.try_get::<String, _>("user")?),
        lot_id: LotId::new(row.try_get::<String, _>("lot_id")?),
        disposal_id: DisposalId::new(row.try_get::<String, _>("disposal_id")?),
        method: method
            .parse::<TaxMethod>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        quantity_matched: parse_decimal("quantity_matched", &quantity)?,
        cost_basis: parse_decimal("cost_basis", &cost_basis)?,
        proceeds: parse_decimal("proceeds", &proceeds)?,
        gain: parse_decimal("gain", &gain)?,
        acquired_at: TimeMs::new(row.try_get("acquired_at_ms")?),
        disposed_at: TimeMs::new(row.try_get("disposed_at_ms")?),
        holding_period_days: row.try_get("holding_period_days")?,
        term: term.parse::<Term>().map_err(StoreError::Corrupt)?,
    })
}
