//! Lot operations for the repository.

use crate::domain::{Decimal, Lot, LotId, TimeMs, UserId};
use crate::store::StoreError;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use tracing::warn;

use super::{map_unique, parse_decimal, Repository};

impl Repository {
    /// Insert a new lot row.
    ///
    /// # Errors
    /// `Duplicate` if a lot with the same id exists.
    pub(super) async fn insert_lot_row(&self, lot: &Lot) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO lots (
                id, user, quantity, cost_basis_per_unit, acquired_at_ms,
                remaining_quantity, created_at_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(lot.id.as_str())
        .bind(lot.user.as_str())
        .bind(lot.quantity.to_canonical_string())
        .bind(lot.cost_basis_per_unit.to_canonical_string())
        .bind(lot.acquired_at.as_ms())
        .bind(lot.remaining_quantity.to_canonical_string())
        .bind(TimeMs::now().as_ms())
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, format!("lot {}", lot.id)))?;

        Ok(())
    }

    /// Lots of a user ordered by acquisition time.
    ///
    /// With `open_as_of`, only lots acquired by then that still hold quantity.
    pub(super) async fn query_lots(
        &self,
        user: &UserId,
        open_as_of: Option<TimeMs>,
    ) -> Result<Vec<Lot>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user, quantity, cost_basis_per_unit, acquired_at_ms, remaining_quantity
            FROM lots
            WHERE user = ? AND acquired_at_ms <= ?
            ORDER BY acquired_at_ms ASC, id ASC
            "#,
        )
        .bind(user.as_str())
        .bind(open_as_of.map(|t| t.as_ms()).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let mut lots = rows
            .iter()
            .map(lot_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        if open_as_of.is_some() {
            lots.retain(Lot::is_open);
        }
        Ok(lots)
    }
}

fn lot_from_row(row: &SqliteRow) -> Result<Lot, StoreError> {
    let quantity: String = row.try_get("quantity")?;
    let cost: String = row.try_get("cost_basis_per_unit")?;
    let remaining: String = row.try_get("remaining_quantity")?;

    Ok(Lot {
        id: LotId::new(row.try_get::<String, _>("id")?),
        user: UserId::new(row.try_get::<String, _>("user")?),
        quantity: parse_decimal("quantity", &quantity)?,
        cost_basis_per_unit: parse_decimal("cost_basis_per_unit", &cost)?,
        acquired_at: TimeMs::new(row.try_get("acquired_at_ms")?),
        remaining_quantity: parse_decimal("remaining_quantity", &remaining)?,
    })
}

/// Set `remaining_quantity` only if the stored value still equals `expected`.
///
/// Runs on whatever connection it is given so it can join an open transaction.
pub(super) async fn compare_and_set_remaining(
    conn: &mut SqliteConnection,
    lot_id: &LotId,
    expected: Decimal,
    new_remaining: Decimal,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE lots
        SET remaining_quantity = ?
        WHERE id = ? AND remaining_quantity = ?
        "#,
    )
    .bind(new_remaining.to_canonical_string())
    .bind(lot_id.as_str())
    .bind(expected.to_canonical_string())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 1 {
        return Ok(());
    }

    let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM lots WHERE id = ?")
        .bind(lot_id.as_str())
        .fetch_optional(&mut *conn)
        .await?;

    match exists {
        Some(_) => {
            warn!(
                lot_id = %lot_id,
                expected = %expected,
                "lot remaining quantity changed underneath match"
            );
            Err(StoreError::Conflict(lot_id.clone()))
        }
        None => Err(StoreError::NotFound(lot_id.clone())),
    }
}
