//! The inventory ledger: conditional atomic reservation in Postgres.

use crate::{backend, column_u32, column_u32_opt, param_i32, PgStore};
use async_trait::async_trait;
use formgate_core::inventory::{InventoryItem, ProvisionItem, ReservationLine};
use formgate_core::store::{InventoryKey, InventoryLedger, LimitError, ReserveError, StoreError};
use formgate_core::types::{ChoiceId, OfferingId, StepId};
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct InventoryRow {
    offering_id: Uuid,
    step_id: String,
    choice_id: String,
    label: String,
    price: i64,
    total_ordered: i32,
    stock_limit: Option<i32>,
}

impl InventoryRow {
    fn into_item(self) -> Result<InventoryItem, StoreError> {
        Ok(InventoryItem {
            offering_id: OfferingId::from_uuid(self.offering_id),
            step_id: StepId::new(self.step_id),
            choice_id: ChoiceId::new(self.choice_id),
            label: self.label,
            price: self.price,
            total_ordered: column_u32(self.total_ordered)?,
            stock_limit: column_u32_opt(self.stock_limit)?,
        })
    }
}

#[async_trait]
impl InventoryLedger for PgStore {
    async fn provision(
        &self,
        offering_id: OfferingId,
        items: &[ProvisionItem],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool().begin().await.map_err(backend)?;
        for item in items {
            // Existing rows keep their counters and admin-edited limits.
            sqlx::query(
                r"
                INSERT INTO inventory_items
                    (offering_id, step_id, choice_id, label, price, total_ordered, stock_limit)
                VALUES ($1, $2, $3, $4, $5, 0, $6)
                ON CONFLICT (offering_id, step_id, choice_id) DO NOTHING
                ",
            )
            .bind(offering_id.as_uuid())
            .bind(item.step_id.as_str())
            .bind(item.choice_id.as_str())
            .bind(&item.label)
            .bind(item.price)
            .bind(item.stock_limit.map(param_i32).transpose()?)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }
        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn reserve(
        &self,
        offering_id: OfferingId,
        lines: &[ReservationLine],
    ) -> Result<(), ReserveError> {
        let mut tx = self.pool().begin().await.map_err(backend)?;

        for line in lines {
            // Self-heal rows missing after a template edit; unbounded until an
            // admin sets a limit.
            sqlx::query(
                r"
                INSERT INTO inventory_items
                    (offering_id, step_id, choice_id, label, price, total_ordered, stock_limit)
                VALUES ($1, $2, $3, $4, $5, 0, NULL)
                ON CONFLICT (offering_id, step_id, choice_id) DO NOTHING
                ",
            )
            .bind(offering_id.as_uuid())
            .bind(line.step_id.as_str())
            .bind(line.choice_id.as_str())
            .bind(&line.label)
            .bind(line.price)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

            // The increment and the limit check are one statement; the row
            // lock it takes serializes racing reservations.
            let quantity = param_i32(line.quantity)?;
            let updated = sqlx::query(
                r"
                UPDATE inventory_items
                SET total_ordered = total_ordered + $4
                WHERE offering_id = $1 AND step_id = $2 AND choice_id = $3
                  AND (stock_limit IS NULL OR total_ordered + $4 <= stock_limit)
                ",
            )
            .bind(offering_id.as_uuid())
            .bind(line.step_id.as_str())
            .bind(line.choice_id.as_str())
            .bind(quantity)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

            if updated.rows_affected() == 0 {
                let remaining: Option<i32> = sqlx::query_scalar(
                    r"
                    SELECT GREATEST(stock_limit - total_ordered, 0)
                    FROM inventory_items
                    WHERE offering_id = $1 AND step_id = $2 AND choice_id = $3
                    ",
                )
                .bind(offering_id.as_uuid())
                .bind(line.step_id.as_str())
                .bind(line.choice_id.as_str())
                .fetch_one(&mut *tx)
                .await
                .map_err(backend)?;

                // Dropping the transaction rolls back every earlier increment.
                tx.rollback().await.map_err(backend)?;
                return Err(ReserveError::Insufficient {
                    label: line.label.clone(),
                    remaining: column_u32_opt(remaining)?.unwrap_or(0),
                });
            }
        }

        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn set_limit(
        &self,
        key: &InventoryKey,
        new_limit: Option<u32>,
    ) -> Result<(), LimitError> {
        let limit = new_limit.map(param_i32).transpose()?;
        let updated = sqlx::query(
            r"
            UPDATE inventory_items
            SET stock_limit = $4
            WHERE offering_id = $1 AND step_id = $2 AND choice_id = $3
              AND ($4::INT IS NULL OR total_ordered <= $4)
            ",
        )
        .bind(key.offering_id.as_uuid())
        .bind(key.step_id.as_str())
        .bind(key.choice_id.as_str())
        .bind(limit)
        .execute(self.pool())
        .await
        .map_err(backend)?;

        if updated.rows_affected() == 0 {
            let total: Option<i32> = sqlx::query_scalar(
                r"
                SELECT total_ordered FROM inventory_items
                WHERE offering_id = $1 AND step_id = $2 AND choice_id = $3
                ",
            )
            .bind(key.offering_id.as_uuid())
            .bind(key.step_id.as_str())
            .bind(key.choice_id.as_str())
            .fetch_optional(self.pool())
            .await
            .map_err(backend)?;
            return match total {
                Some(total) => Err(LimitError::BelowOrdered {
                    total_ordered: column_u32(total)?,
                }),
                None => Err(LimitError::NotFound),
            };
        }
        Ok(())
    }

    async fn snapshot(&self, offering_id: OfferingId) -> Result<Vec<InventoryItem>, StoreError> {
        let rows = sqlx::query_as::<_, InventoryRow>(
            r"
            SELECT offering_id, step_id, choice_id, label, price, total_ordered, stock_limit
            FROM inventory_items
            WHERE offering_id = $1
            ORDER BY step_id, choice_id
            ",
        )
        .bind(offering_id.as_uuid())
        .fetch_all(self.pool())
        .await
        .map_err(backend)?;
        rows.into_iter().map(InventoryRow::into_item).collect()
    }
}
