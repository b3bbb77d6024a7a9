//! Stock Ledger
//!
//! 每次计数变更都在同一事务内追加一条 [`StockChangeLog`]。
//! 预留使用条件扣减 (`stock >= ?`)，并发下也不会出现负库存；
//! 恢复按订单重放日志净变化量，不依赖缓存的"已预留数量"。

use chrono_tz::Tz;
use shared::models::{
    InventoryRecord, StockAdjustKind, StockAdjustment, StockChangeLog, StockChangeReason,
};
use sqlx::SqlitePool;

use super::error::StockError;
use crate::db::repository::inventory;
use crate::utils::time::business_day_start;

/// CAS 重试次数 (手动调整)
const ADJUST_MAX_ATTEMPTS: usize = 3;

/// Result of a single-item reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved { previous: i64, new: i64 },
    /// Untracked (or unknown) items sell without limits, nothing was written
    NotTracked,
}

/// One counter moved by an order reservation or restore
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockMovement {
    pub store_id: i64,
    pub item_id: i64,
    pub quantity: i64,
    pub previous_stock: i64,
    pub new_stock: i64,
}

enum ReserveFailure {
    Decrement { item_id: i64, requested: i64 },
    DailyLimit { item_id: i64, remaining: i64 },
}

#[derive(Clone)]
pub struct StockLedger {
    pool: SqlitePool,
    tz: Tz,
}

impl StockLedger {
    pub fn new(pool: SqlitePool, tz: Tz) -> Self {
        Self { pool, tz }
    }

    /// Read-only feasibility check
    pub async fn check(&self, store_id: i64, item_id: i64, quantity: i64) -> Result<(), StockError> {
        if quantity <= 0 {
            return Err(StockError::Invalid(format!(
                "quantity must be positive, got {quantity}"
            )));
        }
        let Some(record) = inventory::find(&self.pool, store_id, item_id).await? else {
            return Ok(());
        };
        if !record.is_tracked {
            return Ok(());
        }
        let consumed_today = match record.daily_limit {
            Some(_) => Some(
                inventory::order_consumption_since(
                    &self.pool,
                    store_id,
                    item_id,
                    business_day_start(shared::util::now_millis(), self.tz),
                )
                .await?,
            ),
            None => None,
        };
        evaluate(&record, quantity, consumed_today)
    }

    /// Reserve one item for an order
    pub async fn reserve(
        &self,
        store_id: i64,
        item_id: i64,
        quantity: i64,
        order_id: i64,
    ) -> Result<ReserveOutcome, StockError> {
        let moved = self
            .reserve_many(store_id, &[(item_id, quantity)], order_id)
            .await?;
        Ok(match moved.first() {
            Some(m) => ReserveOutcome::Reserved {
                previous: m.previous_stock,
                new: m.new_stock,
            },
            None => ReserveOutcome::NotTracked,
        })
    }

    /// Reserve a whole plan in one transaction: all items or none.
    ///
    /// Untracked items are skipped and produce no log entry.
    pub async fn reserve_many(
        &self,
        store_id: i64,
        items: &[(i64, i64)],
        order_id: i64,
    ) -> Result<Vec<StockMovement>, StockError> {
        if let Some((item_id, qty)) = items.iter().find(|(_, q)| *q <= 0) {
            return Err(StockError::Invalid(format!(
                "quantity for item {item_id} must be positive, got {qty}"
            )));
        }

        let mut tracked = Vec::with_capacity(items.len());
        for &(item_id, qty) in items {
            match inventory::find(&self.pool, store_id, item_id).await? {
                Some(r) if r.is_tracked => tracked.push((item_id, qty, r.daily_limit)),
                _ => tracing::debug!(store_id, item_id, "Item not tracked, reservation skipped"),
            }
        }
        if tracked.is_empty() {
            return Ok(Vec::new());
        }

        let now = shared::util::now_millis();
        let day_start = business_day_start(now, self.tz);
        let mut moved = Vec::with_capacity(tracked.len());
        let mut failure = None;

        let mut tx = self.pool.begin().await?;
        for (item_id, qty, daily_limit) in tracked {
            let Some(new_stock) =
                inventory::try_decrement(&mut *tx, store_id, item_id, qty, now).await?
            else {
                failure = Some(ReserveFailure::Decrement {
                    item_id,
                    requested: qty,
                });
                break;
            };

            if let Some(limit) = daily_limit {
                let consumed =
                    inventory::order_consumption_since(&mut *tx, store_id, item_id, day_start)
                        .await?;
                if consumed + qty > limit {
                    failure = Some(ReserveFailure::DailyLimit {
                        item_id,
                        remaining: (limit - consumed).max(0),
                    });
                    break;
                }
            }

            let previous = new_stock + qty;
            inventory::append_log(
                &mut *tx,
                &log_entry(
                    store_id,
                    item_id,
                    previous,
                    new_stock,
                    StockChangeReason::OrderReserve,
                    Some(order_id),
                    None,
                    None,
                    now,
                ),
            )
            .await?;
            moved.push(StockMovement {
                store_id,
                item_id,
                quantity: qty,
                previous_stock: previous,
                new_stock,
            });
        }

        if let Some(failure) = failure {
            tx.rollback().await?;
            return Err(match failure {
                ReserveFailure::DailyLimit { item_id, remaining } => {
                    StockError::DailyLimitReached { item_id, remaining }
                }
                ReserveFailure::Decrement { item_id, requested } => {
                    self.diagnose(store_id, item_id, requested).await
                }
            });
        }
        tx.commit().await?;

        tracing::debug!(order_id, store_id, items = moved.len(), "Stock reserved");
        Ok(moved)
    }

    /// Return every outstanding reservation of an order, replayed from the log.
    ///
    /// Idempotent: a second call finds a zero net delta and does nothing.
    pub async fn restore(&self, order_id: i64) -> Result<Vec<StockMovement>, StockError> {
        let now = shared::util::now_millis();
        let mut restored = Vec::new();

        let mut tx = self.pool.begin().await?;
        let deltas = inventory::net_order_deltas(&mut *tx, order_id).await?;
        for (store_id, item_id, net) in deltas {
            if net >= 0 {
                continue;
            }
            let qty = -net;
            let Some(new_stock) = inventory::increment(&mut *tx, store_id, item_id, qty, now).await?
            else {
                tracing::warn!(order_id, store_id, item_id, "Inventory record gone, restore skipped");
                continue;
            };
            let previous = new_stock - qty;
            inventory::append_log(
                &mut *tx,
                &log_entry(
                    store_id,
                    item_id,
                    previous,
                    new_stock,
                    StockChangeReason::OrderRestore,
                    Some(order_id),
                    None,
                    None,
                    now,
                ),
            )
            .await?;
            restored.push(StockMovement {
                store_id,
                item_id,
                quantity: qty,
                previous_stock: previous,
                new_stock,
            });
        }
        tx.commit().await?;

        if !restored.is_empty() {
            tracing::info!(order_id, items = restored.len(), "Stock restored");
        }
        Ok(restored)
    }

    /// Manual add / subtract / damage / allocate. A reason is mandatory.
    pub async fn adjust(
        &self,
        store_id: i64,
        item_id: i64,
        adjustment: &StockAdjustment,
    ) -> Result<InventoryRecord, StockError> {
        if adjustment.reason.trim().is_empty() {
            return Err(StockError::Invalid("adjustment reason is required".into()));
        }
        if adjustment.quantity <= 0 {
            return Err(StockError::Invalid(format!(
                "quantity must be positive, got {}",
                adjustment.quantity
            )));
        }

        for _ in 0..ADJUST_MAX_ATTEMPTS {
            let record = inventory::find(&self.pool, store_id, item_id)
                .await?
                .ok_or(StockError::NotFound { store_id, item_id })?;
            let (stock, warehouse) = apply_adjustment(&record, adjustment)?;

            let now = shared::util::now_millis();
            let mut tx = self.pool.begin().await?;
            if !inventory::set_counters(&mut *tx, &record, stock, warehouse, now).await? {
                tx.rollback().await?;
                continue;
            }
            let note = match (record.warehouse_stock, warehouse) {
                (Some(before), Some(after)) if before != after => {
                    format!("{} (warehouse {before} → {after})", adjustment.reason)
                }
                _ => adjustment.reason.clone(),
            };
            inventory::append_log(
                &mut *tx,
                &log_entry(
                    store_id,
                    item_id,
                    record.stock,
                    stock,
                    adjustment.kind.reason(),
                    None,
                    Some(note),
                    adjustment.operator.clone(),
                    now,
                ),
            )
            .await?;
            tx.commit().await?;

            tracing::info!(
                store_id,
                item_id,
                kind = ?adjustment.kind,
                quantity = adjustment.quantity,
                stock,
                "Stock adjusted"
            );
            return inventory::find(&self.pool, store_id, item_id)
                .await?
                .ok_or(StockError::NotFound { store_id, item_id });
        }

        Err(StockError::Conflict { item_id })
    }

    pub async fn set_sold_out(
        &self,
        store_id: i64,
        item_id: i64,
        sold_out: bool,
    ) -> Result<(), StockError> {
        let now = shared::util::now_millis();
        if !inventory::set_sold_out(&self.pool, store_id, item_id, sold_out, now).await? {
            return Err(StockError::NotFound { store_id, item_id });
        }
        tracing::info!(store_id, item_id, sold_out, "Sold-out flag changed");
        Ok(())
    }

    pub async fn log_for_item(
        &self,
        store_id: i64,
        item_id: i64,
        limit: i64,
    ) -> Result<Vec<StockChangeLog>, StockError> {
        Ok(inventory::log_for_item(&self.pool, store_id, item_id, limit.clamp(1, 1000)).await?)
    }

    pub async fn log_for_order(&self, order_id: i64) -> Result<Vec<StockChangeLog>, StockError> {
        Ok(inventory::log_for_order(&self.pool, order_id).await?)
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Explain why a conditional decrement matched no row
    async fn diagnose(&self, store_id: i64, item_id: i64, requested: i64) -> StockError {
        match inventory::find(&self.pool, store_id, item_id).await {
            Ok(None) => StockError::NotFound { store_id, item_id },
            Ok(Some(r)) if r.is_sold_out => StockError::SoldOut { item_id },
            Ok(Some(r)) if r.stock < requested => StockError::InsufficientStock {
                item_id,
                available: r.stock,
                requested,
            },
            Ok(Some(_)) => StockError::Conflict { item_id },
            Err(e) => e.into(),
        }
    }
}

/// Feasibility of `quantity` against a tracked record
fn evaluate(
    record: &InventoryRecord,
    quantity: i64,
    consumed_today: Option<i64>,
) -> Result<(), StockError> {
    if record.is_sold_out {
        return Err(StockError::SoldOut {
            item_id: record.item_id,
        });
    }
    if record.stock < quantity {
        return Err(StockError::InsufficientStock {
            item_id: record.item_id,
            available: record.stock,
            requested: quantity,
        });
    }
    if let (Some(limit), Some(consumed)) = (record.daily_limit, consumed_today) {
        let remaining = (limit - consumed).max(0);
        if quantity > remaining {
            return Err(StockError::DailyLimitReached {
                item_id: record.item_id,
                remaining,
            });
        }
    }
    Ok(())
}

/// New (sellable, warehouse) counters after a manual adjustment
fn apply_adjustment(
    record: &InventoryRecord,
    adjustment: &StockAdjustment,
) -> Result<(i64, Option<i64>), StockError> {
    let q = adjustment.quantity;
    let item_id = record.item_id;
    match (adjustment.kind, record.warehouse_stock) {
        (StockAdjustKind::Add, Some(w)) => Ok((record.stock, Some(w + q))),
        (StockAdjustKind::Add, None) => Ok((record.stock + q, None)),
        (StockAdjustKind::Subtract | StockAdjustKind::Damage, Some(w)) => {
            if w < q {
                return Err(StockError::InsufficientStock {
                    item_id,
                    available: w,
                    requested: q,
                });
            }
            let w = w - q;
            Ok((record.stock.min(w), Some(w)))
        }
        (StockAdjustKind::Subtract | StockAdjustKind::Damage, None) => {
            if record.stock < q {
                return Err(StockError::InsufficientStock {
                    item_id,
                    available: record.stock,
                    requested: q,
                });
            }
            Ok((record.stock - q, None))
        }
        (StockAdjustKind::Allocate, Some(w)) => {
            let available = w - record.stock;
            if q > available {
                return Err(StockError::WarehouseExceeded { item_id, available });
            }
            Ok((record.stock + q, Some(w)))
        }
        (StockAdjustKind::Allocate, None) => Err(StockError::Invalid(
            "item has no warehouse stock to allocate from".into(),
        )),
    }
}

#[allow(clippy::too_many_arguments)]
fn log_entry(
    store_id: i64,
    item_id: i64,
    previous: i64,
    new: i64,
    reason: StockChangeReason,
    order_id: Option<i64>,
    note: Option<String>,
    operator: Option<String>,
    now: i64,
) -> StockChangeLog {
    StockChangeLog {
        id: shared::util::snowflake_id(),
        store_id,
        item_id,
        previous_stock: previous,
        new_stock: new,
        delta: new - previous,
        reason,
        order_id,
        note,
        operator,
        created_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(stock: i64, warehouse: Option<i64>) -> InventoryRecord {
        InventoryRecord {
            id: 1,
            store_id: 10,
            item_id: 100,
            is_tracked: true,
            is_sold_out: false,
            stock,
            warehouse_stock: warehouse,
            daily_limit: None,
            updated_at: 0,
        }
    }

    fn adj(kind: StockAdjustKind, quantity: i64) -> StockAdjustment {
        StockAdjustment {
            kind,
            quantity,
            reason: "count".into(),
            operator: None,
        }
    }

    #[test]
    fn test_evaluate_sold_out_beats_counter() {
        let mut r = record(50, None);
        r.is_sold_out = true;
        assert!(matches!(
            evaluate(&r, 1, None),
            Err(StockError::SoldOut { item_id: 100 })
        ));
    }

    #[test]
    fn test_evaluate_insufficient_reports_available() {
        let r = record(3, None);
        let err = evaluate(&r, 5, None).unwrap_err();
        assert_eq!(err.to_string(), "only 3 left");
        assert!(evaluate(&r, 3, None).is_ok());
    }

    #[test]
    fn test_evaluate_daily_limit() {
        let mut r = record(100, None);
        r.daily_limit = Some(10);
        assert!(evaluate(&r, 2, Some(8)).is_ok());
        assert!(matches!(
            evaluate(&r, 3, Some(8)),
            Err(StockError::DailyLimitReached { remaining: 2, .. })
        ));
    }

    #[test]
    fn test_adjust_single_counter() {
        let r = record(5, None);
        assert_eq!(apply_adjustment(&r, &adj(StockAdjustKind::Add, 3)).unwrap(), (8, None));
        assert_eq!(
            apply_adjustment(&r, &adj(StockAdjustKind::Damage, 5)).unwrap(),
            (0, None)
        );
        assert!(apply_adjustment(&r, &adj(StockAdjustKind::Subtract, 6)).is_err());
        assert!(matches!(
            apply_adjustment(&r, &adj(StockAdjustKind::Allocate, 1)),
            Err(StockError::Invalid(_))
        ));
    }

    #[test]
    fn test_adjust_two_counters() {
        // sellable 4 of warehouse 10
        let r = record(4, Some(10));
        assert_eq!(
            apply_adjustment(&r, &adj(StockAdjustKind::Add, 5)).unwrap(),
            (4, Some(15))
        );
        assert_eq!(
            apply_adjustment(&r, &adj(StockAdjustKind::Allocate, 6)).unwrap(),
            (10, Some(10))
        );
        assert!(matches!(
            apply_adjustment(&r, &adj(StockAdjustKind::Allocate, 7)),
            Err(StockError::WarehouseExceeded { available: 6, .. })
        ));
        // damage below the sellable level drags sellable down with it
        assert_eq!(
            apply_adjustment(&r, &adj(StockAdjustKind::Damage, 8)).unwrap(),
            (2, Some(2))
        );
    }
}
