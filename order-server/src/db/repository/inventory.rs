//! Inventory Repository
//!
//! Counter rows plus the append-only change log. Counter writes are
//! conditional (`WHERE stock >= ?`) so the `stock >= 0` invariant is held by
//! the storage layer itself, not by a read-then-write in the caller.

use super::RepoResult;
use shared::models::{InventoryRecord, StockChangeLog, StockChangeReason};
use sqlx::{SqliteExecutor, SqlitePool};

const RECORD_SELECT: &str = "SELECT id, store_id, item_id, is_tracked, is_sold_out, stock, warehouse_stock, daily_limit, updated_at FROM inventory_record";
const LOG_SELECT: &str = "SELECT id, store_id, item_id, previous_stock, new_stock, delta, reason, order_id, note, operator, created_at FROM stock_change_log";

pub async fn find<'e>(
    exec: impl SqliteExecutor<'e>,
    store_id: i64,
    item_id: i64,
) -> RepoResult<Option<InventoryRecord>> {
    let sql = format!("{RECORD_SELECT} WHERE store_id = ? AND item_id = ?");
    let row = sqlx::query_as::<_, InventoryRecord>(&sql)
        .bind(store_id)
        .bind(item_id)
        .fetch_optional(exec)
        .await?;
    Ok(row)
}

pub async fn find_by_store(pool: &SqlitePool, store_id: i64) -> RepoResult<Vec<InventoryRecord>> {
    let sql = format!("{RECORD_SELECT} WHERE store_id = ? ORDER BY item_id");
    let rows = sqlx::query_as::<_, InventoryRecord>(&sql)
        .bind(store_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn create(pool: &SqlitePool, record: &InventoryRecord) -> RepoResult<InventoryRecord> {
    sqlx::query(
        "INSERT INTO inventory_record (id, store_id, item_id, is_tracked, is_sold_out, stock, warehouse_stock, daily_limit, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )
    .bind(record.id)
    .bind(record.store_id)
    .bind(record.item_id)
    .bind(record.is_tracked)
    .bind(record.is_sold_out)
    .bind(record.stock)
    .bind(record.warehouse_stock)
    .bind(record.daily_limit)
    .bind(record.updated_at)
    .execute(pool)
    .await?;
    Ok(record.clone())
}

/// Conditional decrement of both counters.
///
/// Returns the new sellable stock, or `None` when the row is missing, sold
/// out, or holds less than `quantity`.
pub async fn try_decrement<'e>(
    exec: impl SqliteExecutor<'e>,
    store_id: i64,
    item_id: i64,
    quantity: i64,
    now: i64,
) -> RepoResult<Option<i64>> {
    let new_stock: Option<i64> = sqlx::query_scalar(
        "UPDATE inventory_record SET stock = stock - ?1, warehouse_stock = CASE WHEN warehouse_stock IS NULL THEN NULL ELSE warehouse_stock - ?1 END, updated_at = ?2 WHERE store_id = ?3 AND item_id = ?4 AND is_sold_out = 0 AND stock >= ?1 RETURNING stock",
    )
    .bind(quantity)
    .bind(now)
    .bind(store_id)
    .bind(item_id)
    .fetch_optional(exec)
    .await?;
    Ok(new_stock)
}

/// Increment both counters (order restore). Returns the new sellable stock.
pub async fn increment<'e>(
    exec: impl SqliteExecutor<'e>,
    store_id: i64,
    item_id: i64,
    quantity: i64,
    now: i64,
) -> RepoResult<Option<i64>> {
    let new_stock: Option<i64> = sqlx::query_scalar(
        "UPDATE inventory_record SET stock = stock + ?1, warehouse_stock = CASE WHEN warehouse_stock IS NULL THEN NULL ELSE warehouse_stock + ?1 END, updated_at = ?2 WHERE store_id = ?3 AND item_id = ?4 RETURNING stock",
    )
    .bind(quantity)
    .bind(now)
    .bind(store_id)
    .bind(item_id)
    .fetch_optional(exec)
    .await?;
    Ok(new_stock)
}

/// Overwrite both counters (manual adjustments, computed by the ledger)
///
/// Guarded by the previously read values so a concurrent writer makes this
/// a no-op (returns false) instead of a lost update.
pub async fn set_counters<'e>(
    exec: impl SqliteExecutor<'e>,
    record: &InventoryRecord,
    stock: i64,
    warehouse_stock: Option<i64>,
    now: i64,
) -> RepoResult<bool> {
    let result = sqlx::query(
        "UPDATE inventory_record SET stock = ?1, warehouse_stock = ?2, updated_at = ?3 WHERE id = ?4 AND stock = ?5 AND warehouse_stock IS ?6",
    )
    .bind(stock)
    .bind(warehouse_stock)
    .bind(now)
    .bind(record.id)
    .bind(record.stock)
    .bind(record.warehouse_stock)
    .execute(exec)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn set_sold_out(
    pool: &SqlitePool,
    store_id: i64,
    item_id: i64,
    sold_out: bool,
    now: i64,
) -> RepoResult<bool> {
    let result = sqlx::query(
        "UPDATE inventory_record SET is_sold_out = ?1, updated_at = ?2 WHERE store_id = ?3 AND item_id = ?4",
    )
    .bind(sold_out)
    .bind(now)
    .bind(store_id)
    .bind(item_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn append_log<'e>(exec: impl SqliteExecutor<'e>, log: &StockChangeLog) -> RepoResult<()> {
    sqlx::query(
        "INSERT INTO stock_change_log (id, store_id, item_id, previous_stock, new_stock, delta, reason, order_id, note, operator, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    )
    .bind(log.id)
    .bind(log.store_id)
    .bind(log.item_id)
    .bind(log.previous_stock)
    .bind(log.new_stock)
    .bind(log.delta)
    .bind(log.reason)
    .bind(log.order_id)
    .bind(&log.note)
    .bind(&log.operator)
    .bind(log.created_at)
    .execute(exec)
    .await?;
    Ok(())
}

/// Units taken by orders reserved since `since`
///
/// Restores only count against reservations made in the same window: an
/// order reserved on an earlier business day and cancelled today does not
/// give today's allowance back.
pub async fn order_consumption_since<'e>(
    exec: impl SqliteExecutor<'e>,
    store_id: i64,
    item_id: i64,
    since: i64,
) -> RepoResult<i64> {
    let net: i64 = sqlx::query_scalar(
        "SELECT COALESCE(-SUM(l.delta), 0) FROM stock_change_log l WHERE l.store_id = ?1 AND l.item_id = ?2 AND l.created_at >= ?5 AND (l.reason = ?3 OR (l.reason = ?4 AND EXISTS (SELECT 1 FROM stock_change_log r WHERE r.order_id = l.order_id AND r.store_id = l.store_id AND r.item_id = l.item_id AND r.reason = ?3 AND r.created_at >= ?5)))",
    )
    .bind(store_id)
    .bind(item_id)
    .bind(StockChangeReason::OrderReserve)
    .bind(StockChangeReason::OrderRestore)
    .bind(since)
    .fetch_one(exec)
    .await?;
    Ok(net)
}

/// Per-item net order delta for one order (negative = still reserved)
pub async fn net_order_deltas<'e>(
    exec: impl SqliteExecutor<'e>,
    order_id: i64,
) -> RepoResult<Vec<(i64, i64, i64)>> {
    let rows: Vec<(i64, i64, i64)> = sqlx::query_as(
        "SELECT store_id, item_id, SUM(delta) FROM stock_change_log WHERE order_id = ?1 AND reason IN (?2, ?3) GROUP BY store_id, item_id ORDER BY item_id",
    )
    .bind(order_id)
    .bind(StockChangeReason::OrderReserve)
    .bind(StockChangeReason::OrderRestore)
    .fetch_all(exec)
    .await?;
    Ok(rows)
}

/// Per-item order consumption for a store since `since`
pub async fn consumption_by_item(
    pool: &SqlitePool,
    store_id: i64,
    since: i64,
) -> RepoResult<Vec<(i64, i64)>> {
    let rows: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT item_id, -SUM(delta) FROM stock_change_log WHERE store_id = ?1 AND reason IN (?2, ?3) AND created_at >= ?4 GROUP BY item_id ORDER BY item_id",
    )
    .bind(store_id)
    .bind(StockChangeReason::OrderReserve)
    .bind(StockChangeReason::OrderRestore)
    .bind(since)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn log_for_item(
    pool: &SqlitePool,
    store_id: i64,
    item_id: i64,
    limit: i64,
) -> RepoResult<Vec<StockChangeLog>> {
    let sql = format!(
        "{LOG_SELECT} WHERE store_id = ? AND item_id = ? ORDER BY created_at DESC, id DESC LIMIT ?"
    );
    let rows = sqlx::query_as::<_, StockChangeLog>(&sql)
        .bind(store_id)
        .bind(item_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn log_for_order(pool: &SqlitePool, order_id: i64) -> RepoResult<Vec<StockChangeLog>> {
    let sql = format!("{LOG_SELECT} WHERE order_id = ? ORDER BY id");
    let rows = sqlx::query_as::<_, StockChangeLog>(&sql)
        .bind(order_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}
