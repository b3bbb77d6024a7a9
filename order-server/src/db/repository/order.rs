//! Order Repository
//!
//! Line items, discounts and platform origin are JSON TEXT columns.
//! `platform` / `platform_order_id` are denormalised out of the origin so the
//! unique index can enforce one internal order per marketplace order.

use super::{RepoError, RepoResult};
use shared::models::{
    AcceptStatus, Order, OrderStatus, OrderType, PaymentMethod, Platform, PlatformOrigin,
};
use sqlx::{SqliteExecutor, SqlitePool};

const ORDER_SELECT: &str = "SELECT id, brand_id, store_id, sequence_code, user_id, guest_name, order_type, items, dish_subtotal, bundle_subtotal, service_charge, discounts, total_discount, manual_adjustment, total, status, payment_method, paid_at, payment_reference, points_awarded, platform_origin, cancel_reason, cancelled_by, created_at, updated_at FROM orders";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    brand_id: i64,
    store_id: i64,
    sequence_code: String,
    user_id: Option<i64>,
    guest_name: Option<String>,
    order_type: OrderType,
    items: String,
    dish_subtotal: f64,
    bundle_subtotal: f64,
    service_charge: f64,
    discounts: String,
    total_discount: f64,
    manual_adjustment: f64,
    total: f64,
    status: OrderStatus,
    payment_method: PaymentMethod,
    paid_at: Option<i64>,
    payment_reference: Option<String>,
    points_awarded: i64,
    platform_origin: Option<String>,
    cancel_reason: Option<String>,
    cancelled_by: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepoError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: row.id,
            brand_id: row.brand_id,
            store_id: row.store_id,
            sequence_code: row.sequence_code,
            user_id: row.user_id,
            guest_name: row.guest_name,
            order_type: row.order_type,
            items: serde_json::from_str(&row.items)?,
            dish_subtotal: row.dish_subtotal,
            bundle_subtotal: row.bundle_subtotal,
            service_charge: row.service_charge,
            discounts: serde_json::from_str(&row.discounts)?,
            total_discount: row.total_discount,
            manual_adjustment: row.manual_adjustment,
            total: row.total,
            status: row.status,
            payment_method: row.payment_method,
            paid_at: row.paid_at,
            payment_reference: row.payment_reference,
            points_awarded: row.points_awarded,
            platform: row
                .platform_origin
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            cancel_reason: row.cancel_reason,
            cancelled_by: row.cancelled_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Order>> {
    let sql = format!("{ORDER_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, OrderRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.map(Order::try_from).transpose()
}

pub async fn find_by_platform_order(
    pool: &SqlitePool,
    platform: Platform,
    platform_order_id: &str,
) -> RepoResult<Option<Order>> {
    let sql = format!("{ORDER_SELECT} WHERE platform = ? AND platform_order_id = ?");
    let row = sqlx::query_as::<_, OrderRow>(&sql)
        .bind(platform)
        .bind(platform_order_id)
        .fetch_optional(pool)
        .await?;
    row.map(Order::try_from).transpose()
}

/// Insert a new order. A second insert for the same marketplace order
/// fails with [`RepoError::Duplicate`].
pub async fn insert<'e>(exec: impl SqliteExecutor<'e>, order: &Order) -> RepoResult<()> {
    let items = serde_json::to_string(&order.items)?;
    let discounts = serde_json::to_string(&order.discounts)?;
    let origin = order.platform.as_ref().map(serde_json::to_string).transpose()?;
    let (platform, platform_order_id) = match &order.platform {
        Some(p) => (Some(p.platform), Some(p.platform_order_id.as_str())),
        None => (None, None),
    };

    sqlx::query(
        "INSERT INTO orders (id, brand_id, store_id, sequence_code, user_id, guest_name, order_type, items, dish_subtotal, bundle_subtotal, service_charge, discounts, total_discount, manual_adjustment, total, status, payment_method, paid_at, payment_reference, points_awarded, platform, platform_order_id, platform_origin, cancel_reason, cancelled_by, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27)",
    )
    .bind(order.id)
    .bind(order.brand_id)
    .bind(order.store_id)
    .bind(&order.sequence_code)
    .bind(order.user_id)
    .bind(&order.guest_name)
    .bind(order.order_type)
    .bind(items)
    .bind(order.dish_subtotal)
    .bind(order.bundle_subtotal)
    .bind(order.service_charge)
    .bind(discounts)
    .bind(order.total_discount)
    .bind(order.manual_adjustment)
    .bind(order.total)
    .bind(order.status)
    .bind(order.payment_method)
    .bind(order.paid_at)
    .bind(&order.payment_reference)
    .bind(order.points_awarded)
    .bind(platform)
    .bind(platform_order_id)
    .bind(origin)
    .bind(&order.cancel_reason)
    .bind(&order.cancelled_by)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(exec)
    .await?;
    Ok(())
}

/// Hard delete, only used to compensate a failed commit
pub async fn delete(pool: &SqlitePool, id: i64) -> RepoResult<bool> {
    let result = sqlx::query("DELETE FROM orders WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// Compare-and-set status transition
pub async fn update_status(
    pool: &SqlitePool,
    id: i64,
    from: OrderStatus,
    to: OrderStatus,
    now: i64,
) -> RepoResult<bool> {
    let result =
        sqlx::query("UPDATE orders SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4")
            .bind(to)
            .bind(now)
            .bind(id)
            .bind(from)
            .execute(pool)
            .await?;
    Ok(result.rows_affected() == 1)
}

/// Record payment once. `pending` moves to `paid`, operational states keep
/// their status. Returns false if the order was already paid or cancelled.
pub async fn mark_paid(
    pool: &SqlitePool,
    id: i64,
    method: PaymentMethod,
    reference: Option<&str>,
    paid_at: i64,
) -> RepoResult<bool> {
    let result = sqlx::query(
        "UPDATE orders SET paid_at = ?1, payment_method = ?2, payment_reference = COALESCE(?3, payment_reference), status = CASE WHEN status = ?4 THEN ?5 ELSE status END, updated_at = ?1 WHERE id = ?6 AND paid_at IS NULL AND status != ?7",
    )
    .bind(paid_at)
    .bind(method)
    .bind(reference)
    .bind(OrderStatus::Pending)
    .bind(OrderStatus::Paid)
    .bind(id)
    .bind(OrderStatus::Cancelled)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn set_points_awarded<'e>(
    exec: impl SqliteExecutor<'e>,
    id: i64,
    points: i64,
) -> RepoResult<()> {
    sqlx::query("UPDATE orders SET points_awarded = ?1 WHERE id = ?2")
        .bind(points)
        .bind(id)
        .execute(exec)
        .await?;
    Ok(())
}

pub async fn update_adjustment(
    pool: &SqlitePool,
    id: i64,
    manual_adjustment: f64,
    total: f64,
    now: i64,
) -> RepoResult<bool> {
    let result = sqlx::query(
        "UPDATE orders SET manual_adjustment = ?1, total = ?2, updated_at = ?3 WHERE id = ?4 AND status NOT IN (?5, ?6)",
    )
    .bind(manual_adjustment)
    .bind(total)
    .bind(now)
    .bind(id)
    .bind(OrderStatus::Completed)
    .bind(OrderStatus::Cancelled)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Flip to `cancelled` unless already terminal
pub async fn mark_cancelled(
    pool: &SqlitePool,
    id: i64,
    reason: &str,
    actor: &str,
    now: i64,
) -> RepoResult<bool> {
    let result = sqlx::query(
        "UPDATE orders SET status = ?1, cancel_reason = ?2, cancelled_by = ?3, updated_at = ?4 WHERE id = ?5 AND status NOT IN (?6, ?1)",
    )
    .bind(OrderStatus::Cancelled)
    .bind(reason)
    .bind(actor)
    .bind(now)
    .bind(id)
    .bind(OrderStatus::Completed)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn update_platform_origin(
    pool: &SqlitePool,
    id: i64,
    origin: &PlatformOrigin,
    now: i64,
) -> RepoResult<()> {
    let json = serde_json::to_string(origin)?;
    sqlx::query("UPDATE orders SET platform_origin = ?1, updated_at = ?2 WHERE id = ?3")
        .bind(json)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Stamp a repeat marketplace notification: `lastSyncedAt`, and the
/// platform status when one was reported. Single-statement JSON patch so a
/// concurrent accept-status write is not lost.
pub async fn touch_platform_origin(
    pool: &SqlitePool,
    id: i64,
    platform_status: Option<&str>,
    now: i64,
) -> RepoResult<bool> {
    let result = sqlx::query(
        "UPDATE orders SET platform_origin = json_set(platform_origin, '$.lastSyncedAt', ?1, '$.platformStatus', COALESCE(?2, json_extract(platform_origin, '$.platformStatus'))), updated_at = ?1 WHERE id = ?3 AND platform_origin IS NOT NULL",
    )
    .bind(now)
    .bind(platform_status)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Record the marketplace accept outcome, only while it is still pending
pub async fn set_accept_status(
    pool: &SqlitePool,
    id: i64,
    status: AcceptStatus,
    now: i64,
) -> RepoResult<bool> {
    let value = match status {
        AcceptStatus::Pending => "pending",
        AcceptStatus::Accepted => "accepted",
        AcceptStatus::Forfeited => "forfeited",
    };
    let result = sqlx::query(
        "UPDATE orders SET platform_origin = json_set(platform_origin, '$.acceptStatus', ?1, '$.lastSyncedAt', ?2), updated_at = ?2 WHERE id = ?3 AND json_extract(platform_origin, '$.acceptStatus') = 'pending'",
    )
    .bind(value)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}
