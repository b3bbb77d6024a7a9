//! Bundle Repository

use super::{RepoError, RepoResult};
use shared::models::{Bundle, BundleDetail, BundleEntry, OrderStatus};
use sqlx::SqlitePool;

const BUNDLE_SELECT: &str = "SELECT id, brand_id, name, price, is_active, valid_from, valid_until, purchase_limit, voucher_validity_days, created_at FROM bundle";

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Bundle>> {
    let sql = format!("{BUNDLE_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, Bundle>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn find_detail(pool: &SqlitePool, id: i64) -> RepoResult<Option<BundleDetail>> {
    let Some(bundle) = find_by_id(pool, id).await? else {
        return Ok(None);
    };
    let entries = sqlx::query_as::<_, BundleEntry>(
        "SELECT bundle_id, template_id, quantity FROM bundle_entry WHERE bundle_id = ? ORDER BY template_id",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;
    Ok(Some(BundleDetail { bundle, entries }))
}

/// Units of a bundle a user holds across non-cancelled orders
pub async fn purchased_quantity(pool: &SqlitePool, bundle_id: i64, user_id: i64) -> RepoResult<i64> {
    let qty: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(json_extract(li.value, '$.quantity')), 0) FROM orders o, json_each(o.items) li WHERE o.user_id = ?1 AND o.status != ?2 AND json_extract(li.value, '$.itemType') = 'bundle' AND json_extract(li.value, '$.bundleId') = ?3",
    )
    .bind(user_id)
    .bind(OrderStatus::Cancelled)
    .bind(bundle_id)
    .fetch_one(pool)
    .await?;
    Ok(qty)
}

pub async fn create(pool: &SqlitePool, detail: &BundleDetail) -> RepoResult<BundleDetail> {
    if detail.entries.is_empty() {
        return Err(RepoError::Validation("bundle has no entries".into()));
    }
    let b = &detail.bundle;
    let mut tx = pool.begin().await?;
    sqlx::query(
        "INSERT INTO bundle (id, brand_id, name, price, is_active, valid_from, valid_until, purchase_limit, voucher_validity_days, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )
    .bind(b.id)
    .bind(b.brand_id)
    .bind(&b.name)
    .bind(b.price)
    .bind(b.is_active)
    .bind(b.valid_from)
    .bind(b.valid_until)
    .bind(b.purchase_limit)
    .bind(b.voucher_validity_days)
    .bind(b.created_at)
    .execute(&mut *tx)
    .await?;
    for e in &detail.entries {
        sqlx::query("INSERT INTO bundle_entry (bundle_id, template_id, quantity) VALUES (?1, ?2, ?3)")
            .bind(b.id)
            .bind(e.template_id)
            .bind(e.quantity)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(detail.clone())
}
