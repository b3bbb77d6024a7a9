//! Store Repository

use super::RepoResult;
use shared::models::Store;
use sqlx::SqlitePool;

const STORE_SELECT: &str =
    "SELECT id, brand_id, name, service_charge_rate, currency_decimals, is_active FROM store";

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Store>> {
    let sql = format!("{STORE_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, Store>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Brands with at least one active store
pub async fn active_brand_ids(pool: &SqlitePool) -> RepoResult<Vec<i64>> {
    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT DISTINCT brand_id FROM store WHERE is_active = 1 ORDER BY brand_id",
    )
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

pub async fn create(pool: &SqlitePool, store: &Store) -> RepoResult<Store> {
    sqlx::query(
        "INSERT INTO store (id, brand_id, name, service_charge_rate, currency_decimals, is_active) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .bind(store.id)
    .bind(store.brand_id)
    .bind(&store.name)
    .bind(store.service_charge_rate)
    .bind(store.currency_decimals)
    .bind(store.is_active)
    .execute(pool)
    .await?;
    Ok(store.clone())
}
