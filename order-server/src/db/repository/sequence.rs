//! Daily Order Sequence Repository

use super::RepoResult;
use sqlx::SqliteExecutor;

/// Next value of the (store, business day, prefix) counter, starting at 1
pub async fn next_value<'e>(
    exec: impl SqliteExecutor<'e>,
    store_id: i64,
    business_date: &str,
    prefix: &str,
) -> RepoResult<i64> {
    let value: i64 = sqlx::query_scalar(
        "INSERT INTO order_sequence (store_id, business_date, prefix, last_value) VALUES (?1, ?2, ?3, 1) ON CONFLICT (store_id, business_date, prefix) DO UPDATE SET last_value = last_value + 1 RETURNING last_value",
    )
    .bind(store_id)
    .bind(business_date)
    .bind(prefix)
    .fetch_one(exec)
    .await?;
    Ok(value)
}
