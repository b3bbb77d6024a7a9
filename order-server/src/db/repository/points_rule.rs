//! Points Rule Repository
//!
//! 每个品牌最多一条启用规则：由部分唯一索引 `uq_points_rule_active` 兜底，
//! 启用操作在同一事务内先停用其它规则再启用目标规则。

use super::{RepoError, RepoResult};
use shared::models::{PointsRule, PointsRuleCreate};
use sqlx::SqlitePool;

const RULE_SELECT: &str = "SELECT id, brand_id, name, spend_per_point, validity_days, is_active, created_at, updated_at FROM points_rule";

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<PointsRule>> {
    let sql = format!("{RULE_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, PointsRule>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn find_active(pool: &SqlitePool, brand_id: i64) -> RepoResult<Option<PointsRule>> {
    let sql = format!("{RULE_SELECT} WHERE brand_id = ? AND is_active = 1");
    let row = sqlx::query_as::<_, PointsRule>(&sql)
        .bind(brand_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Create a rule (inactive until [`activate`] is called)
pub async fn create(pool: &SqlitePool, data: PointsRuleCreate) -> RepoResult<PointsRule> {
    if data.spend_per_point <= 0.0 {
        return Err(RepoError::Validation(
            "spend_per_point must be positive".into(),
        ));
    }
    if data.validity_days <= 0 {
        return Err(RepoError::Validation("validity_days must be positive".into()));
    }
    let id = shared::util::snowflake_id();
    let now = shared::util::now_millis();
    sqlx::query(
        "INSERT INTO points_rule (id, brand_id, name, spend_per_point, validity_days, is_active, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)",
    )
    .bind(id)
    .bind(data.brand_id)
    .bind(&data.name)
    .bind(data.spend_per_point)
    .bind(data.validity_days)
    .bind(now)
    .execute(pool)
    .await?;

    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create points rule".into()))
}

/// Atomically make `id` the only active rule of its brand
pub async fn activate(pool: &SqlitePool, id: i64) -> RepoResult<PointsRule> {
    let now = shared::util::now_millis();
    let mut tx = pool.begin().await?;

    // 第一条语句即写操作，直接拿到写锁
    let brand_id: Option<i64> =
        sqlx::query_scalar("UPDATE points_rule SET updated_at = ?1 WHERE id = ?2 RETURNING brand_id")
            .bind(now)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
    let brand_id = brand_id.ok_or_else(|| RepoError::NotFound(format!("points rule {id}")))?;

    sqlx::query(
        "UPDATE points_rule SET is_active = 0, updated_at = ?1 WHERE brand_id = ?2 AND is_active = 1 AND id != ?3",
    )
    .bind(now)
    .bind(brand_id)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE points_rule SET is_active = 1 WHERE id = ?1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("points rule {id}")))
}
