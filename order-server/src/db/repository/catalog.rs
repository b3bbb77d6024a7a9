//! Catalog Repository (read side + fixtures)

use super::RepoResult;
use shared::models::{DishOption, DishTemplate};
use sqlx::SqlitePool;

const TEMPLATE_SELECT: &str =
    "SELECT id, brand_id, name, price, external_id, is_active FROM dish_template";
const OPTION_SELECT: &str = "SELECT id, brand_id, category_name, name, price_modifier, bound_template_id, external_id, is_active FROM dish_option";

pub async fn find_template(pool: &SqlitePool, id: i64) -> RepoResult<Option<DishTemplate>> {
    let sql = format!("{TEMPLATE_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, DishTemplate>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn find_option(pool: &SqlitePool, id: i64) -> RepoResult<Option<DishOption>> {
    let sql = format!("{OPTION_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, DishOption>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Active templates of a brand (marketplace item matching)
pub async fn find_templates_by_brand(
    pool: &SqlitePool,
    brand_id: i64,
) -> RepoResult<Vec<DishTemplate>> {
    let sql = format!("{TEMPLATE_SELECT} WHERE brand_id = ? AND is_active = 1 ORDER BY id");
    let rows = sqlx::query_as::<_, DishTemplate>(&sql)
        .bind(brand_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Active options of a brand (marketplace option matching)
pub async fn find_options_by_brand(
    pool: &SqlitePool,
    brand_id: i64,
) -> RepoResult<Vec<DishOption>> {
    let sql = format!("{OPTION_SELECT} WHERE brand_id = ? AND is_active = 1 ORDER BY id");
    let rows = sqlx::query_as::<_, DishOption>(&sql)
        .bind(brand_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn create_template(pool: &SqlitePool, t: &DishTemplate) -> RepoResult<DishTemplate> {
    sqlx::query(
        "INSERT INTO dish_template (id, brand_id, name, price, external_id, is_active) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .bind(t.id)
    .bind(t.brand_id)
    .bind(&t.name)
    .bind(t.price)
    .bind(&t.external_id)
    .bind(t.is_active)
    .execute(pool)
    .await?;
    Ok(t.clone())
}

pub async fn create_option(pool: &SqlitePool, o: &DishOption) -> RepoResult<DishOption> {
    sqlx::query(
        "INSERT INTO dish_option (id, brand_id, category_name, name, price_modifier, bound_template_id, external_id, is_active) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )
    .bind(o.id)
    .bind(o.brand_id)
    .bind(&o.category_name)
    .bind(&o.name)
    .bind(o.price_modifier)
    .bind(o.bound_template_id)
    .bind(&o.external_id)
    .bind(o.is_active)
    .execute(pool)
    .await?;
    Ok(o.clone())
}
