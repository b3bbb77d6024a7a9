//! Platform Store Repository
//!
//! Store ↔ marketplace links, including the persisted OAuth fields the
//! credential cache falls back to after a restart.

use super::RepoResult;
use shared::models::{Platform, PlatformStore};
use sqlx::SqlitePool;

const LINK_SELECT: &str = "SELECT id, store_id, platform, platform_store_id, access_token, refresh_token, token_expires_at, authorized_store_ids, is_active, created_at, updated_at FROM platform_store";

pub async fn find_by_platform_store_id(
    pool: &SqlitePool,
    platform: Platform,
    platform_store_id: &str,
) -> RepoResult<Option<PlatformStore>> {
    let sql = format!("{LINK_SELECT} WHERE platform = ? AND platform_store_id = ? AND is_active = 1");
    let row = sqlx::query_as::<_, PlatformStore>(&sql)
        .bind(platform)
        .bind(platform_store_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn find_by_store(
    pool: &SqlitePool,
    platform: Platform,
    store_id: i64,
) -> RepoResult<Option<PlatformStore>> {
    let sql = format!("{LINK_SELECT} WHERE platform = ? AND store_id = ? AND is_active = 1");
    let row = sqlx::query_as::<_, PlatformStore>(&sql)
        .bind(platform)
        .bind(store_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn create(pool: &SqlitePool, link: &PlatformStore) -> RepoResult<PlatformStore> {
    sqlx::query(
        "INSERT INTO platform_store (id, store_id, platform, platform_store_id, access_token, refresh_token, token_expires_at, authorized_store_ids, is_active, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    )
    .bind(link.id)
    .bind(link.store_id)
    .bind(link.platform)
    .bind(&link.platform_store_id)
    .bind(&link.access_token)
    .bind(&link.refresh_token)
    .bind(link.token_expires_at)
    .bind(&link.authorized_store_ids)
    .bind(link.is_active)
    .bind(link.created_at)
    .bind(link.updated_at)
    .execute(pool)
    .await?;
    Ok(link.clone())
}

/// Persist a refreshed token on every active link of the platform
/// authorised by it (client-credentials tokens are per application).
pub async fn save_token(
    pool: &SqlitePool,
    platform: Platform,
    platform_store_id: Option<&str>,
    access_token: &str,
    refresh_token: Option<&str>,
    expires_at: i64,
) -> RepoResult<u64> {
    let now = shared::util::now_millis();
    let result = match platform_store_id {
        Some(psid) => {
            sqlx::query(
                "UPDATE platform_store SET access_token = ?1, refresh_token = COALESCE(?2, refresh_token), token_expires_at = ?3, updated_at = ?4 WHERE platform = ?5 AND platform_store_id = ?6",
            )
            .bind(access_token)
            .bind(refresh_token)
            .bind(expires_at)
            .bind(now)
            .bind(platform)
            .bind(psid)
            .execute(pool)
            .await?
        }
        None => {
            sqlx::query(
                "UPDATE platform_store SET access_token = ?1, refresh_token = COALESCE(?2, refresh_token), token_expires_at = ?3, updated_at = ?4 WHERE platform = ?5 AND is_active = 1",
            )
            .bind(access_token)
            .bind(refresh_token)
            .bind(expires_at)
            .bind(now)
            .bind(platform)
            .execute(pool)
            .await?
        }
    };
    Ok(result.rows_affected())
}

/// Newest persisted token for a credential identity, if still stored
pub async fn load_token(
    pool: &SqlitePool,
    platform: Platform,
    platform_store_id: Option<&str>,
) -> RepoResult<Option<(String, Option<String>, i64)>> {
    let row: Option<(Option<String>, Option<String>, Option<i64>)> = match platform_store_id {
        Some(psid) => {
            sqlx::query_as(
                "SELECT access_token, refresh_token, token_expires_at FROM platform_store WHERE platform = ?1 AND platform_store_id = ?2",
            )
            .bind(platform)
            .bind(psid)
            .fetch_optional(pool)
            .await?
        }
        None => {
            sqlx::query_as(
                "SELECT access_token, refresh_token, token_expires_at FROM platform_store WHERE platform = ?1 AND is_active = 1 AND access_token IS NOT NULL ORDER BY token_expires_at DESC LIMIT 1",
            )
            .bind(platform)
            .fetch_optional(pool)
            .await?
        }
    };

    match row {
        Some((Some(token), refresh, Some(expires_at))) => Ok(Some((token, refresh, expires_at))),
        Some(_) | None => Ok(None),
    }
}
