//! Promotion Credit Repository
//!
//! Points, coupons and vouchers. Every state flip is a conditional UPDATE
//! (`WHERE status = 'active'` / `WHERE is_used = 0`) and the caller checks
//! `rows_affected`, so a credit can never be consumed twice.

use super::RepoResult;
use shared::models::{Coupon, CreditStatus, Point, Voucher};
use sqlx::{SqliteConnection, SqliteExecutor, SqlitePool};

const POINT_SELECT: &str = "SELECT id, brand_id, user_id, status, expires_at, used_by_order_id, used_at, awarded_by_order_id, restored_at, created_at FROM point";
const COUPON_SELECT: &str = "SELECT id, brand_id, user_id, name, value, template_id, is_used, used_at, used_by_order_id, is_expired, expires_at, restored_at, created_at FROM coupon";
const VOUCHER_SELECT: &str = "SELECT id, brand_id, user_id, template_id, bundle_order_id, bundle_id, is_used, used_at, used_by_order_id, is_expired, is_invalidated, expires_at, restored_at, created_at FROM voucher";

/// Outcome of re-opening the credits of a cancelled order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreCounts {
    pub restored: u64,
    pub expired: u64,
}

impl std::ops::AddAssign for RestoreCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.restored += rhs.restored;
        self.expired += rhs.expired;
    }
}

// ========== Points ==========

pub async fn find_point(pool: &SqlitePool, id: i64) -> RepoResult<Option<Point>> {
    let sql = format!("{POINT_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, Point>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn find_points_used_by(pool: &SqlitePool, order_id: i64) -> RepoResult<Vec<Point>> {
    let sql = format!("{POINT_SELECT} WHERE used_by_order_id = ? ORDER BY id");
    let rows = sqlx::query_as::<_, Point>(&sql)
        .bind(order_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn find_points_awarded_by(pool: &SqlitePool, order_id: i64) -> RepoResult<Vec<Point>> {
    let sql = format!("{POINT_SELECT} WHERE awarded_by_order_id = ? ORDER BY id");
    let rows = sqlx::query_as::<_, Point>(&sql)
        .bind(order_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn insert_point<'e>(exec: impl SqliteExecutor<'e>, p: &Point) -> RepoResult<()> {
    sqlx::query(
        "INSERT INTO point (id, brand_id, user_id, status, expires_at, used_by_order_id, used_at, awarded_by_order_id, restored_at, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )
    .bind(p.id)
    .bind(p.brand_id)
    .bind(p.user_id)
    .bind(p.status)
    .bind(p.expires_at)
    .bind(p.used_by_order_id)
    .bind(p.used_at)
    .bind(p.awarded_by_order_id)
    .bind(p.restored_at)
    .bind(p.created_at)
    .execute(exec)
    .await?;
    Ok(())
}

/// `active → used`, only while unexpired
pub async fn mark_point_used<'e>(
    exec: impl SqliteExecutor<'e>,
    id: i64,
    order_id: i64,
    now: i64,
) -> RepoResult<bool> {
    let result = sqlx::query(
        "UPDATE point SET status = ?1, used_by_order_id = ?2, used_at = ?3 WHERE id = ?4 AND status = ?5 AND expires_at > ?3",
    )
    .bind(CreditStatus::Used)
    .bind(order_id)
    .bind(now)
    .bind(id)
    .bind(CreditStatus::Active)
    .execute(exec)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn restore_points_used_by(
    conn: &mut SqliteConnection,
    order_id: i64,
    now: i64,
) -> RepoResult<RestoreCounts> {
    // 已过期的不再复活，保留 used_by 作为审计
    let expired = sqlx::query(
        "UPDATE point SET status = ?1, restored_at = ?2 WHERE used_by_order_id = ?3 AND status = ?4 AND expires_at <= ?2",
    )
    .bind(CreditStatus::Expired)
    .bind(now)
    .bind(order_id)
    .bind(CreditStatus::Used)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    let restored = sqlx::query(
        "UPDATE point SET status = ?1, used_by_order_id = NULL, used_at = NULL, restored_at = ?2 WHERE used_by_order_id = ?3 AND status = ?4",
    )
    .bind(CreditStatus::Active)
    .bind(now)
    .bind(order_id)
    .bind(CreditStatus::Used)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    Ok(RestoreCounts { restored, expired })
}

/// Expire still-active points awarded by `order_id`. Returns (revoked, already used)
pub async fn revoke_points_awarded_by(
    pool: &SqlitePool,
    order_id: i64,
    now: i64,
) -> RepoResult<(u64, i64)> {
    let revoked = sqlx::query(
        "UPDATE point SET status = ?1, restored_at = ?2 WHERE awarded_by_order_id = ?3 AND status = ?4",
    )
    .bind(CreditStatus::Expired)
    .bind(now)
    .bind(order_id)
    .bind(CreditStatus::Active)
    .execute(pool)
    .await?
    .rows_affected();

    let used: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM point WHERE awarded_by_order_id = ?1 AND status = ?2",
    )
    .bind(order_id)
    .bind(CreditStatus::Used)
    .fetch_one(pool)
    .await?;

    Ok((revoked, used))
}

// ========== Coupons ==========

pub async fn find_coupon(pool: &SqlitePool, id: i64) -> RepoResult<Option<Coupon>> {
    let sql = format!("{COUPON_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, Coupon>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn insert_coupon<'e>(exec: impl SqliteExecutor<'e>, c: &Coupon) -> RepoResult<()> {
    sqlx::query(
        "INSERT INTO coupon (id, brand_id, user_id, name, value, template_id, is_used, used_at, used_by_order_id, is_expired, expires_at, restored_at, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
    )
    .bind(c.id)
    .bind(c.brand_id)
    .bind(c.user_id)
    .bind(&c.name)
    .bind(c.value)
    .bind(c.template_id)
    .bind(c.is_used)
    .bind(c.used_at)
    .bind(c.used_by_order_id)
    .bind(c.is_expired)
    .bind(c.expires_at)
    .bind(c.restored_at)
    .bind(c.created_at)
    .execute(exec)
    .await?;
    Ok(())
}

pub async fn mark_coupon_used<'e>(
    exec: impl SqliteExecutor<'e>,
    id: i64,
    order_id: i64,
    now: i64,
) -> RepoResult<bool> {
    let result = sqlx::query(
        "UPDATE coupon SET is_used = 1, used_by_order_id = ?1, used_at = ?2 WHERE id = ?3 AND is_used = 0 AND is_expired = 0 AND expires_at > ?2",
    )
    .bind(order_id)
    .bind(now)
    .bind(id)
    .execute(exec)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn restore_coupons_used_by(
    conn: &mut SqliteConnection,
    order_id: i64,
    now: i64,
) -> RepoResult<RestoreCounts> {
    let expired = sqlx::query(
        "UPDATE coupon SET is_expired = 1, restored_at = ?1 WHERE used_by_order_id = ?2 AND is_used = 1 AND is_expired = 0 AND expires_at <= ?1",
    )
    .bind(now)
    .bind(order_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    let restored = sqlx::query(
        "UPDATE coupon SET is_used = 0, used_by_order_id = NULL, used_at = NULL, restored_at = ?1 WHERE used_by_order_id = ?2 AND is_used = 1 AND is_expired = 0",
    )
    .bind(now)
    .bind(order_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    Ok(RestoreCounts { restored, expired })
}

// ========== Vouchers ==========

pub async fn find_voucher(pool: &SqlitePool, id: i64) -> RepoResult<Option<Voucher>> {
    let sql = format!("{VOUCHER_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, Voucher>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn find_vouchers_issued_by(
    pool: &SqlitePool,
    bundle_order_id: i64,
) -> RepoResult<Vec<Voucher>> {
    let sql = format!("{VOUCHER_SELECT} WHERE bundle_order_id = ? ORDER BY id");
    let rows = sqlx::query_as::<_, Voucher>(&sql)
        .bind(bundle_order_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn insert_voucher<'e>(exec: impl SqliteExecutor<'e>, v: &Voucher) -> RepoResult<()> {
    sqlx::query(
        "INSERT INTO voucher (id, brand_id, user_id, template_id, bundle_order_id, bundle_id, is_used, used_at, used_by_order_id, is_expired, is_invalidated, expires_at, restored_at, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
    )
    .bind(v.id)
    .bind(v.brand_id)
    .bind(v.user_id)
    .bind(v.template_id)
    .bind(v.bundle_order_id)
    .bind(v.bundle_id)
    .bind(v.is_used)
    .bind(v.used_at)
    .bind(v.used_by_order_id)
    .bind(v.is_expired)
    .bind(v.is_invalidated)
    .bind(v.expires_at)
    .bind(v.restored_at)
    .bind(v.created_at)
    .execute(exec)
    .await?;
    Ok(())
}

pub async fn mark_voucher_used<'e>(
    exec: impl SqliteExecutor<'e>,
    id: i64,
    order_id: i64,
    now: i64,
) -> RepoResult<bool> {
    let result = sqlx::query(
        "UPDATE voucher SET is_used = 1, used_by_order_id = ?1, used_at = ?2 WHERE id = ?3 AND is_used = 0 AND is_expired = 0 AND is_invalidated = 0 AND expires_at > ?2",
    )
    .bind(order_id)
    .bind(now)
    .bind(id)
    .execute(exec)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn restore_vouchers_used_by(
    conn: &mut SqliteConnection,
    order_id: i64,
    now: i64,
) -> RepoResult<RestoreCounts> {
    let expired = sqlx::query(
        "UPDATE voucher SET is_expired = 1, restored_at = ?1 WHERE used_by_order_id = ?2 AND is_used = 1 AND is_expired = 0 AND expires_at <= ?1",
    )
    .bind(now)
    .bind(order_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    let restored = sqlx::query(
        "UPDATE voucher SET is_used = 0, used_by_order_id = NULL, used_at = NULL, restored_at = ?1 WHERE used_by_order_id = ?2 AND is_used = 1 AND is_expired = 0",
    )
    .bind(now)
    .bind(order_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    Ok(RestoreCounts { restored, expired })
}

/// Invalidate unused vouchers issued by a bundle order. Returns (invalidated, already used)
pub async fn invalidate_vouchers_issued_by(
    pool: &SqlitePool,
    bundle_order_id: i64,
) -> RepoResult<(u64, i64)> {
    let invalidated = sqlx::query(
        "UPDATE voucher SET is_invalidated = 1 WHERE bundle_order_id = ?1 AND is_used = 0 AND is_invalidated = 0",
    )
    .bind(bundle_order_id)
    .execute(pool)
    .await?
    .rows_affected();

    let used: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM voucher WHERE bundle_order_id = ?1 AND is_used = 1")
            .bind(bundle_order_id)
            .fetch_one(pool)
            .await?;

    Ok((invalidated, used))
}

// ========== Expiry sweep ==========

/// Mark every active credit of a brand past its expiry as expired
pub async fn expire_overdue(pool: &SqlitePool, brand_id: i64, now: i64) -> RepoResult<u64> {
    let mut tx = pool.begin().await?;

    let points = sqlx::query(
        "UPDATE point SET status = ?1 WHERE brand_id = ?2 AND status = ?3 AND expires_at <= ?4",
    )
    .bind(CreditStatus::Expired)
    .bind(brand_id)
    .bind(CreditStatus::Active)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let coupons = sqlx::query(
        "UPDATE coupon SET is_expired = 1 WHERE brand_id = ?1 AND is_used = 0 AND is_expired = 0 AND expires_at <= ?2",
    )
    .bind(brand_id)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let vouchers = sqlx::query(
        "UPDATE voucher SET is_expired = 1 WHERE brand_id = ?1 AND is_used = 0 AND is_expired = 0 AND expires_at <= ?2",
    )
    .bind(brand_id)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    tx.commit().await?;
    Ok(points + coupons + vouchers)
}
