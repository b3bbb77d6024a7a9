//! Promotion Credit Models
//!
//! Points, coupons and vouchers share one state shape: a credit goes
//! `active → used` at most once per life cycle, and a cancellation re-opens it
//! (`restored_at` distinguishes restored credits from freshly issued ones).

use serde::{Deserialize, Serialize};

/// Unit value of a single point
pub const POINT_UNIT_VALUE: f64 = 1.0;

/// Credit state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum CreditStatus {
    Active,
    Used,
    Expired,
}

/// Loyalty point (unit value 1)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Point {
    pub id: i64,
    pub brand_id: i64,
    pub user_id: i64,
    pub status: CreditStatus,
    pub expires_at: i64,
    /// Order that consumed this point
    pub used_by_order_id: Option<i64>,
    pub used_at: Option<i64>,
    /// Order whose payment awarded this point (None for admin grants)
    pub awarded_by_order_id: Option<i64>,
    pub restored_at: Option<i64>,
    pub created_at: i64,
}

/// Coupon: a single redeemable unit, optionally bound to a dish
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Coupon {
    pub id: i64,
    pub brand_id: i64,
    pub user_id: i64,
    pub name: String,
    /// Fixed discount value
    pub value: f64,
    /// Exchange target: the order must contain this dish
    pub template_id: Option<i64>,
    pub is_used: bool,
    pub used_at: Option<i64>,
    pub used_by_order_id: Option<i64>,
    pub is_expired: bool,
    pub expires_at: i64,
    pub restored_at: Option<i64>,
    pub created_at: i64,
}

/// Voucher: exchanges for one unit of its bound dish
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Voucher {
    pub id: i64,
    pub brand_id: i64,
    pub user_id: i64,
    /// Bound dish template
    pub template_id: i64,
    /// Bundle order that issued this voucher (None for admin grants)
    pub bundle_order_id: Option<i64>,
    pub bundle_id: Option<i64>,
    pub is_used: bool,
    pub used_at: Option<i64>,
    pub used_by_order_id: Option<i64>,
    pub is_expired: bool,
    /// Set when the issuing bundle purchase was cancelled
    pub is_invalidated: bool,
    pub expires_at: i64,
    pub restored_at: Option<i64>,
    pub created_at: i64,
}

/// Points rule: one point per `spend_per_point` paid, at most one active per brand
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct PointsRule {
    pub id: i64,
    pub brand_id: i64,
    pub name: String,
    pub spend_per_point: f64,
    /// Awarded points expire after this many days
    pub validity_days: i64,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Create points rule payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsRuleCreate {
    pub brand_id: i64,
    pub name: String,
    pub spend_per_point: f64,
    pub validity_days: i64,
}

/// Bundle: a purchasable package that turns into fulfillment vouchers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Bundle {
    pub id: i64,
    pub brand_id: i64,
    pub name: String,
    pub price: f64,
    pub is_active: bool,
    pub valid_from: Option<i64>,
    pub valid_until: Option<i64>,
    /// Max units one user may hold across non-cancelled orders
    pub purchase_limit: Option<i64>,
    pub voucher_validity_days: i64,
    pub created_at: i64,
}

/// Bundle content entry (`quantity` vouchers of `template_id` per bundle)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct BundleEntry {
    pub bundle_id: i64,
    pub template_id: i64,
    pub quantity: i64,
}

/// Bundle with entries
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BundleDetail {
    #[serde(flatten)]
    pub bundle: Bundle,
    pub entries: Vec<BundleEntry>,
}
