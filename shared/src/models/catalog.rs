//! Catalog & Store Models
//!
//! Only the read side the fulfillment pipeline needs. Catalog CRUD lives
//! outside this service.

use serde::{Deserialize, Serialize};

/// Store (门店)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Store {
    pub id: i64,
    pub brand_id: i64,
    pub name: String,
    /// Dine-in service charge rate in percent (e.g. 10.0)
    pub service_charge_rate: f64,
    /// Decimal digits of the store currency (TWD = 0, EUR = 2)
    pub currency_decimals: i32,
    pub is_active: bool,
}

/// Dish template
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct DishTemplate {
    pub id: i64,
    pub brand_id: i64,
    pub name: String,
    pub price: f64,
    /// Marketplace mapping id
    pub external_id: Option<String>,
    pub is_active: bool,
}

/// Dish option (customization)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct DishOption {
    pub id: i64,
    pub brand_id: i64,
    pub category_name: String,
    pub name: String,
    pub price_modifier: f64,
    /// Stock-tracked catalog entry consumed by this option
    pub bound_template_id: Option<i64>,
    pub external_id: Option<String>,
    pub is_active: bool,
}
