//! Inventory Models
//!
//! One record per (store, catalog item). Counters only move through the
//! stock ledger, and every movement appends a [`StockChangeLog`] row.

use serde::{Deserialize, Serialize};

/// Inventory record (库存)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct InventoryRecord {
    pub id: i64,
    pub store_id: i64,
    /// Catalog dish template id
    pub item_id: i64,
    /// Untracked items sell without stock limits
    pub is_tracked: bool,
    /// Sold-out items never reserve, whatever the counter says
    pub is_sold_out: bool,
    /// Sellable stock
    pub stock: i64,
    /// Warehouse stock (stricter two-counter variant). `stock <= warehouse_stock`
    pub warehouse_stock: Option<i64>,
    /// Max units reserved by orders per business day
    pub daily_limit: Option<i64>,
    pub updated_at: i64,
}

/// Why a stock counter moved
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum StockChangeReason {
    /// Reserved by an order
    OrderReserve,
    /// Returned by a cancelled order
    OrderRestore,
    ManualAdd,
    ManualSubtract,
    Damage,
    /// Warehouse → sellable
    Allocate,
}

impl StockChangeReason {
    /// Manual adjustments (everything the ledger does not drive by itself)
    pub fn is_manual(&self) -> bool {
        !matches!(self, Self::OrderReserve | Self::OrderRestore)
    }
}

/// Append-only stock change log entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct StockChangeLog {
    pub id: i64,
    pub store_id: i64,
    pub item_id: i64,
    pub previous_stock: i64,
    pub new_stock: i64,
    pub delta: i64,
    pub reason: StockChangeReason,
    pub order_id: Option<i64>,
    pub note: Option<String>,
    pub operator: Option<String>,
    pub created_at: i64,
}

/// Manual adjustment kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StockAdjustKind {
    Add,
    Subtract,
    Damage,
    Allocate,
}

impl StockAdjustKind {
    pub fn reason(&self) -> StockChangeReason {
        match self {
            Self::Add => StockChangeReason::ManualAdd,
            Self::Subtract => StockChangeReason::ManualSubtract,
            Self::Damage => StockChangeReason::Damage,
            Self::Allocate => StockChangeReason::Allocate,
        }
    }
}

/// Manual stock adjustment payload (reason is mandatory)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub kind: StockAdjustKind,
    pub quantity: i64,
    pub reason: String,
    pub operator: Option<String>,
}

/// Per-item consumption statistics computed from the change log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsumptionStat {
    pub item_id: i64,
    /// Net units consumed by orders in the window
    pub consumed: i64,
    pub average_daily: f64,
    pub current_stock: i64,
    /// `current_stock / average_daily`; None when nothing was consumed
    pub days_of_cover: Option<f64>,
}
