//! 库存模块 - Stock Ledger
//!
//! - [`StockLedger`] - 预留 / 恢复 / 手动调整，每次变更写一条变更日志
//! - [`StockError`] - 库存错误
//! - 消耗统计 (`consumption_stats`) 基于变更日志计算

pub mod error;
pub mod ledger;
mod stats;

pub use error::StockError;
pub use ledger::{ReserveOutcome, StockLedger, StockMovement};
