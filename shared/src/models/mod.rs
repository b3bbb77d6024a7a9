//! Data models
//!
//! Shared between order-server and its clients (via API).
//! DB row types use `#[cfg_attr(feature = "db", derive(sqlx::FromRow))]`.
//! All IDs are `i64` (SQLite INTEGER PRIMARY KEY).

pub mod catalog;
pub mod inventory;
pub mod order;
pub mod platform;
pub mod promotion;

// Re-exports
pub use catalog::*;
pub use inventory::*;
pub use order::*;
pub use platform::*;
pub use promotion::*;
