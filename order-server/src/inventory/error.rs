//! Stock Ledger errors

use crate::db::repository::RepoError;
use crate::utils::{AppError, ErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StockError {
    #[error("no inventory record for item {item_id} in store {store_id}")]
    NotFound { store_id: i64, item_id: i64 },

    #[error("only {available} left")]
    InsufficientStock {
        item_id: i64,
        available: i64,
        requested: i64,
    },

    #[error("sold out")]
    SoldOut { item_id: i64 },

    #[error("daily limit reached, {remaining} left today")]
    DailyLimitReached { item_id: i64, remaining: i64 },

    #[error("only {available} left in the warehouse to allocate")]
    WarehouseExceeded { item_id: i64, available: i64 },

    #[error("invalid stock operation: {0}")]
    Invalid(String),

    #[error("inventory record changed concurrently, retry")]
    Conflict { item_id: i64 },

    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl StockError {
    pub fn code(&self) -> ErrorCode {
        match self {
            StockError::NotFound { .. } => ErrorCode::InventoryNotFound,
            StockError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            StockError::SoldOut { .. } => ErrorCode::ItemSoldOut,
            StockError::DailyLimitReached { .. } => ErrorCode::DailyLimitReached,
            StockError::WarehouseExceeded { .. } => ErrorCode::WarehouseStockExceeded,
            StockError::Invalid(_) => ErrorCode::ValidationFailed,
            StockError::Conflict { .. } => ErrorCode::SystemBusy,
            StockError::Repo(_) => ErrorCode::DatabaseError,
        }
    }

    /// Item the rejection refers to
    pub fn item_id(&self) -> Option<i64> {
        match self {
            StockError::NotFound { item_id, .. }
            | StockError::InsufficientStock { item_id, .. }
            | StockError::SoldOut { item_id }
            | StockError::DailyLimitReached { item_id, .. }
            | StockError::WarehouseExceeded { item_id, .. }
            | StockError::Conflict { item_id } => Some(*item_id),
            StockError::Invalid(_) | StockError::Repo(_) => None,
        }
    }

    /// Rejections caused by the counters themselves (not by bad input or I/O)
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StockError::InsufficientStock { .. }
                | StockError::SoldOut { .. }
                | StockError::DailyLimitReached { .. }
                | StockError::WarehouseExceeded { .. }
        )
    }
}

impl From<StockError> for AppError {
    fn from(err: StockError) -> Self {
        if let StockError::Repo(e) = err {
            return e.into();
        }
        let app = AppError::with_message(err.code(), err.to_string());
        match err {
            StockError::InsufficientStock {
                item_id,
                available,
                requested,
            } => app
                .with_detail("item_id", item_id)
                .with_detail("available", available)
                .with_detail("requested", requested),
            StockError::SoldOut { item_id }
            | StockError::DailyLimitReached { item_id, .. }
            | StockError::WarehouseExceeded { item_id, .. }
            | StockError::Conflict { item_id } => app.with_detail("item_id", item_id),
            _ => app,
        }
    }
}

impl From<sqlx::Error> for StockError {
    fn from(err: sqlx::Error) -> Self {
        StockError::Repo(err.into())
    }
}
