//! Order pipeline errors

use shared::models::OrderStatus;
use thiserror::Error;

use crate::db::repository::RepoError;
use crate::inventory::StockError;
use crate::promotion::PromotionError;
use crate::utils::{AppError, ErrorCode};

/// Failure taxonomy of the fulfillment pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Bad input shape, rejected before any resource is touched
    Validation,
    /// Stock, promotion or lifecycle state refuses the request
    Conflict,
    /// Marketplace / payment gateway call failed
    External,
    /// A rollback or restore step failed
    ConsistencyRepair,
    /// Persistence failure
    Internal,
}

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("{message}")]
    Invalid { code: ErrorCode, message: String },

    #[error("store {0} not found")]
    StoreNotFound(i64),

    #[error("dish {0} not found")]
    DishNotFound(i64),

    #[error("'{0}' is not available")]
    DishUnavailable(String),

    #[error("option {0} not found")]
    OptionNotFound(i64),

    #[error("bundle {0} not found")]
    BundleNotFound(i64),

    #[error("'{name}' cannot be purchased: {reason}")]
    BundleIneligible {
        bundle_id: i64,
        name: String,
        reason: String,
    },

    #[error("'{item}': {source}")]
    Stock { item: String, source: StockError },

    #[error(transparent)]
    Promotion(PromotionError),

    #[error("order {0} not found")]
    NotFound(i64),

    #[error("order {0} is already paid")]
    AlreadyPaid(i64),

    #[error("order {0} is already cancelled")]
    AlreadyCancelled(i64),

    #[error("order {order_id} is {status} and can no longer change")]
    TerminalState { order_id: i64, status: OrderStatus },

    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("duplicate order: {0}")]
    Duplicate(String),

    #[error("external service failed: {0}")]
    External(String),

    #[error("repair step failed: {0}")]
    RepairFailed(String),

    #[error(transparent)]
    Repo(RepoError),
}

impl OrderError {
    pub fn invalid(code: ErrorCode, message: impl Into<String>) -> Self {
        OrderError::Invalid {
            code,
            message: message.into(),
        }
    }

    /// Attach the item name a stock rejection refers to
    pub fn stock(item: impl Into<String>, err: StockError) -> Self {
        match err {
            StockError::Repo(e) => OrderError::Repo(e),
            other => OrderError::Stock {
                item: item.into(),
                source: other,
            },
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            OrderError::Invalid { .. }
            | OrderError::StoreNotFound(_)
            | OrderError::DishNotFound(_)
            | OrderError::OptionNotFound(_)
            | OrderError::BundleNotFound(_)
            | OrderError::NotFound(_) => FailureKind::Validation,
            OrderError::Stock { source, .. } => match source {
                StockError::Invalid(_) | StockError::NotFound { .. } => FailureKind::Validation,
                _ => FailureKind::Conflict,
            },
            OrderError::Promotion(PromotionError::Repo(_)) => FailureKind::Internal,
            OrderError::Promotion(PromotionError::RuleNotFound(_)) => FailureKind::Validation,
            OrderError::DishUnavailable(_)
            | OrderError::BundleIneligible { .. }
            | OrderError::Promotion(_)
            | OrderError::AlreadyPaid(_)
            | OrderError::AlreadyCancelled(_)
            | OrderError::TerminalState { .. }
            | OrderError::InvalidTransition { .. }
            | OrderError::Duplicate(_) => FailureKind::Conflict,
            OrderError::External(_) => FailureKind::External,
            OrderError::RepairFailed(_) => FailureKind::ConsistencyRepair,
            OrderError::Repo(_) => FailureKind::Internal,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            OrderError::Invalid { code, .. } => *code,
            OrderError::StoreNotFound(_) => ErrorCode::StoreNotFound,
            OrderError::DishNotFound(_) => ErrorCode::DishNotFound,
            OrderError::DishUnavailable(_) => ErrorCode::DishUnavailable,
            OrderError::OptionNotFound(_) => ErrorCode::OptionNotFound,
            OrderError::BundleNotFound(_) => ErrorCode::BundleNotFound,
            OrderError::BundleIneligible { .. } => ErrorCode::BundleIneligible,
            OrderError::Stock { source, .. } => source.code(),
            OrderError::Promotion(e) => e.code(),
            OrderError::NotFound(_) => ErrorCode::OrderNotFound,
            OrderError::AlreadyPaid(_) => ErrorCode::OrderAlreadyPaid,
            OrderError::AlreadyCancelled(_) => ErrorCode::OrderAlreadyCancelled,
            OrderError::TerminalState { .. } => ErrorCode::OrderAlreadyCompleted,
            OrderError::InvalidTransition { .. } => ErrorCode::InvalidStatusTransition,
            OrderError::Duplicate(_) => ErrorCode::AlreadyExists,
            OrderError::External(_) => ErrorCode::PlatformApiError,
            OrderError::RepairFailed(_) => ErrorCode::InternalError,
            OrderError::Repo(_) => ErrorCode::DatabaseError,
        }
    }
}

impl From<RepoError> for OrderError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Duplicate(msg) => OrderError::Duplicate(msg),
            other => OrderError::Repo(other),
        }
    }
}

impl From<StockError> for OrderError {
    fn from(err: StockError) -> Self {
        let name = err
            .item_id()
            .map(|id| format!("item {id}"))
            .unwrap_or_else(|| "stock".into());
        OrderError::stock(name, err)
    }
}

impl From<sqlx::Error> for OrderError {
    fn from(err: sqlx::Error) -> Self {
        RepoError::from(err).into()
    }
}

impl From<PromotionError> for OrderError {
    fn from(err: PromotionError) -> Self {
        match err {
            PromotionError::Repo(e) => OrderError::Repo(e),
            other => OrderError::Promotion(other),
        }
    }
}

impl From<AppError> for OrderError {
    fn from(err: AppError) -> Self {
        OrderError::Invalid {
            code: err.code,
            message: err.message,
        }
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Repo(e) => e.into(),
            OrderError::Promotion(e) => e.into(),
            OrderError::External(cause) => {
                // 对外只给通用重试提示，原因写日志
                tracing::warn!(cause = %cause, "External service failure");
                AppError::new(ErrorCode::PlatformApiError)
            }
            OrderError::Stock { ref item, ref source } => {
                let mut app = AppError::with_message(err.code(), err.to_string())
                    .with_detail("item", item.clone());
                if let StockError::InsufficientStock { available, .. } = source {
                    app = app.with_detail("available", *available);
                }
                app
            }
            OrderError::TerminalState { order_id, status } => {
                AppError::with_message(err.code(), err.to_string())
                    .with_detail("order_id", order_id)
                    .with_detail("status", status.as_str())
            }
            other => AppError::with_message(other.code(), other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_message_is_actionable() {
        let err = OrderError::stock(
            "Beef Noodle",
            StockError::InsufficientStock {
                item_id: 1,
                available: 3,
                requested: 5,
            },
        );
        assert_eq!(err.to_string(), "'Beef Noodle': only 3 left");
        assert_eq!(err.kind(), FailureKind::Conflict);
        assert_eq!(err.code(), ErrorCode::InsufficientStock);

        let app: AppError = err.into();
        assert_eq!(app.code, ErrorCode::InsufficientStock);
        assert!(app.message.contains("only 3 left"));
    }

    #[test]
    fn test_stock_repo_error_is_not_a_conflict() {
        let err = OrderError::stock("x", StockError::Repo(RepoError::Database("locked".into())));
        assert!(matches!(err, OrderError::Repo(_)));
        assert_eq!(err.kind(), FailureKind::Internal);
    }

    #[test]
    fn test_external_failure_hides_cause() {
        let app: AppError = OrderError::External("HTTP 503 from upstream".into()).into();
        assert_eq!(app.code, ErrorCode::PlatformApiError);
        assert!(!app.message.contains("503"));
    }

    #[test]
    fn test_duplicate_insert_maps_to_conflict() {
        let err: OrderError = RepoError::Duplicate("uq_orders_platform".into()).into();
        assert!(matches!(err, OrderError::Duplicate(_)));
        assert_eq!(err.kind(), FailureKind::Conflict);
    }

    #[test]
    fn test_terminal_state() {
        let err = OrderError::TerminalState {
            order_id: 7,
            status: OrderStatus::Completed,
        };
        assert_eq!(err.kind(), FailureKind::Conflict);
        assert_eq!(err.to_string(), "order 7 is completed and can no longer change");
    }
}
