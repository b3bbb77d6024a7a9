//! Promotion Ledger errors

use shared::models::DiscountModel;
use thiserror::Error;

use crate::db::repository::RepoError;
use crate::utils::{AppError, ErrorCode};

#[derive(Debug, Error)]
pub enum PromotionError {
    #[error("{model:?} {id} not found")]
    NotFound { model: DiscountModel, id: i64 },

    #[error("{model:?} {id} has expired")]
    Expired { model: DiscountModel, id: i64 },

    #[error("{model:?} {id} cannot be used on this order: {reason}")]
    Mismatch {
        model: DiscountModel,
        id: i64,
        reason: String,
    },

    #[error("{model:?} {id} has already been used")]
    AlreadyUsed { model: DiscountModel, id: i64 },

    #[error("points rule {0} not found")]
    RuleNotFound(i64),

    #[error("invalid points rule: {0}")]
    InvalidRule(String),

    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl PromotionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            PromotionError::NotFound { .. } => ErrorCode::PromotionNotFound,
            PromotionError::Expired { .. } => ErrorCode::PromotionExpired,
            PromotionError::Mismatch { .. } => ErrorCode::PromotionMismatch,
            PromotionError::AlreadyUsed { .. } => ErrorCode::PromotionAlreadyUsed,
            PromotionError::RuleNotFound(_) => ErrorCode::PointsRuleNotFound,
            PromotionError::InvalidRule(_) => ErrorCode::ValidationFailed,
            PromotionError::Repo(_) => ErrorCode::DatabaseError,
        }
    }

    pub(crate) fn mismatch(model: DiscountModel, id: i64, reason: impl Into<String>) -> Self {
        PromotionError::Mismatch {
            model,
            id,
            reason: reason.into(),
        }
    }
}

impl From<sqlx::Error> for PromotionError {
    fn from(err: sqlx::Error) -> Self {
        PromotionError::Repo(err.into())
    }
}

impl From<PromotionError> for AppError {
    fn from(err: PromotionError) -> Self {
        match err {
            PromotionError::Repo(e) => e.into(),
            PromotionError::NotFound { model, id }
            | PromotionError::Expired { model, id }
            | PromotionError::Mismatch { model, id, .. }
            | PromotionError::AlreadyUsed { model, id } => {
                AppError::with_message(err.code(), err.to_string())
                    .with_detail("discount_model", format!("{model:?}"))
                    .with_detail("ref_id", id)
            }
            PromotionError::RuleNotFound(_) | PromotionError::InvalidRule(_) => {
                AppError::with_message(err.code(), err.to_string())
            }
        }
    }
}
