//! Marketplace integration errors

use shared::models::Platform;
use thiserror::Error;

use crate::db::repository::RepoError;
use crate::orders::OrderError;
use crate::utils::{AppError, ErrorCode};

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("platform not supported: {0}")]
    Unsupported(String),

    #[error("no store linked to {platform} store {platform_store_id}")]
    StoreNotLinked {
        platform: Platform,
        platform_store_id: String,
    },

    #[error("webhook signature invalid")]
    SignatureInvalid,

    #[error("webhook payload invalid: {0}")]
    Payload(String),

    #[error("authorization failed: {0}")]
    Auth(String),

    #[error("marketplace returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("marketplace call timed out")]
    Timeout,

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl PlatformError {
    pub fn payload(msg: impl Into<String>) -> Self {
        PlatformError::Payload(msg.into())
    }

    /// Whether retrying an idempotent call may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            PlatformError::Network(_) | PlatformError::Timeout => true,
            PlatformError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, PlatformError::Http { status: 401, .. })
    }

    /// Copy of this error for callers that waited on the same failed call
    pub(crate) fn replay(&self) -> Self {
        match self {
            PlatformError::Unsupported(s) => PlatformError::Unsupported(s.clone()),
            PlatformError::StoreNotLinked {
                platform,
                platform_store_id,
            } => PlatformError::StoreNotLinked {
                platform: *platform,
                platform_store_id: platform_store_id.clone(),
            },
            PlatformError::SignatureInvalid => PlatformError::SignatureInvalid,
            PlatformError::Payload(s) => PlatformError::Payload(s.clone()),
            PlatformError::Auth(s) => PlatformError::Auth(s.clone()),
            PlatformError::Http { status, body } => PlatformError::Http {
                status: *status,
                body: body.clone(),
            },
            PlatformError::Network(s) => PlatformError::Network(s.clone()),
            PlatformError::Timeout => PlatformError::Timeout,
            // 本地错误不会因为重试而消失
            PlatformError::Order(e) => PlatformError::Auth(e.to_string()),
            PlatformError::Repo(e) => PlatformError::Auth(e.to_string()),
        }
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PlatformError::Timeout
        } else if err.is_decode() {
            PlatformError::Payload(err.to_string())
        } else {
            PlatformError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for PlatformError {
    fn from(err: serde_json::Error) -> Self {
        PlatformError::Payload(err.to_string())
    }
}

impl From<PlatformError> for AppError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::Order(e) => e.into(),
            PlatformError::Repo(e) => e.into(),
            PlatformError::Unsupported(msg) => {
                AppError::with_message(ErrorCode::PlatformNotSupported, msg)
            }
            PlatformError::StoreNotLinked { .. } => {
                AppError::with_message(ErrorCode::PlatformStoreNotFound, err.to_string())
            }
            PlatformError::SignatureInvalid => AppError::new(ErrorCode::WebhookSignatureInvalid),
            PlatformError::Payload(msg) => {
                AppError::with_message(ErrorCode::WebhookPayloadInvalid, msg)
            }
            PlatformError::Auth(cause) => {
                tracing::warn!(cause = %cause, "Marketplace authorization failed");
                AppError::new(ErrorCode::PlatformAuthFailed)
            }
            PlatformError::Timeout => AppError::new(ErrorCode::TimeoutError),
            PlatformError::Http { .. } | PlatformError::Network(_) => {
                // 对外只给通用重试提示
                tracing::warn!(cause = %err, "Marketplace call failed");
                AppError::new(ErrorCode::PlatformApiError)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(PlatformError::Timeout.is_retryable());
        assert!(PlatformError::Network("reset".into()).is_retryable());
        assert!(
            PlatformError::Http {
                status: 503,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(
            PlatformError::Http {
                status: 429,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(
            !PlatformError::Http {
                status: 404,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(!PlatformError::SignatureInvalid.is_retryable());
    }

    #[test]
    fn test_upstream_failure_is_generic() {
        let app: AppError = PlatformError::Http {
            status: 500,
            body: "stack trace".into(),
        }
        .into();
        assert_eq!(app.code, ErrorCode::PlatformApiError);
        assert!(!app.message.contains("stack trace"));
    }
}
