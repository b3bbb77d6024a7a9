//! AppError 与错误响应体

use super::category::ErrorCategory;
use super::codes::ErrorCode;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Error carried across the HTTP boundary
///
/// Domain errors (`OrderError`, `StockError`, ...) convert into this at the
/// handler edge; the code decides the HTTP status.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
    /// Structured context (item id, available quantity, ...)
    pub details: Option<BTreeMap<String, Value>>,
}

impl AppError {
    /// Error with the default message of `code`
    pub fn new(code: ErrorCode) -> Self {
        Self::with_message(code, code.message())
    }

    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::ValidationFailed, msg)
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        let resource = resource.into();
        Self::with_message(ErrorCode::NotFound, format!("{resource} not found"))
            .with_detail("resource", resource)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::InternalError, msg)
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::DatabaseError, msg)
    }

    /// Body sent to the client
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code.code(),
            category: self.code.category(),
            message: self.message.clone(),
            retryable: self.code.is_retryable(),
            details: self.details.clone(),
        }
    }
}

/// JSON body of every failed request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: u16,
    pub category: ErrorCategory,
    pub message: String,
    /// 客户端可以原样重试 (上游超时、系统繁忙)
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<BTreeMap<String, Value>>,
}

pub type AppResult<T> = Result<T, AppError>;

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.http_status();
        match self.code.category() {
            ErrorCategory::System => {
                tracing::error!(code = %self.code, message = %self.message, "System error")
            }
            ErrorCategory::Platform if status.is_server_error() => {
                tracing::warn!(code = %self.code, message = %self.message, "Marketplace error")
            }
            _ => {}
        }
        (status, axum::Json(self.body())).into_response()
    }
}
