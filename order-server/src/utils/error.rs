//! 统一错误处理
//!
//! 复用 shared 的错误体系，服务端只补充少量转换：
//! - [`AppError`] - 带错误码的应用错误 (实现 axum `IntoResponse`)
//! - [`ErrorBody`] - 失败请求的 JSON 响应体
//!
//! 各业务层 (`StockError`、`PromotionError`、`OrderError`、`PlatformError`)
//! 在各自模块内用 thiserror 定义，并实现 `From<_> for AppError`。

pub use shared::error::{AppError, AppResult, ErrorCategory, ErrorBody, ErrorCode};
