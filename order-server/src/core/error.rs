//! 启动 / 运行期错误
//!
//! 请求级错误走 [`AppError`](crate::utils::AppError)；这里只覆盖进程启动
//! (数据库、HTTP client、端口绑定) 的失败。

use thiserror::Error;

use crate::platforms::PlatformError;
use crate::utils::AppError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("数据库初始化失败: {0}")]
    Database(#[from] AppError),

    #[error("平台客户端初始化失败: {0}")]
    Platform(#[from] PlatformError),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("内部服务器错误: {0}")]
    Internal(#[from] anyhow::Error),
}

/// 启动流程的 Result 类型别名
pub type Result<T> = std::result::Result<T, ServerError>;
