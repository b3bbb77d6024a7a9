//! Order Server - 餐厅订单履约核心
//!
//! # 架构概述
//!
//! 把购物车 (门店下单或外卖平台推单) 变成已提交订单，同时守住两条约束：
//! 库存永不为负；每张优惠凭证 (积分 / 优惠券 / 兑换券) 在订单取消前最多核销一次。
//!
//! - **库存** (`inventory`): Stock Ledger，条件扣减 + 追加式变更日志
//! - **优惠** (`promotion`): Promotion Ledger，核销 / 恢复 / 积分发放 / 套餐券
//! - **订单** (`orders`): 校验器、提交流水线 (补偿栈)、取消回滚
//! - **外卖平台** (`platforms`): Credential Cache、Uber Eats / Foodpanda adapter、接单期限
//! - **HTTP API** (`api`): 薄路由层
//!
//! # 模块结构
//!
//! ```text
//! order-server/src/
//! ├── core/          # 配置、状态、启动错误
//! ├── api/           # HTTP 路由和处理器
//! ├── db/            # SQLite 连接池与 repository
//! ├── inventory/     # Stock Ledger
//! ├── promotion/     # Promotion Ledger
//! ├── orders/        # 校验、提交、取消
//! ├── platforms/     # 外卖平台接入
//! └── utils/         # 错误、日志、时间、输入校验
//! ```

pub mod api;
pub mod core;
pub mod db;
pub mod inventory;
pub mod orders;
pub mod platforms;
pub mod promotion;
pub mod utils;

// Re-export 公共类型
pub use core::{Config, Server, ServerState};
pub use utils::{AppError, AppResult};

// Re-export unified error types from shared
pub use utils::{ErrorBody, ErrorCategory, ErrorCode};

// Re-export logger functions
pub use utils::logger::{LogFormat, init_logger, init_logger_with_file};

/// 按配置初始化日志 (调用前先加载 `.env`)
pub fn setup_environment(config: &Config) {
    let format = if config.is_production() {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_logger_with_file(Some(&config.log_level), config.log_dir.as_deref(), format);
}
