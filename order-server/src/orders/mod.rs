//! Order fulfillment
//!
//! - **validator**: 提交前检查，产出预留计划 (strict / lenient)
//! - **pipeline**: 创建订单的唯一入口，失败时按补偿栈回滚
//! - **lifecycle**: 支付、运营状态、调账
//! - **cancel**: 取消与资源恢复
//!
//! ```text
//! draft → validated → persisted → stock-reserved → promotions-redeemed → [paid effects]
//!                         ↑_____________ compensation (reverse order) ____________|
//! ```

mod cancel;
pub mod compensation;
pub mod error;
mod lifecycle;
pub mod money;
pub mod pipeline;
pub mod pricing;
pub mod validator;

pub use error::{FailureKind, OrderError};
pub use pipeline::{ExternalOrderDraft, OrderService};
pub use validator::{OrderDraft, OrderValidator, ReservationPlan, ValidatedOrder, ValidationMode};
