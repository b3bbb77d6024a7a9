//! API 路由模块
//!
//! 薄 HTTP 层，鉴权中间件不在这里 (由网关负责)。
//!
//! # 结构
//!
//! - [`health`] - 健康检查
//! - [`orders`] - 下单、支付、状态、调账、取消、外卖单拒单/出餐
//! - [`inventory`] - 手动库存调整、变更日志、消耗统计
//! - [`promotions`] - 积分规则
//! - [`webhooks`] - 外卖平台 webhook

pub mod health;
pub mod inventory;
pub mod orders;
pub mod promotions;
pub mod webhooks;

use axum::Router;
use http::{HeaderName, HeaderValue};
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::core::ServerState;

// Re-export common types for handlers
pub use crate::utils::{AppError, AppResult};

/// Request ID generator (snowflake)
#[derive(Clone)]
struct XRequestId;

impl MakeRequestId for XRequestId {
    fn make_request_id<B>(&mut self, _request: &http::Request<B>) -> Option<RequestId> {
        let id = shared::util::snowflake_id().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// All routes, no middleware
pub fn build_router() -> Router<ServerState> {
    Router::new()
        .merge(health::router())
        .merge(orders::router())
        .merge(inventory::router())
        .merge(promotions::router())
        .merge(webhooks::router())
}

/// Routes plus the tower-http middleware stack
pub fn build_app() -> Router<ServerState> {
    build_router()
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static("x-request-id"),
            XRequestId,
        ))
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            "x-request-id",
        )))
}
