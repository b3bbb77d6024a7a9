//! Order API Module
//!
//! 所有写操作都走 [`OrderService`](crate::orders::OrderService)，外卖单的拒单 /
//! 出餐回传走 [`PlatformOrderService`](crate::platforms::PlatformOrderService)。

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

/// Order router
pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/orders", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/", post(handler::place))
        .route("/{id}", get(handler::get_by_id))
        .route("/{id}/pay", post(handler::mark_paid))
        .route("/{id}/status", post(handler::advance_status))
        .route("/{id}/adjust", post(handler::adjust))
        .route("/{id}/cancel", post(handler::cancel))
        // 外卖单
        .route("/{id}/platform/deny", post(handler::platform_deny))
        .route("/{id}/platform/in-progress", post(handler::platform_in_progress))
        .route("/{id}/platform/ready", post(handler::platform_ready))
}
