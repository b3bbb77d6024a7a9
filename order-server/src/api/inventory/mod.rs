//! Inventory API Module
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /api/inventory/{store_id}/items/{item_id}/adjust | POST | 手动加 / 减 / 报损 / 调拨 |
//! | /api/inventory/{store_id}/items/{item_id}/sold-out | POST | 设置售罄 |
//! | /api/inventory/{store_id}/items/{item_id}/log | GET | 变更日志 |
//! | /api/inventory/{store_id}/stats | GET | 消耗统计 |

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/inventory/{store_id}", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/items/{item_id}/adjust", post(handler::adjust))
        .route("/items/{item_id}/sold-out", post(handler::set_sold_out))
        .route("/items/{item_id}/log", get(handler::log))
        .route("/stats", get(handler::stats))
}
