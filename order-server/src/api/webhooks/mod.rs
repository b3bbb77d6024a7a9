//! Marketplace webhooks
//!
//! `POST /api/webhooks/{platform}`: body 原样交给 adapter 校验签名 (需要原始
//! 字节)。新订单入库后在后台发送 accept，webhook 本身立即返回。

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    routing::post,
};
use shared::models::Platform;

use crate::core::ServerState;
use crate::platforms::WebhookOutcome;
use crate::utils::{AppError, AppResult};

pub fn router() -> Router<ServerState> {
    Router::new().route("/api/webhooks/{platform}", post(receive))
}

async fn receive(
    State(state): State<ServerState>,
    Path(platform): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<WebhookOutcome>> {
    let platform: Platform = platform.parse().map_err(AppError::not_found)?;
    let outcome = state
        .platforms
        .handle_webhook(platform, &headers, &body)
        .await?;
    if let Some(order_id) = outcome.pending_accept() {
        state.spawn_accept(order_id);
    }
    Ok(Json(outcome))
}
