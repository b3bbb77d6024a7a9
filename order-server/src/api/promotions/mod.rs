//! Points rule API
//!
//! 同一品牌同时只有一条生效规则；启用新规则在一个事务内停用旧规则。

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use shared::models::{PointsRule, PointsRuleCreate};

use crate::core::ServerState;
use crate::utils::AppResult;

pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/api/points-rules", post(create))
        .route("/api/points-rules/{id}/activate", post(activate))
}

async fn create(
    State(state): State<ServerState>,
    Json(payload): Json<PointsRuleCreate>,
) -> AppResult<Json<PointsRule>> {
    Ok(Json(state.promotions.create_rule(payload).await?))
}

async fn activate(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<PointsRule>> {
    Ok(Json(state.promotions.activate_rule(id).await?))
}
