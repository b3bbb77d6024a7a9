//! Inventory API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use shared::models::{ConsumptionStat, InventoryRecord, StockAdjustment, StockChangeLog};

use crate::core::ServerState;
use crate::utils::AppResult;

pub async fn adjust(
    State(state): State<ServerState>,
    Path((store_id, item_id)): Path<(i64, i64)>,
    Json(payload): Json<StockAdjustment>,
) -> AppResult<Json<InventoryRecord>> {
    Ok(Json(state.stock.adjust(store_id, item_id, &payload).await?))
}

#[derive(Debug, Deserialize)]
pub struct SoldOutRequest {
    pub sold_out: bool,
}

pub async fn set_sold_out(
    State(state): State<ServerState>,
    Path((store_id, item_id)): Path<(i64, i64)>,
    Json(payload): Json<SoldOutRequest>,
) -> AppResult<Json<bool>> {
    state
        .stock
        .set_sold_out(store_id, item_id, payload.sold_out)
        .await?;
    Ok(Json(payload.sold_out))
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

pub async fn log(
    State(state): State<ServerState>,
    Path((store_id, item_id)): Path<(i64, i64)>,
    Query(query): Query<LogQuery>,
) -> AppResult<Json<Vec<StockChangeLog>>> {
    Ok(Json(
        state.stock.log_for_item(store_id, item_id, query.limit).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(default = "default_days")]
    pub days: i64,
}

fn default_days() -> i64 {
    7
}

pub async fn stats(
    State(state): State<ServerState>,
    Path(store_id): Path<i64>,
    Query(query): Query<StatsQuery>,
) -> AppResult<Json<Vec<ConsumptionStat>>> {
    Ok(Json(state.stock.consumption_stats(store_id, query.days).await?))
}
