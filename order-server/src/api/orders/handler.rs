//! Order API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use shared::models::{
    AdjustOrderRequest, AdvanceStatusRequest, CancelOrderRequest, CancelOutcome, MarkPaidRequest,
    Order, PlaceOrderRequest, PlacedOrder,
};

use crate::core::ServerState;
use crate::platforms::DenyReason;
use crate::utils::AppResult;

/// Place an order (storefront / POS)
pub async fn place(
    State(state): State<ServerState>,
    Json(payload): Json<PlaceOrderRequest>,
) -> AppResult<Json<PlacedOrder>> {
    let placed = state.orders.place_order(payload).await?;
    Ok(Json(placed))
}

/// Get order by id
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Order>> {
    Ok(Json(state.orders.find(id).await?))
}

/// Payment callback / cashier confirmation
pub async fn mark_paid(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Json(payload): Json<MarkPaidRequest>,
) -> AppResult<Json<PlacedOrder>> {
    Ok(Json(state.orders.mark_paid(id, payload).await?))
}

pub async fn advance_status(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Json(payload): Json<AdvanceStatusRequest>,
) -> AppResult<Json<Order>> {
    Ok(Json(state.orders.advance_status(id, payload.status).await?))
}

pub async fn adjust(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Json(payload): Json<AdjustOrderRequest>,
) -> AppResult<Json<Order>> {
    let order = state
        .orders
        .adjust_total(id, payload.manual_adjustment, &payload.actor)
        .await?;
    Ok(Json(order))
}

pub async fn cancel(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Json(payload): Json<CancelOrderRequest>,
) -> AppResult<Json<CancelOutcome>> {
    let outcome = state
        .orders
        .cancel(id, &payload.reason, &payload.actor)
        .await?;
    Ok(Json(outcome))
}

/// Deny reason as sent by the POS
#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "message")]
pub enum DenyRequest {
    StoreClosed,
    ItemUnavailable,
    TooBusy,
    Other(String),
}

impl From<DenyRequest> for DenyReason {
    fn from(req: DenyRequest) -> Self {
        match req {
            DenyRequest::StoreClosed => DenyReason::StoreClosed,
            DenyRequest::ItemUnavailable => DenyReason::ItemUnavailable,
            DenyRequest::TooBusy => DenyReason::TooBusy,
            DenyRequest::Other(text) => DenyReason::Other(text),
        }
    }
}

pub async fn platform_deny(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Json(payload): Json<DenyRequest>,
) -> AppResult<Json<CancelOutcome>> {
    Ok(Json(state.platforms.deny(id, payload.into()).await?))
}

pub async fn platform_in_progress(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Order>> {
    Ok(Json(state.platforms.mark_in_progress(id).await?))
}

pub async fn platform_ready(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Order>> {
    Ok(Json(state.platforms.mark_ready(id).await?))
}
