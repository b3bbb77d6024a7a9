//! 提交失败后的补偿回滚
//!
//! 用 SQLite 触发器让某一步写入失败，检查订单、库存、兑换券的最终状态。

mod common;

use common::*;
use order_server::db::repository::{order, promotion};
use order_server::orders::compensation::{Compensation, CompensationStack};
use shared::models::{
    DiscountInput, LineItemInput, OrderStatus, OrderType, PaymentMethod, PlaceOrderRequest,
    StockChangeReason,
};

fn beef_with_voucher(voucher_id: i64) -> PlaceOrderRequest {
    PlaceOrderRequest {
        brand_id: BRAND_ID,
        store_id: STORE_ID,
        user_id: Some(USER_ID),
        guest_name: None,
        order_type: OrderType::Takeout,
        items: vec![
            LineItemInput::Dish {
                template_id: BEEF_NOODLES,
                option_ids: vec![],
                quantity: 2,
                note: None,
            },
            LineItemInput::Dish {
                template_id: PORK_RICE,
                option_ids: vec![],
                quantity: 1,
                note: None,
            },
        ],
        discounts: vec![DiscountInput::Voucher {
            voucher_id,
            amount: 120.0,
        }],
        payment_method: PaymentMethod::Card,
        payment_confirmed: false,
        payment_reference: None,
    }
}

async fn exec(pool: &sqlx::SqlitePool, sql: &str) {
    sqlx::query(sql).execute(pool).await.unwrap();
}

/// 兑换券核销写入失败 (库存已经扣了)
async fn block_voucher_redeem(pool: &sqlx::SqlitePool) {
    exec(
        pool,
        "CREATE TRIGGER block_redeem BEFORE UPDATE OF is_used ON voucher WHEN NEW.is_used = 1 BEGIN SELECT RAISE(ABORT, 'voucher table locked'); END",
    )
    .await;
}

/// 库存恢复日志写不进去，恢复事务整体失败
async fn block_stock_restore(pool: &sqlx::SqlitePool) {
    exec(
        pool,
        "CREATE TRIGGER block_restore BEFORE INSERT ON stock_change_log WHEN NEW.reason = 'order_restore' BEGIN SELECT RAISE(ABORT, 'stock log locked'); END",
    )
    .await;
}

#[tokio::test]
async fn test_failed_redeem_deletes_order_and_returns_stock() {
    let app = setup().await;
    let voucher_id = grant_voucher(app.pool(), BEEF_NOODLES, shared::util::now_millis() + DAY_MS).await;
    block_voucher_redeem(app.pool()).await;

    let result = app.state.orders.place_order(beef_with_voucher(voucher_id)).await;
    assert!(result.is_err());

    assert_eq!(order_count(app.pool()).await, 0);
    assert_eq!(stock_of(app.pool(), BEEF_NOODLES).await, 10);
    assert_eq!(stock_of(app.pool(), PORK_RICE).await, 2);
    let voucher = promotion::find_voucher(app.pool(), voucher_id).await.unwrap().unwrap();
    assert!(!voucher.is_used);

    // 预留和恢复都留在日志里，净变化为 0
    let log: Vec<(String, i64)> =
        sqlx::query_as("SELECT reason, delta FROM stock_change_log ORDER BY created_at, id")
            .fetch_all(app.pool())
            .await
            .unwrap();
    assert_eq!(log.iter().map(|(_, d)| d).sum::<i64>(), 0);
    assert!(log.iter().any(|(r, _)| r == "order_restore"));
}

#[tokio::test]
async fn test_stuck_stock_restore_keeps_order_as_cancelled() {
    let app = setup().await;
    let voucher_id = grant_voucher(app.pool(), BEEF_NOODLES, shared::util::now_millis() + DAY_MS).await;
    block_voucher_redeem(app.pool()).await;
    block_stock_restore(app.pool()).await;

    let result = app.state.orders.place_order(beef_with_voucher(voucher_id)).await;
    assert!(result.is_err());

    // 预留撤不回来: 订单保留为取消状态，库存仍可按订单追溯
    assert_eq!(order_count(app.pool()).await, 1);
    let order_id: i64 = sqlx::query_scalar("SELECT id FROM orders")
        .fetch_one(app.pool())
        .await
        .unwrap();
    let kept = order::find_by_id(app.pool(), order_id).await.unwrap().unwrap();
    assert_eq!(kept.status, OrderStatus::Cancelled);
    assert_eq!(kept.cancel_reason.as_deref(), Some("commit failed"));
    assert_eq!(kept.cancelled_by.as_deref(), Some("system"));
    assert_eq!(stock_of(app.pool(), BEEF_NOODLES).await, 8);

    let log = app.state.stock.log_for_order(order_id).await.unwrap();
    assert!(log.iter().all(|l| l.reason == StockChangeReason::OrderReserve));

    // 故障解除后，按订单重放即可把库存还回去
    exec(app.pool(), "DROP TRIGGER block_restore").await;
    app.state.stock.restore(order_id).await.unwrap();
    assert_eq!(stock_of(app.pool(), BEEF_NOODLES).await, 10);
    assert_eq!(stock_of(app.pool(), PORK_RICE).await, 2);
}

#[tokio::test]
async fn test_unwind_reverts_committed_order() {
    let app = setup().await;
    let voucher_id = grant_voucher(app.pool(), BEEF_NOODLES, shared::util::now_millis() + DAY_MS).await;
    let placed = app
        .state
        .orders
        .place_order(beef_with_voucher(voucher_id))
        .await
        .unwrap();
    let order_id = placed.order.id;
    assert_eq!(stock_of(app.pool(), BEEF_NOODLES).await, 8);

    let mut undo = CompensationStack::new();
    undo.push(Compensation::DeleteOrder(order_id));
    undo.push(Compensation::RestoreStock(order_id));
    undo.push(Compensation::RestorePromotions(order_id));
    assert_eq!(undo.len(), 3);

    let failures = undo
        .unwind(app.pool(), &app.state.stock, &app.state.promotions)
        .await;
    assert!(failures.is_empty(), "{failures:?}");

    assert!(order::find_by_id(app.pool(), order_id).await.unwrap().is_none());
    assert_eq!(stock_of(app.pool(), BEEF_NOODLES).await, 10);
    assert_eq!(stock_of(app.pool(), PORK_RICE).await, 2);
    let voucher = promotion::find_voucher(app.pool(), voucher_id).await.unwrap().unwrap();
    assert!(!voucher.is_used);
    assert!(voucher.used_by_order_id.is_none());
}
