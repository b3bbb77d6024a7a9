//! 套餐券 / 优惠券 / 积分的兑换与恢复，以及消耗统计

mod common;

use common::*;
use order_server::db::repository::{bundle, promotion};
use order_server::orders::OrderError;
use shared::models::{
    Bundle, BundleDetail, BundleEntry, Coupon, CreditStatus, DiscountInput, LineItemInput,
    OrderStatus, OrderType, PaymentMethod, PlaceOrderRequest, Point,
};

const LUNCH_PACK: i64 = 300;

fn request(items: Vec<LineItemInput>, discounts: Vec<DiscountInput>) -> PlaceOrderRequest {
    PlaceOrderRequest {
        brand_id: BRAND_ID,
        store_id: STORE_ID,
        user_id: Some(USER_ID),
        guest_name: None,
        order_type: OrderType::Takeout,
        items,
        discounts,
        payment_method: PaymentMethod::Cash,
        payment_confirmed: false,
        payment_reference: None,
    }
}

fn beef(quantity: i32) -> LineItemInput {
    LineItemInput::Dish {
        template_id: BEEF_NOODLES,
        option_ids: vec![],
        quantity,
        note: None,
    }
}

/// 200, two beef noodle vouchers per pack, one pack per customer
async fn seed_lunch_pack(pool: &sqlx::SqlitePool) {
    bundle::create(
        pool,
        &BundleDetail {
            bundle: Bundle {
                id: LUNCH_PACK,
                brand_id: BRAND_ID,
                name: "Lunch Pack".into(),
                price: 200.0,
                is_active: true,
                valid_from: None,
                valid_until: None,
                purchase_limit: Some(1),
                voucher_validity_days: 30,
                created_at: 0,
            },
            entries: vec![BundleEntry {
                bundle_id: LUNCH_PACK,
                template_id: BEEF_NOODLES,
                quantity: 2,
            }],
        },
    )
    .await
    .unwrap();
}

async fn grant_points(pool: &sqlx::SqlitePool, count: usize) -> Vec<i64> {
    let now = shared::util::now_millis();
    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        let id = shared::util::snowflake_id();
        promotion::insert_point(
            pool,
            &Point {
                id,
                brand_id: BRAND_ID,
                user_id: USER_ID,
                status: CreditStatus::Active,
                expires_at: now + DAY_MS,
                used_by_order_id: None,
                used_at: None,
                awarded_by_order_id: None,
                restored_at: None,
                created_at: now,
            },
        )
        .await
        .unwrap();
        ids.push(id);
    }
    ids
}

async fn grant_coupon(pool: &sqlx::SqlitePool, value: f64) -> i64 {
    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    promotion::insert_coupon(
        pool,
        &Coupon {
            id,
            brand_id: BRAND_ID,
            user_id: USER_ID,
            name: "Welcome 30 off".into(),
            value,
            template_id: None,
            is_used: false,
            used_at: None,
            used_by_order_id: None,
            is_expired: false,
            expires_at: now + DAY_MS,
            restored_at: None,
            created_at: now,
        },
    )
    .await
    .unwrap();
    id
}

#[tokio::test]
async fn test_bundle_purchase_issues_vouchers_and_cancel_invalidates() {
    let app = setup().await;
    seed_lunch_pack(app.pool()).await;
    let pack = || LineItemInput::Bundle {
        bundle_id: LUNCH_PACK,
        quantity: 1,
    };

    let purchase = app
        .state
        .orders
        .place_order(request(vec![pack()], vec![]))
        .await
        .unwrap();
    assert_eq!(purchase.order.status, OrderStatus::Paid);
    assert_eq!(purchase.order.bundle_subtotal, 200.0);
    assert_eq!(purchase.order.total, 200.0);
    // 套餐不占库存
    assert_eq!(stock_of(app.pool(), BEEF_NOODLES).await, 10);

    let vouchers = promotion::find_vouchers_issued_by(app.pool(), purchase.order.id)
        .await
        .unwrap();
    assert_eq!(vouchers.len(), 2);
    assert!(vouchers.iter().all(|v| v.template_id == BEEF_NOODLES));

    // 每人限购一份
    let err = app
        .state
        .orders
        .place_order(request(vec![pack()], vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::BundleIneligible { .. }), "{err:?}");

    // 用掉一张，然后取消套餐单
    let redeemed = vouchers[0].id;
    app.state
        .orders
        .place_order(request(
            vec![beef(1)],
            vec![DiscountInput::Voucher {
                voucher_id: redeemed,
                amount: 120.0,
            }],
        ))
        .await
        .unwrap();

    let outcome = app
        .state
        .orders
        .cancel(purchase.order.id, "refund requested", "manager")
        .await
        .unwrap();
    assert!(
        outcome.warnings.iter().any(|w| w.contains("already redeemed")),
        "{:?}",
        outcome.warnings
    );

    let unused = promotion::find_voucher(app.pool(), vouchers[1].id)
        .await
        .unwrap()
        .unwrap();
    assert!(unused.is_invalidated);
    let used = promotion::find_voucher(app.pool(), redeemed).await.unwrap().unwrap();
    assert!(used.is_used);
    assert!(!used.is_invalidated);

    let err = app
        .state
        .orders
        .place_order(request(
            vec![beef(1)],
            vec![DiscountInput::Voucher {
                voucher_id: unused.id,
                amount: 120.0,
            }],
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::Promotion(_)), "{err:?}");
}

#[tokio::test]
async fn test_coupon_and_points_redeemed_then_restored() {
    let app = setup().await;
    let coupon_id = grant_coupon(app.pool(), 30.0).await;
    let point_ids = grant_points(app.pool(), 5).await;
    let spent: Vec<i64> = point_ids[..3].to_vec();

    let mut req = request(
        vec![beef(1)],
        vec![
            DiscountInput::Coupon {
                coupon_id,
                amount: 30.0,
            },
            DiscountInput::Point {
                point_ids: spent.clone(),
                amount: 3.0,
            },
        ],
    );
    req.payment_method = PaymentMethod::Card;
    let placed = app.state.orders.place_order(req).await.unwrap();
    assert_eq!(placed.order.total_discount, 33.0);
    assert_eq!(placed.order.total, 87.0);

    let coupon = promotion::find_coupon(app.pool(), coupon_id).await.unwrap().unwrap();
    assert_eq!(coupon.used_by_order_id, Some(placed.order.id));
    let used = promotion::find_points_used_by(app.pool(), placed.order.id)
        .await
        .unwrap();
    assert_eq!(used.len(), 3);

    // 同一积分不能在一单里出现两次
    let err = app
        .state
        .orders
        .place_order(request(
            vec![beef(1)],
            vec![DiscountInput::Point {
                point_ids: vec![point_ids[3], point_ids[3]],
                amount: 2.0,
            }],
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::Promotion(_)), "{err:?}");

    let outcome = app
        .state
        .orders
        .cancel(placed.order.id, "customer left", "cashier")
        .await
        .unwrap();
    assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);

    let coupon = promotion::find_coupon(app.pool(), coupon_id).await.unwrap().unwrap();
    assert!(!coupon.is_used);
    assert!(coupon.restored_at.is_some());
    for id in spent {
        let point = promotion::find_point(app.pool(), id).await.unwrap().unwrap();
        assert_eq!(point.status, CreditStatus::Active);
        assert!(point.used_by_order_id.is_none());
    }
}

#[tokio::test]
async fn test_consumption_stats_from_order_log() {
    let app = setup().await;
    app.state
        .orders
        .place_order(request(vec![beef(3)], vec![]))
        .await
        .unwrap();

    let stats = app.state.stock.consumption_stats(STORE_ID, 7).await.unwrap();
    let beef_stat = stats.iter().find(|s| s.item_id == BEEF_NOODLES).unwrap();
    assert_eq!(beef_stat.consumed, 3);
    assert_eq!(beef_stat.current_stock, 7);
    assert_eq!(beef_stat.average_daily, 0.43);
    assert_eq!(beef_stat.days_of_cover, Some(16.3));

    let pork = stats.iter().find(|s| s.item_id == PORK_RICE).unwrap();
    assert_eq!(pork.consumed, 0);
    assert_eq!(pork.days_of_cover, None);

    // 未追踪的菜品不出现
    assert!(stats.iter().all(|s| s.item_id != BUBBLE_TEA));

    assert!(app.state.stock.consumption_stats(STORE_ID, 0).await.is_err());
}
