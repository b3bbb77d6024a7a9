//! Order Commit Pipeline
//!
//! `draft → validated → persisted → stock-reserved → promotions-redeemed →
//! [paid-effects-applied]`
//!
//! 这是创建订单的唯一入口。持久化之后任何一步失败，都按补偿栈逆序撤销
//! 已完成的步骤再返回错误。

use chrono_tz::Tz;
use shared::models::{
    AppliedDiscount, LineItem, Order, OrderStatus, OrderType, PaymentMethod, PlaceOrderRequest,
    PlacedOrder, PlatformOrigin, Store,
};
use sqlx::SqlitePool;

use super::compensation::{Compensation, CompensationStack};
use super::error::OrderError;
use super::money::money_eq;
use super::pricing;
use super::validator::{OrderDraft, OrderValidator, ReservationPlan, ValidationMode};
use crate::db::repository::{order, sequence, store};
use crate::inventory::StockLedger;
use crate::promotion::PromotionLedger;
use crate::utils::time::business_date;
use crate::utils::validation::{
    MAX_NAME_LEN, MAX_NOTE_LEN, validate_amount, validate_optional_text,
};

/// Marketplace order mapped to internal line items by a platform adapter
#[derive(Debug, Clone)]
pub struct ExternalOrderDraft {
    pub store_id: i64,
    pub order_type: OrderType,
    pub guest_name: Option<String>,
    pub items: Vec<LineItem>,
    pub origin: PlatformOrigin,
}

#[derive(Clone)]
pub struct OrderService {
    pub(super) pool: SqlitePool,
    pub(super) tz: Tz,
    pub(super) stock: StockLedger,
    pub(super) promotions: PromotionLedger,
    validator: OrderValidator,
}

impl OrderService {
    pub fn new(pool: SqlitePool, tz: Tz, stock: StockLedger, promotions: PromotionLedger) -> Self {
        let validator = OrderValidator::new(pool.clone(), stock.clone(), promotions.clone());
        Self {
            pool,
            tz,
            stock,
            promotions,
            validator,
        }
    }

    pub fn stock(&self) -> &StockLedger {
        &self.stock
    }

    pub fn promotions(&self) -> &PromotionLedger {
        &self.promotions
    }

    pub async fn find(&self, order_id: i64) -> Result<Order, OrderError> {
        order::find_by_id(&self.pool, order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))
    }

    /// Place a storefront / POS order (strict validation)
    pub async fn place_order(&self, req: PlaceOrderRequest) -> Result<PlacedOrder, OrderError> {
        validate_optional_text(&req.guest_name, "guest_name", MAX_NAME_LEN)?;
        validate_optional_text(&req.payment_reference, "payment_reference", MAX_NOTE_LEN)?;
        for discount in &req.discounts {
            validate_amount(discount.claimed_amount(), "discount amount")?;
        }

        let store = self.load_store(req.store_id).await?;
        if store.brand_id != req.brand_id {
            return Err(OrderError::StoreNotFound(req.store_id));
        }

        let items = pricing::resolve_items(&self.pool, &store, &req.items).await?;
        let draft = OrderDraft {
            brand_id: store.brand_id,
            store_id: store.id,
            user_id: req.user_id,
            items,
            discounts: req.discounts.clone(),
        };
        let validated = self.validator.validate(&draft, ValidationMode::Strict).await?;
        log_corrections(&validated.discounts);

        let paid = req.payment_method.settles_immediately() || req.payment_confirmed;
        let now = shared::util::now_millis();
        let mut new_order = Order {
            id: shared::util::snowflake_id(),
            brand_id: store.brand_id,
            store_id: store.id,
            sequence_code: String::new(),
            user_id: req.user_id,
            guest_name: req.guest_name,
            order_type: req.order_type,
            items: draft.items,
            dish_subtotal: 0.0,
            bundle_subtotal: 0.0,
            service_charge: 0.0,
            discounts: validated.discounts,
            total_discount: 0.0,
            manual_adjustment: 0.0,
            total: 0.0,
            status: if paid {
                OrderStatus::Paid
            } else {
                OrderStatus::Pending
            },
            payment_method: req.payment_method,
            paid_at: paid.then_some(now),
            payment_reference: req.payment_reference,
            points_awarded: 0,
            platform: None,
            cancel_reason: None,
            cancelled_by: None,
            created_at: now,
            updated_at: now,
        };
        let totals = pricing::compute_totals(
            &new_order.items,
            new_order.order_type,
            store.service_charge_rate,
            &new_order.discounts,
            0.0,
            store.currency_decimals,
        );
        pricing::apply_totals(&mut new_order, &totals);

        let committed = self
            .commit(new_order, validated.plan, ValidationMode::Strict)
            .await?;
        tracing::info!(
            order_id = committed.id,
            sequence_code = %committed.sequence_code,
            total = committed.total,
            status = %committed.status,
            "Order placed"
        );

        let points_awarded = committed.is_paid().then_some(committed.points_awarded);
        Ok(PlacedOrder {
            order: committed,
            points_awarded,
        })
    }

    /// Commit a marketplace order (lenient validation, settled by the platform)
    pub async fn ingest_external(&self, draft: ExternalOrderDraft) -> Result<Order, OrderError> {
        let store = self.load_store(draft.store_id).await?;
        let proposed = OrderDraft {
            brand_id: store.brand_id,
            store_id: store.id,
            user_id: None,
            items: draft.items,
            discounts: Vec::new(),
        };
        let validated = self
            .validator
            .validate(&proposed, ValidationMode::Lenient)
            .await?;

        let mut origin = draft.origin;
        origin.warnings.extend(validated.warnings);

        let now = shared::util::now_millis();
        let mut new_order = Order {
            id: shared::util::snowflake_id(),
            brand_id: store.brand_id,
            store_id: store.id,
            sequence_code: String::new(),
            user_id: None,
            guest_name: draft.guest_name,
            order_type: draft.order_type,
            items: proposed.items,
            dish_subtotal: 0.0,
            bundle_subtotal: 0.0,
            service_charge: 0.0,
            discounts: Vec::new(),
            total_discount: 0.0,
            manual_adjustment: 0.0,
            total: 0.0,
            status: OrderStatus::Paid,
            payment_method: PaymentMethod::Platform,
            paid_at: Some(now),
            payment_reference: Some(origin.platform_order_id.clone()),
            points_awarded: 0,
            platform: Some(origin),
            cancel_reason: None,
            cancelled_by: None,
            created_at: now,
            updated_at: now,
        };
        let totals = pricing::compute_totals(
            &new_order.items,
            new_order.order_type,
            store.service_charge_rate,
            &[],
            0.0,
            store.currency_decimals,
        );
        pricing::apply_totals(&mut new_order, &totals);

        let committed = self
            .commit(new_order, validated.plan, ValidationMode::Lenient)
            .await?;
        tracing::info!(
            order_id = committed.id,
            sequence_code = %committed.sequence_code,
            total = committed.total,
            "External order committed"
        );
        Ok(committed)
    }

    async fn load_store(&self, store_id: i64) -> Result<Store, OrderError> {
        store::find_by_id(&self.pool, store_id)
            .await?
            .filter(|s| s.is_active)
            .ok_or(OrderError::StoreNotFound(store_id))
    }

    async fn next_sequence_code(
        &self,
        store_id: i64,
        order_type: OrderType,
        at: i64,
    ) -> Result<String, OrderError> {
        let prefix = order_type.sequence_prefix().to_string();
        let date = business_date(at, self.tz).format("%Y-%m-%d").to_string();
        let n = sequence::next_value(&self.pool, store_id, &date, &prefix).await?;
        Ok(format!("{prefix}{n:03}"))
    }

    /// Persist, reserve, redeem and (if paid) apply paid effects
    async fn commit(
        &self,
        mut new_order: Order,
        mut plan: ReservationPlan,
        mode: ValidationMode,
    ) -> Result<Order, OrderError> {
        new_order.sequence_code = self
            .next_sequence_code(new_order.store_id, new_order.order_type, new_order.created_at)
            .await?;

        // persisted: 唯一索引冲突 (重复的平台订单) 在这里失败，还没有任何预留
        order::insert(&self.pool, &new_order).await?;
        let mut undo = CompensationStack::new();
        undo.push(Compensation::DeleteOrder(new_order.id));

        // stock-reserved
        let shortfalls = match self.reserve(&new_order, &mut plan, mode).await {
            Ok(shortfalls) => shortfalls,
            Err(e) => return Err(self.abort(undo, new_order.id, e).await),
        };
        undo.push(Compensation::RestoreStock(new_order.id));
        if !shortfalls.is_empty() {
            if let Some(origin) = new_order.platform.as_mut() {
                origin.warnings.extend(shortfalls);
                if let Err(e) =
                    order::update_platform_origin(&self.pool, new_order.id, origin, new_order.updated_at)
                        .await
                {
                    return Err(self.abort(undo, new_order.id, e.into()).await);
                }
            }
        }

        // promotions-redeemed
        if let Err(e) = self.promotions.redeem(&new_order.discounts, new_order.id).await {
            return Err(self.abort(undo, new_order.id, e.into()).await);
        }
        undo.push(Compensation::RestorePromotions(new_order.id));

        // paid-effects-applied
        if new_order.is_paid() {
            match self.apply_paid_effects(&new_order, &mut undo).await {
                Ok(points) => new_order.points_awarded = points,
                Err(e) => return Err(self.abort(undo, new_order.id, e).await),
            }
        }

        Ok(new_order)
    }

    /// Reserve the plan in one shot. Lenient mode drops items the ledger
    /// rejects and retries; the dropped items come back as warnings.
    async fn reserve(
        &self,
        placed: &Order,
        plan: &mut ReservationPlan,
        mode: ValidationMode,
    ) -> Result<Vec<String>, OrderError> {
        let mut shortfalls = Vec::new();
        loop {
            if plan.is_empty() {
                return Ok(shortfalls);
            }
            match self
                .stock
                .reserve_many(placed.store_id, &plan.entries(), placed.id)
                .await
            {
                Ok(moved) => {
                    tracing::debug!(order_id = placed.id, items = moved.len(), "Stock reserved");
                    return Ok(shortfalls);
                }
                Err(e) => {
                    let name = item_name(placed, e.item_id());
                    let droppable = mode == ValidationMode::Lenient && e.is_conflict();
                    match e.item_id().filter(|_| droppable) {
                        Some(item_id) if plan.remove(item_id).is_some() => {
                            shortfalls.push(format!("'{name}': {e}, not reserved"));
                        }
                        _ => return Err(OrderError::stock(name, e)),
                    }
                }
            }
        }
    }

    /// Award points and issue bundle vouchers for a paid order
    pub(super) async fn apply_paid_effects(
        &self,
        paid: &Order,
        undo: &mut CompensationStack,
    ) -> Result<i64, OrderError> {
        let points = self.promotions.award_points(paid).await?;
        if points > 0 {
            undo.push(Compensation::RevokePoints(paid.id));
        }
        let vouchers = self.promotions.issue_bundle_vouchers(paid).await?;
        if !vouchers.is_empty() {
            undo.push(Compensation::InvalidateVouchers(paid.id));
        }
        Ok(points)
    }

    async fn abort(&self, undo: CompensationStack, order_id: i64, err: OrderError) -> OrderError {
        tracing::warn!(order_id, error = %err, steps = undo.len(), "Order commit failed, compensating");
        let failures = undo
            .unwind(&self.pool, &self.stock, &self.promotions)
            .await;
        if !failures.is_empty() {
            tracing::error!(order_id, failures = ?failures, "Compensation incomplete");
        }
        err
    }
}

fn item_name(placed: &Order, item_id: Option<i64>) -> String {
    let Some(item_id) = item_id else {
        return "order".into();
    };
    pricing::item_names(&placed.items)
        .remove(&item_id)
        .unwrap_or_else(|| format!("item {item_id}"))
}

/// 前端提交的折扣金额和重新推导的不一致时，以推导值为准并记录
fn log_corrections(discounts: &[AppliedDiscount]) {
    for d in discounts {
        if !money_eq(d.claimed_amount, d.amount) {
            tracing::warn!(
                discount_model = ?d.discount_model,
                ref_ids = ?d.ref_ids,
                claimed = d.claimed_amount,
                corrected = d.amount,
                "Discount amount corrected"
            );
        }
    }
}
