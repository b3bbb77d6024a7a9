//! Order Validator
//!
//! 提交前的全部检查，按顺序: (a) 库存 (菜品 + 选项绑定的库存品项)，
//! (b) 套餐购买资格，(c) 优惠凭证。通过后输出一次性算好的预留计划，
//! 提交阶段不再重新推导。
//!
//! 外卖平台订单走 [`ValidationMode::Lenient`]: 未匹配目录或库存不足只记
//! warning 并跳过，不拒单。

use std::collections::{BTreeMap, HashMap};

use shared::models::{AppliedDiscount, DiscountInput, LineItem};
use sqlx::SqlitePool;

use super::error::OrderError;
use super::pricing::item_names;
use crate::db::repository::bundle;
use crate::inventory::StockLedger;
use crate::promotion::{CreditScope, PromotionLedger};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Storefront / POS: first blocking reason rejects the order
    Strict,
    /// Marketplace: local bookkeeping mismatches become warnings
    Lenient,
}

/// A proposed order, before anything is persisted
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub brand_id: i64,
    pub store_id: i64,
    pub user_id: Option<i64>,
    pub items: Vec<LineItem>,
    pub discounts: Vec<DiscountInput>,
}

/// Catalog item → aggregate quantity to reserve
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationPlan {
    items: BTreeMap<i64, i64>,
}

impl ReservationPlan {
    /// Dish templates plus every stock-tracked entry a chosen option is bound to
    pub fn from_items(items: &[LineItem]) -> Self {
        let mut plan = Self::default();
        for item in items {
            let LineItem::Dish(d) = item else { continue };
            let qty = i64::from(d.quantity);
            if let Some(template_id) = d.template_id {
                plan.add(template_id, qty);
            }
            for option in &d.options {
                if let Some(bound) = option.bound_template_id {
                    plan.add(bound, qty);
                }
            }
        }
        plan
    }

    pub fn add(&mut self, item_id: i64, quantity: i64) {
        *self.items.entry(item_id).or_default() += quantity;
    }

    pub fn remove(&mut self, item_id: i64) -> Option<i64> {
        self.items.remove(&item_id)
    }

    pub fn quantity(&self, item_id: i64) -> i64 {
        self.items.get(&item_id).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// `(item_id, quantity)` pairs in item order
    pub fn entries(&self) -> Vec<(i64, i64)> {
        self.items.iter().map(|(k, v)| (*k, *v)).collect()
    }
}

/// Validator output
#[derive(Debug, Clone, Default)]
pub struct ValidatedOrder {
    pub plan: ReservationPlan,
    pub discounts: Vec<AppliedDiscount>,
    pub warnings: Vec<String>,
}

#[derive(Clone)]
pub struct OrderValidator {
    pool: SqlitePool,
    stock: StockLedger,
    promotions: PromotionLedger,
}

impl OrderValidator {
    pub fn new(pool: SqlitePool, stock: StockLedger, promotions: PromotionLedger) -> Self {
        Self {
            pool,
            stock,
            promotions,
        }
    }

    pub async fn validate(
        &self,
        draft: &OrderDraft,
        mode: ValidationMode,
    ) -> Result<ValidatedOrder, OrderError> {
        let mut out = ValidatedOrder {
            plan: ReservationPlan::from_items(&draft.items),
            ..Default::default()
        };

        self.check_stock(draft, mode, &mut out).await?;
        self.check_bundles(draft, mode, &mut out).await?;

        let scope = CreditScope::new(
            draft.brand_id,
            draft.user_id,
            draft.items.iter().filter_map(|i| match i {
                LineItem::Dish(d) => Some(d),
                LineItem::Bundle(_) => None,
            }),
        );
        out.discounts = self
            .promotions
            .validate_all(&draft.discounts, &scope)
            .await?;

        Ok(out)
    }

    async fn check_stock(
        &self,
        draft: &OrderDraft,
        mode: ValidationMode,
        out: &mut ValidatedOrder,
    ) -> Result<(), OrderError> {
        let names = item_names(&draft.items);
        for (item_id, quantity) in out.plan.entries() {
            let Err(err) = self.stock.check(draft.store_id, item_id, quantity).await else {
                continue;
            };
            let name = names
                .get(&item_id)
                .cloned()
                .unwrap_or_else(|| format!("item {item_id}"));
            match mode {
                ValidationMode::Lenient if err.is_conflict() => {
                    out.warnings.push(format!("'{name}': {err}, not reserved"));
                    out.plan.remove(item_id);
                }
                _ => return Err(OrderError::stock(name, err)),
            }
        }
        Ok(())
    }

    async fn check_bundles(
        &self,
        draft: &OrderDraft,
        mode: ValidationMode,
        out: &mut ValidatedOrder,
    ) -> Result<(), OrderError> {
        let mut requested: HashMap<i64, i64> = HashMap::new();
        for item in &draft.items {
            if let LineItem::Bundle(b) = item {
                *requested.entry(b.bundle_id).or_default() += i64::from(b.quantity);
            }
        }
        if requested.is_empty() {
            return Ok(());
        }

        let now = shared::util::now_millis();
        for (bundle_id, quantity) in requested {
            let found = bundle::find_by_id(&self.pool, bundle_id)
                .await?
                .ok_or(OrderError::BundleNotFound(bundle_id))?;
            let reason = match eligibility(&found, draft.user_id, quantity, now) {
                Err(reason) => Some(reason),
                Ok(()) => match (found.purchase_limit, draft.user_id) {
                    (Some(limit), Some(user_id)) => {
                        let held = bundle::purchased_quantity(&self.pool, bundle_id, user_id).await?;
                        (held + quantity > limit)
                            .then(|| format!("limit {limit} per customer, already holds {held}"))
                    }
                    _ => None,
                },
            };
            if let Some(reason) = reason {
                match mode {
                    ValidationMode::Strict => {
                        return Err(OrderError::BundleIneligible {
                            bundle_id,
                            name: found.name,
                            reason,
                        });
                    }
                    ValidationMode::Lenient => {
                        out.warnings.push(format!("'{}': {reason}", found.name));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Active flag, sale window and per-customer limit preconditions
fn eligibility(
    found: &shared::models::Bundle,
    user_id: Option<i64>,
    quantity: i64,
    now: i64,
) -> Result<(), String> {
    if !found.is_active {
        return Err("not on sale".into());
    }
    if found.valid_from.is_some_and(|from| now < from) {
        return Err("sale has not started".into());
    }
    if found.valid_until.is_some_and(|until| now > until) {
        return Err("sale has ended".into());
    }
    if user_id.is_none() {
        // 套餐券发给会员，游客不能购买
        return Err("requires a signed-in customer".into());
    }
    if let Some(limit) = found.purchase_limit {
        if quantity > limit {
            return Err(format!("limit {limit} per customer"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{Bundle, DishLine, SelectedOption};

    fn dish(template_id: Option<i64>, quantity: i32, bound: Option<i64>) -> LineItem {
        LineItem::Dish(DishLine {
            template_id,
            name: "dish".into(),
            unit_price: 100.0,
            quantity,
            options: bound
                .map(|b| SelectedOption {
                    option_id: Some(9),
                    name: "egg".into(),
                    price_modifier: 10.0,
                    bound_template_id: Some(b),
                })
                .into_iter()
                .collect(),
            subtotal: 0.0,
            note: None,
            external_id: None,
        })
    }

    fn bundle(limit: Option<i64>) -> Bundle {
        Bundle {
            id: 1,
            brand_id: 1,
            name: "Lunch pack".into(),
            price: 500.0,
            is_active: true,
            valid_from: Some(1_000),
            valid_until: Some(2_000),
            purchase_limit: limit,
            voucher_validity_days: 30,
            created_at: 0,
        }
    }

    #[test]
    fn test_plan_aggregates_dishes_and_bound_options() {
        let items = [
            dish(Some(1), 2, Some(5)),
            dish(Some(1), 1, None),
            dish(Some(2), 3, Some(5)),
            dish(None, 4, None),
        ];
        let plan = ReservationPlan::from_items(&items);
        assert_eq!(plan.quantity(1), 3);
        assert_eq!(plan.quantity(2), 3);
        assert_eq!(plan.quantity(5), 5);
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.entries(), vec![(1, 3), (2, 3), (5, 5)]);
    }

    #[test]
    fn test_bundle_window() {
        let b = bundle(None);
        assert!(eligibility(&b, Some(1), 1, 1_500).is_ok());
        assert_eq!(eligibility(&b, Some(1), 1, 500).unwrap_err(), "sale has not started");
        assert_eq!(eligibility(&b, Some(1), 1, 2_500).unwrap_err(), "sale has ended");
    }

    #[test]
    fn test_bundle_requires_customer_and_limit() {
        let b = bundle(Some(2));
        assert!(eligibility(&b, None, 1, 1_500).is_err());
        assert!(eligibility(&b, Some(1), 3, 1_500).is_err());
        assert!(eligibility(&b, Some(1), 2, 1_500).is_ok());

        let mut inactive = bundle(None);
        inactive.is_active = false;
        assert_eq!(eligibility(&inactive, Some(1), 1, 1_500).unwrap_err(), "not on sale");
    }
}
