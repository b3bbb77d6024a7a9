//! Promotion Ledger
//!
//! 校验时按凭证自身定义重新推导折扣金额 (voucher = 绑定菜品基础价，
//! coupon = 面额，point = 数量 × 1)，不信任前端提交的金额。
//! 核销与恢复都在单个事务内完成，状态翻转全部是条件 UPDATE。

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use shared::models::{
    AppliedDiscount, CreditStatus, DiscountInput, DiscountModel, DishLine, POINT_UNIT_VALUE,
};
use sqlx::SqlitePool;

use super::error::PromotionError;
use crate::db::repository::promotion::{self, RestoreCounts};
use crate::db::repository::store;
use crate::orders::money::{to_decimal, to_f64};

/// Order facts a credit is validated against
#[derive(Debug, Clone, Default)]
pub struct CreditScope {
    pub brand_id: i64,
    pub user_id: Option<i64>,
    /// template_id → (unit base price, quantity)
    dishes: HashMap<i64, (f64, i64)>,
}

impl CreditScope {
    pub fn new<'a>(
        brand_id: i64,
        user_id: Option<i64>,
        lines: impl IntoIterator<Item = &'a DishLine>,
    ) -> Self {
        let mut dishes: HashMap<i64, (f64, i64)> = HashMap::new();
        for line in lines {
            let Some(template_id) = line.template_id else {
                continue;
            };
            let entry = dishes.entry(template_id).or_insert((line.unit_price, 0));
            entry.1 += i64::from(line.quantity);
        }
        Self {
            brand_id,
            user_id,
            dishes,
        }
    }

    fn dish(&self, template_id: i64) -> Option<(f64, i64)> {
        self.dishes.get(&template_id).copied()
    }
}

#[derive(Clone)]
pub struct PromotionLedger {
    pool: SqlitePool,
}

impl PromotionLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Validate one requested discount and re-derive its amount
    pub async fn validate(
        &self,
        input: &DiscountInput,
        scope: &CreditScope,
    ) -> Result<AppliedDiscount, PromotionError> {
        let (applied, _) = self
            .validate_at(input, scope, shared::util::now_millis())
            .await?;
        Ok(applied)
    }

    /// Validate every requested discount of an order.
    ///
    /// A credit may appear only once, and each voucher needs its own unit of
    /// the bound dish.
    pub async fn validate_all(
        &self,
        inputs: &[DiscountInput],
        scope: &CreditScope,
    ) -> Result<Vec<AppliedDiscount>, PromotionError> {
        let now = shared::util::now_millis();
        let mut seen: HashSet<(DiscountModel, i64)> = HashSet::new();
        let mut voucher_units: HashMap<i64, i64> = HashMap::new();
        let mut applied = Vec::with_capacity(inputs.len());

        for input in inputs {
            let (discount, voucher_template) = self.validate_at(input, scope, now).await?;
            for &id in &discount.ref_ids {
                if !seen.insert((discount.discount_model, id)) {
                    return Err(PromotionError::mismatch(
                        discount.discount_model,
                        id,
                        "referenced more than once",
                    ));
                }
            }
            if let Some(template_id) = voucher_template {
                let used = voucher_units.entry(template_id).or_default();
                *used += 1;
                let available = scope.dish(template_id).map(|(_, q)| q).unwrap_or(0);
                if *used > available {
                    return Err(PromotionError::mismatch(
                        DiscountModel::Voucher,
                        discount.ref_ids.first().copied().unwrap_or_default(),
                        format!("more vouchers than units of dish {template_id}"),
                    ));
                }
            }
            applied.push(discount);
        }
        Ok(applied)
    }

    async fn validate_at(
        &self,
        input: &DiscountInput,
        scope: &CreditScope,
        now: i64,
    ) -> Result<(AppliedDiscount, Option<i64>), PromotionError> {
        let claimed_amount = input.claimed_amount();
        match input {
            DiscountInput::Point { point_ids, .. } => {
                let Some(&first) = point_ids.first() else {
                    return Err(PromotionError::mismatch(
                        DiscountModel::Point,
                        0,
                        "no points referenced",
                    ));
                };
                let user_id = require_user(scope, DiscountModel::Point, first)?;
                for &id in point_ids {
                    let point = promotion::find_point(&self.pool, id)
                        .await?
                        .ok_or(PromotionError::NotFound {
                            model: DiscountModel::Point,
                            id,
                        })?;
                    check_owner(scope, user_id, point.brand_id, point.user_id, DiscountModel::Point, id)?;
                    match point.status {
                        CreditStatus::Used => {
                            return Err(PromotionError::AlreadyUsed {
                                model: DiscountModel::Point,
                                id,
                            });
                        }
                        CreditStatus::Expired => {
                            return Err(PromotionError::Expired {
                                model: DiscountModel::Point,
                                id,
                            });
                        }
                        CreditStatus::Active if point.expires_at <= now => {
                            return Err(PromotionError::Expired {
                                model: DiscountModel::Point,
                                id,
                            });
                        }
                        CreditStatus::Active => {}
                    }
                }
                let amount =
                    Decimal::from(point_ids.len() as i64) * to_decimal(POINT_UNIT_VALUE);
                Ok((
                    AppliedDiscount {
                        discount_model: DiscountModel::Point,
                        ref_ids: point_ids.clone(),
                        claimed_amount,
                        amount: to_f64(amount),
                    },
                    None,
                ))
            }
            DiscountInput::Coupon { coupon_id, .. } => {
                let id = *coupon_id;
                let user_id = require_user(scope, DiscountModel::Coupon, id)?;
                let coupon = promotion::find_coupon(&self.pool, id)
                    .await?
                    .ok_or(PromotionError::NotFound {
                        model: DiscountModel::Coupon,
                        id,
                    })?;
                check_owner(scope, user_id, coupon.brand_id, coupon.user_id, DiscountModel::Coupon, id)?;
                if coupon.is_used {
                    return Err(PromotionError::AlreadyUsed {
                        model: DiscountModel::Coupon,
                        id,
                    });
                }
                if coupon.is_expired || coupon.expires_at <= now {
                    return Err(PromotionError::Expired {
                        model: DiscountModel::Coupon,
                        id,
                    });
                }
                if let Some(template_id) = coupon.template_id {
                    if scope.dish(template_id).is_none() {
                        return Err(PromotionError::mismatch(
                            DiscountModel::Coupon,
                            id,
                            format!("order does not contain dish {template_id}"),
                        ));
                    }
                }
                Ok((
                    AppliedDiscount {
                        discount_model: DiscountModel::Coupon,
                        ref_ids: vec![id],
                        claimed_amount,
                        amount: to_f64(to_decimal(coupon.value)),
                    },
                    None,
                ))
            }
            DiscountInput::Voucher { voucher_id, .. } => {
                let id = *voucher_id;
                let user_id = require_user(scope, DiscountModel::Voucher, id)?;
                let voucher = promotion::find_voucher(&self.pool, id)
                    .await?
                    .ok_or(PromotionError::NotFound {
                        model: DiscountModel::Voucher,
                        id,
                    })?;
                check_owner(scope, user_id, voucher.brand_id, voucher.user_id, DiscountModel::Voucher, id)?;
                if voucher.is_invalidated {
                    return Err(PromotionError::mismatch(
                        DiscountModel::Voucher,
                        id,
                        "voucher was invalidated by a cancelled bundle purchase",
                    ));
                }
                if voucher.is_used {
                    return Err(PromotionError::AlreadyUsed {
                        model: DiscountModel::Voucher,
                        id,
                    });
                }
                if voucher.is_expired || voucher.expires_at <= now {
                    return Err(PromotionError::Expired {
                        model: DiscountModel::Voucher,
                        id,
                    });
                }
                // 抵扣额 = 绑定菜品的基础价 (不含选项加价)
                let Some((unit_price, _)) = scope.dish(voucher.template_id) else {
                    return Err(PromotionError::mismatch(
                        DiscountModel::Voucher,
                        id,
                        format!("order does not contain dish {}", voucher.template_id),
                    ));
                };
                Ok((
                    AppliedDiscount {
                        discount_model: DiscountModel::Voucher,
                        ref_ids: vec![id],
                        claimed_amount,
                        amount: to_f64(to_decimal(unit_price)),
                    },
                    Some(voucher.template_id),
                ))
            }
        }
    }

    /// Flip every referenced credit to used, stamped with `order_id`.
    ///
    /// All-or-nothing: if any credit was taken in the meantime nothing is
    /// redeemed.
    pub async fn redeem(
        &self,
        discounts: &[AppliedDiscount],
        order_id: i64,
    ) -> Result<(), PromotionError> {
        if discounts.is_empty() {
            return Ok(());
        }
        let now = shared::util::now_millis();
        let mut failed = None;

        let mut tx = self.pool.begin().await?;
        'outer: for discount in discounts {
            for &id in &discount.ref_ids {
                let flipped = match discount.discount_model {
                    DiscountModel::Point => {
                        promotion::mark_point_used(&mut *tx, id, order_id, now).await?
                    }
                    DiscountModel::Coupon => {
                        promotion::mark_coupon_used(&mut *tx, id, order_id, now).await?
                    }
                    DiscountModel::Voucher => {
                        promotion::mark_voucher_used(&mut *tx, id, order_id, now).await?
                    }
                };
                if !flipped {
                    failed = Some((discount.discount_model, id));
                    break 'outer;
                }
            }
        }

        match failed {
            None => {
                tx.commit().await?;
                tracing::debug!(order_id, discounts = discounts.len(), "Credits redeemed");
                Ok(())
            }
            Some((model, id)) => {
                tx.rollback().await?;
                Err(self.diagnose(model, id, now).await)
            }
        }
    }

    /// Re-open every credit consumed by `order_id`; past-expiry ones are marked expired
    pub async fn restore(&self, order_id: i64) -> Result<RestoreCounts, PromotionError> {
        let now = shared::util::now_millis();
        let mut tx = self.pool.begin().await?;
        let mut counts = promotion::restore_points_used_by(&mut tx, order_id, now).await?;
        counts += promotion::restore_coupons_used_by(&mut tx, order_id, now).await?;
        counts += promotion::restore_vouchers_used_by(&mut tx, order_id, now).await?;
        tx.commit().await?;

        if counts.restored > 0 || counts.expired > 0 {
            tracing::info!(
                order_id,
                restored = counts.restored,
                expired = counts.expired,
                "Credits restored"
            );
        }
        Ok(counts)
    }

    /// Mark every active credit of a brand past its expiry as expired
    pub async fn expire_overdue(&self, brand_id: i64) -> Result<u64, PromotionError> {
        let expired =
            promotion::expire_overdue(&self.pool, brand_id, shared::util::now_millis()).await?;
        if expired > 0 {
            tracing::info!(brand_id, expired, "Overdue credits expired");
        }
        Ok(expired)
    }

    /// Expiry sweep across every brand with an active store
    ///
    /// 单个品牌失败只记日志，不影响其他品牌。
    pub async fn expire_all_overdue(&self) -> Result<u64, PromotionError> {
        let mut total = 0;
        for brand_id in store::active_brand_ids(&self.pool).await? {
            match self.expire_overdue(brand_id).await {
                Ok(n) => total += n,
                Err(e) => tracing::warn!(brand_id, error = %e, "Credit expiry sweep failed"),
            }
        }
        Ok(total)
    }

    /// 核销失败后重新读取凭证，给出具体原因
    async fn diagnose(&self, model: DiscountModel, id: i64, now: i64) -> PromotionError {
        let expired = match model {
            DiscountModel::Point => match promotion::find_point(&self.pool, id).await {
                Ok(Some(p)) => p.status == CreditStatus::Expired || p.expires_at <= now,
                Ok(None) => return PromotionError::NotFound { model, id },
                Err(e) => return e.into(),
            },
            DiscountModel::Coupon => match promotion::find_coupon(&self.pool, id).await {
                Ok(Some(c)) => !c.is_used && (c.is_expired || c.expires_at <= now),
                Ok(None) => return PromotionError::NotFound { model, id },
                Err(e) => return e.into(),
            },
            DiscountModel::Voucher => match promotion::find_voucher(&self.pool, id).await {
                Ok(Some(v)) if v.is_invalidated => {
                    return PromotionError::mismatch(model, id, "voucher was invalidated");
                }
                Ok(Some(v)) => !v.is_used && (v.is_expired || v.expires_at <= now),
                Ok(None) => return PromotionError::NotFound { model, id },
                Err(e) => return e.into(),
            },
        };
        if expired {
            PromotionError::Expired { model, id }
        } else {
            PromotionError::AlreadyUsed { model, id }
        }
    }
}

fn require_user(scope: &CreditScope, model: DiscountModel, id: i64) -> Result<i64, PromotionError> {
    scope
        .user_id
        .ok_or_else(|| PromotionError::mismatch(model, id, "credits require a signed-in customer"))
}

fn check_owner(
    scope: &CreditScope,
    user_id: i64,
    credit_brand: i64,
    credit_user: i64,
    model: DiscountModel,
    id: i64,
) -> Result<(), PromotionError> {
    if credit_brand != scope.brand_id {
        return Err(PromotionError::mismatch(model, id, "issued by another brand"));
    }
    if credit_user != user_id {
        return Err(PromotionError::mismatch(model, id, "belongs to another customer"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(template_id: Option<i64>, unit_price: f64, quantity: i32) -> DishLine {
        DishLine {
            template_id,
            name: "dish".into(),
            unit_price,
            quantity,
            options: vec![],
            subtotal: unit_price * f64::from(quantity),
            note: None,
            external_id: None,
        }
    }

    #[test]
    fn test_scope_aggregates_quantity_per_template() {
        let lines = [line(Some(1), 120.0, 2), line(Some(1), 120.0, 1), line(None, 50.0, 1)];
        let scope = CreditScope::new(1, Some(9), lines.iter());
        assert_eq!(scope.dish(1), Some((120.0, 3)));
        assert_eq!(scope.dish(2), None);
    }

    #[test]
    fn test_require_user() {
        let scope = CreditScope::new(1, None, std::iter::empty());
        let err = require_user(&scope, DiscountModel::Coupon, 5).unwrap_err();
        assert!(matches!(err, PromotionError::Mismatch { id: 5, .. }));
    }

    #[test]
    fn test_check_owner() {
        let scope = CreditScope::new(1, Some(9), std::iter::empty());
        assert!(check_owner(&scope, 9, 1, 9, DiscountModel::Point, 1).is_ok());
        assert!(check_owner(&scope, 9, 2, 9, DiscountModel::Point, 1).is_err());
        assert!(check_owner(&scope, 9, 1, 8, DiscountModel::Point, 1).is_err());
    }
}
