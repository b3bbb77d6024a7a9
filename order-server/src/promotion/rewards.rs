//! Paid effects: 积分发放、套餐券发放，以及取消时的反向处理

use rust_decimal::prelude::*;
use shared::models::{BundleDetail, CreditStatus, Order, Point, PointsRule, PointsRuleCreate, Voucher};

use super::error::PromotionError;
use super::ledger::PromotionLedger;
use crate::db::repository::{bundle, order, points_rule, promotion};
use crate::orders::money::to_decimal;
use crate::utils::time::days_to_millis;

/// `floor(paid subtotal / spend_per_point)`
pub fn points_for(paid_subtotal: Decimal, spend_per_point: f64) -> i64 {
    let per_point = to_decimal(spend_per_point);
    if per_point <= Decimal::ZERO || paid_subtotal <= Decimal::ZERO {
        return 0;
    }
    (paid_subtotal / per_point).floor().to_i64().unwrap_or(0)
}

/// Subtotal the points rule applies to: dishes + bundles − discounts
fn paid_subtotal(order: &Order) -> Decimal {
    let base = to_decimal(order.dish_subtotal) + to_decimal(order.bundle_subtotal)
        - to_decimal(order.total_discount);
    base.max(Decimal::ZERO)
}

impl PromotionLedger {
    /// Award loyalty points for a paid order using the brand's active rule.
    ///
    /// Returns the number of points awarded. Guest orders and brands without
    /// an active rule earn nothing. Calling twice for the same order awards once.
    pub async fn award_points(&self, order: &Order) -> Result<i64, PromotionError> {
        let Some(user_id) = order.user_id else {
            return Ok(0);
        };
        let existing = promotion::find_points_awarded_by(self.pool(), order.id).await?;
        if !existing.is_empty() {
            return Ok(existing.len() as i64);
        }
        let Some(rule) = points_rule::find_active(self.pool(), order.brand_id).await? else {
            tracing::debug!(order_id = order.id, brand_id = order.brand_id, "No active points rule");
            return Ok(0);
        };

        let count = points_for(paid_subtotal(order), rule.spend_per_point);
        if count == 0 {
            return Ok(0);
        }

        let now = shared::util::now_millis();
        let expires_at = now + days_to_millis(rule.validity_days);
        let mut tx = self.pool().begin().await?;
        for _ in 0..count {
            let point = Point {
                id: shared::util::snowflake_id(),
                brand_id: order.brand_id,
                user_id,
                status: CreditStatus::Active,
                expires_at,
                used_by_order_id: None,
                used_at: None,
                awarded_by_order_id: Some(order.id),
                restored_at: None,
                created_at: now,
            };
            promotion::insert_point(&mut *tx, &point).await?;
        }
        order::set_points_awarded(&mut *tx, order.id, count).await?;
        tx.commit().await?;

        tracing::info!(order_id = order.id, user_id, points = count, rule_id = rule.id, "Points awarded");
        Ok(count)
    }

    /// Issue fulfillment vouchers for every bundle line of a paid order.
    ///
    /// Returns the issued vouchers; a second call for the same order issues none.
    pub async fn issue_bundle_vouchers(&self, order: &Order) -> Result<Vec<Voucher>, PromotionError> {
        let lines: Vec<_> = order.bundle_lines().collect();
        if lines.is_empty() {
            return Ok(Vec::new());
        }
        let Some(user_id) = order.user_id else {
            tracing::warn!(order_id = order.id, "Bundle purchased without a customer, no vouchers issued");
            return Ok(Vec::new());
        };
        if !promotion::find_vouchers_issued_by(self.pool(), order.id)
            .await?
            .is_empty()
        {
            return Ok(Vec::new());
        }

        let mut details: Vec<(BundleDetail, i64)> = Vec::with_capacity(lines.len());
        for line in lines {
            match bundle::find_detail(self.pool(), line.bundle_id).await? {
                Some(detail) => details.push((detail, i64::from(line.quantity))),
                None => tracing::warn!(
                    order_id = order.id,
                    bundle_id = line.bundle_id,
                    "Bundle vanished before vouchers were issued"
                ),
            }
        }

        let now = shared::util::now_millis();
        let mut issued = Vec::new();
        let mut tx = self.pool().begin().await?;
        for (detail, units) in &details {
            let expires_at = now + days_to_millis(detail.bundle.voucher_validity_days);
            for entry in &detail.entries {
                for _ in 0..(entry.quantity * units) {
                    let voucher = Voucher {
                        id: shared::util::snowflake_id(),
                        brand_id: order.brand_id,
                        user_id,
                        template_id: entry.template_id,
                        bundle_order_id: Some(order.id),
                        bundle_id: Some(detail.bundle.id),
                        is_used: false,
                        used_at: None,
                        used_by_order_id: None,
                        is_expired: false,
                        is_invalidated: false,
                        expires_at,
                        restored_at: None,
                        created_at: now,
                    };
                    promotion::insert_voucher(&mut *tx, &voucher).await?;
                    issued.push(voucher);
                }
            }
        }
        tx.commit().await?;

        tracing::info!(order_id = order.id, user_id, vouchers = issued.len(), "Bundle vouchers issued");
        Ok(issued)
    }

    /// Invalidate unused vouchers issued by a cancelled bundle order.
    ///
    /// Returns `(invalidated, already used)`.
    pub async fn invalidate_bundle_vouchers(&self, order_id: i64) -> Result<(u64, i64), PromotionError> {
        let (invalidated, used) =
            promotion::invalidate_vouchers_issued_by(self.pool(), order_id).await?;
        if invalidated > 0 {
            tracing::info!(order_id, invalidated, "Bundle vouchers invalidated");
        }
        Ok((invalidated, used))
    }

    /// Expire still-unused points a cancelled order had awarded.
    ///
    /// Returns `(revoked, already used)`.
    pub async fn revoke_awarded_points(&self, order_id: i64) -> Result<(u64, i64), PromotionError> {
        let (revoked, used) =
            promotion::revoke_points_awarded_by(self.pool(), order_id, shared::util::now_millis())
                .await?;
        if revoked > 0 {
            tracing::info!(order_id, revoked, "Awarded points revoked");
        }
        Ok((revoked, used))
    }

    /// New rules start inactive
    pub async fn create_rule(&self, data: PointsRuleCreate) -> Result<PointsRule, PromotionError> {
        if !(data.spend_per_point > 0.0) || data.validity_days <= 0 {
            return Err(PromotionError::InvalidRule(
                "spend_per_point and validity_days must be positive".into(),
            ));
        }
        let rule = points_rule::create(self.pool(), data).await?;
        tracing::info!(rule_id = rule.id, brand_id = rule.brand_id, "Points rule created");
        Ok(rule)
    }

    /// Make a rule the brand's only active rule (disable-others-then-enable,
    /// one transaction)
    pub async fn activate_rule(&self, rule_id: i64) -> Result<PointsRule, PromotionError> {
        if points_rule::find_by_id(self.pool(), rule_id).await?.is_none() {
            return Err(PromotionError::RuleNotFound(rule_id));
        }
        let rule = points_rule::activate(self.pool(), rule_id).await?;
        tracing::info!(rule_id, brand_id = rule.brand_id, "Points rule activated");
        Ok(rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_for_floors() {
        assert_eq!(points_for(Decimal::from(250), 100.0), 2);
        assert_eq!(points_for(Decimal::from(99), 100.0), 0);
        assert_eq!(points_for(Decimal::from(300), 100.0), 3);
        assert_eq!(points_for(Decimal::new(1999, 1), 10.0), 19);
    }

    #[test]
    fn test_points_for_degenerate_inputs() {
        assert_eq!(points_for(Decimal::from(500), 0.0), 0);
        assert_eq!(points_for(Decimal::from(-10), 10.0), 0);
    }
}
