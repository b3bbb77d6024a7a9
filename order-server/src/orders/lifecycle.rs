//! 订单状态流转: 支付回调、运营状态、后台调账

use shared::models::{MarkPaidRequest, Order, OrderStatus, PlacedOrder};

use super::compensation::CompensationStack;
use super::error::OrderError;
use super::money::{money_eq, order_total, to_decimal};
use super::pipeline::OrderService;
use crate::db::repository::order;
use crate::utils::ErrorCode;
use crate::utils::validation::{MAX_NAME_LEN, MAX_NOTE_LEN, validate_optional_text, validate_required_text};

impl OrderService {
    /// Payment callback / cashier confirmation.
    ///
    /// Records payment once and runs the paid effects. A failing paid effect
    /// does not undo the payment: it is logged and the order is returned.
    pub async fn mark_paid(
        &self,
        order_id: i64,
        req: MarkPaidRequest,
    ) -> Result<PlacedOrder, OrderError> {
        validate_optional_text(&req.payment_reference, "payment_reference", MAX_NOTE_LEN)?;
        let current = self.find(order_id).await?;
        reject_paid_or_cancelled(&current)?;

        let now = shared::util::now_millis();
        let recorded = order::mark_paid(
            &self.pool,
            order_id,
            req.payment_method,
            req.payment_reference.as_deref(),
            now,
        )
        .await?;
        let paid = self.find(order_id).await?;
        if !recorded {
            // 并发的另一次回调已经记录了支付
            reject_paid_or_cancelled(&paid)?;
            return Err(OrderError::AlreadyPaid(order_id));
        }

        // 支付已确认，副作用失败不回滚支付
        let mut undo = CompensationStack::new();
        let points_awarded = match self.apply_paid_effects(&paid, &mut undo).await {
            Ok(points) => points,
            Err(e) => {
                tracing::error!(
                    order_id,
                    error = %e,
                    "Paid effects failed, payment kept"
                );
                0
            }
        };

        tracing::info!(order_id, method = ?req.payment_method, points_awarded, "Order paid");
        let order = self.find(order_id).await?;
        Ok(PlacedOrder {
            order,
            points_awarded: Some(points_awarded),
        })
    }

    /// Operational transition (`confirmed`, `preparing`, `completed`)
    pub async fn advance_status(
        &self,
        order_id: i64,
        next: OrderStatus,
    ) -> Result<Order, OrderError> {
        let current = self.find(order_id).await?;
        if current.status.is_terminal() {
            return Err(terminal(&current));
        }
        if !current.status.can_advance_to(next) {
            return Err(OrderError::InvalidTransition {
                from: current.status,
                to: next,
            });
        }

        let now = shared::util::now_millis();
        if !order::update_status(&self.pool, order_id, current.status, next, now).await? {
            let latest = self.find(order_id).await?;
            if latest.status.is_terminal() {
                return Err(terminal(&latest));
            }
            return Err(OrderError::InvalidTransition {
                from: latest.status,
                to: next,
            });
        }

        tracing::info!(order_id, from = %current.status, to = %next, "Order status changed");
        self.find(order_id).await
    }

    /// Admin total adjustment; total is re-derived and clamped at 0
    pub async fn adjust_total(
        &self,
        order_id: i64,
        manual_adjustment: f64,
        actor: &str,
    ) -> Result<Order, OrderError> {
        validate_required_text(actor, "actor", MAX_NAME_LEN)?;
        if !manual_adjustment.is_finite() {
            return Err(OrderError::invalid(
                ErrorCode::InvalidAmount,
                "manual adjustment must be a finite amount",
            ));
        }

        let current = self.find(order_id).await?;
        if current.status.is_terminal() {
            return Err(terminal(&current));
        }

        let total = order_total(
            current.dish_subtotal,
            current.bundle_subtotal,
            current.service_charge,
            current.total_discount,
            manual_adjustment,
        );
        let now = shared::util::now_millis();
        if !order::update_adjustment(&self.pool, order_id, manual_adjustment, total, now).await? {
            return Err(terminal(&self.find(order_id).await?));
        }

        if !money_eq(total, current.total) {
            tracing::info!(
                order_id,
                actor,
                previous_total = current.total,
                total,
                adjustment = %to_decimal(manual_adjustment),
                "Order total adjusted"
            );
        }
        self.find(order_id).await
    }
}

fn reject_paid_or_cancelled(current: &Order) -> Result<(), OrderError> {
    if current.status == OrderStatus::Cancelled {
        return Err(OrderError::AlreadyCancelled(current.id));
    }
    if current.is_paid() {
        return Err(OrderError::AlreadyPaid(current.id));
    }
    Ok(())
}

pub(super) fn terminal(current: &Order) -> OrderError {
    match current.status {
        OrderStatus::Cancelled => OrderError::AlreadyCancelled(current.id),
        status => OrderError::TerminalState {
            order_id: current.id,
            status,
        },
    }
}
