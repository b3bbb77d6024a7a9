//! Cancellation / Rollback Pipeline
//!
//! 先翻转状态，再逐项修复: 恢复优惠凭证、按日志恢复库存、作废套餐券、
//! 收回已发积分。每一步都尝试执行，失败只记录为 warning，不阻塞取消本身。

use shared::models::CancelOutcome;

use super::error::OrderError;
use super::lifecycle::terminal;
use super::pipeline::OrderService;
use crate::db::repository::order;
use crate::utils::validation::{MAX_NAME_LEN, MAX_NOTE_LEN, validate_required_text};

impl OrderService {
    pub async fn cancel(
        &self,
        order_id: i64,
        reason: &str,
        actor: &str,
    ) -> Result<CancelOutcome, OrderError> {
        validate_required_text(reason, "reason", MAX_NOTE_LEN)?;
        validate_required_text(actor, "actor", MAX_NAME_LEN)?;

        let current = self.find(order_id).await?;
        if current.status.is_terminal() {
            return Err(terminal(&current));
        }

        let now = shared::util::now_millis();
        if !order::mark_cancelled(&self.pool, order_id, reason, actor, now).await? {
            // 并发取消或刚刚完成
            return Err(terminal(&self.find(order_id).await?));
        }
        tracing::info!(order_id, reason, actor, from = %current.status, "Order cancelled");

        let mut warnings = Vec::new();

        match self.promotions.restore(order_id).await {
            Ok(counts) if counts.expired > 0 => warnings.push(format!(
                "{} credit(s) had expired and were not restored",
                counts.expired
            )),
            Ok(_) => {}
            Err(e) => warnings.push(repair_failed(order_id, "restore promotions", e)),
        }

        if let Err(e) = self.stock.restore(order_id).await {
            warnings.push(repair_failed(order_id, "restore stock", e));
        }

        if current.bundle_lines().next().is_some() {
            match self.promotions.invalidate_bundle_vouchers(order_id).await {
                Ok((_, used)) if used > 0 => warnings.push(format!(
                    "{used} voucher(s) from this bundle were already redeemed"
                )),
                Ok(_) => {}
                Err(e) => warnings.push(repair_failed(order_id, "invalidate bundle vouchers", e)),
            }
        }

        if current.points_awarded > 0 {
            match self.promotions.revoke_awarded_points(order_id).await {
                Ok((_, used)) if used > 0 => warnings.push(format!(
                    "{used} awarded point(s) were already spent"
                )),
                Ok(_) => {}
                Err(e) => warnings.push(repair_failed(order_id, "revoke awarded points", e)),
            }
        }

        let order = self.find(order_id).await?;
        Ok(CancelOutcome { order, warnings })
    }
}

fn repair_failed(order_id: i64, step: &str, err: impl std::fmt::Display) -> String {
    let failure = OrderError::RepairFailed(format!("{step}: {err}"));
    tracing::error!(order_id, error = %failure, "Cancellation repair step failed");
    failure.to_string()
}
