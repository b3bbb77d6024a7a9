//! 提交流水线的补偿栈
//!
//! 每完成一步就压入对应的撤销动作，失败时逆序执行。补偿是 best-effort：
//! 单步失败只记日志并继续。库存恢复失败时不删除订单，改为标记取消，
//! 让预留仍能按订单追溯。

use sqlx::SqlitePool;

use crate::db::repository::order;
use crate::inventory::StockLedger;
use crate::promotion::PromotionLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compensation {
    /// Hard-delete the persisted order
    DeleteOrder(i64),
    /// Replay the order's stock log backwards
    RestoreStock(i64),
    /// Re-open credits stamped with the order
    RestorePromotions(i64),
    /// Expire points the order had awarded
    RevokePoints(i64),
    /// Invalidate vouchers the order had issued
    InvalidateVouchers(i64),
}

#[derive(Debug, Default)]
pub struct CompensationStack {
    steps: Vec<Compensation>,
}

impl CompensationStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: Compensation) {
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Undo every recorded step, newest first. Returns the failures.
    pub async fn unwind(
        self,
        pool: &SqlitePool,
        stock: &StockLedger,
        promotions: &PromotionLedger,
    ) -> Vec<String> {
        let mut failures = Vec::new();
        let mut reservation_stuck = false;

        for step in self.steps.into_iter().rev() {
            let result = match step {
                Compensation::RestoreStock(order_id) => {
                    let r = stock.restore(order_id).await.map(|_| ()).map_err(|e| e.to_string());
                    reservation_stuck = r.is_err();
                    r
                }
                Compensation::RestorePromotions(order_id) => promotions
                    .restore(order_id)
                    .await
                    .map(|_| ())
                    .map_err(|e| e.to_string()),
                Compensation::RevokePoints(order_id) => promotions
                    .revoke_awarded_points(order_id)
                    .await
                    .map(|_| ())
                    .map_err(|e| e.to_string()),
                Compensation::InvalidateVouchers(order_id) => promotions
                    .invalidate_bundle_vouchers(order_id)
                    .await
                    .map(|_| ())
                    .map_err(|e| e.to_string()),
                Compensation::DeleteOrder(order_id) if reservation_stuck => {
                    // 预留没能撤回: 保留订单作为取消记录，之后可以再走取消流程
                    order::mark_cancelled(
                        pool,
                        order_id,
                        "commit failed",
                        "system",
                        shared::util::now_millis(),
                    )
                    .await
                    .map(|_| ())
                    .map_err(|e| e.to_string())
                }
                Compensation::DeleteOrder(order_id) => order::delete(pool, order_id)
                    .await
                    .map(|_| ())
                    .map_err(|e| e.to_string()),
            };

            if let Err(e) = result {
                tracing::error!(step = ?step, error = %e, "Compensation step failed");
                failures.push(format!("{step:?}: {e}"));
            } else {
                tracing::debug!(step = ?step, "Compensation step done");
            }
        }
        failures
    }
}
