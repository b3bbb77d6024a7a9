//! Consumption statistics computed from the stock change log

use std::collections::HashMap;

use rust_decimal::prelude::*;
use shared::models::ConsumptionStat;

use super::error::StockError;
use super::ledger::StockLedger;
use crate::db::repository::inventory;
use crate::utils::time::days_to_millis;

impl StockLedger {
    /// Average daily order consumption and days of cover per tracked item
    /// over the last `days` days.
    pub async fn consumption_stats(
        &self,
        store_id: i64,
        days: i64,
    ) -> Result<Vec<ConsumptionStat>, StockError> {
        if !(1..=365).contains(&days) {
            return Err(StockError::Invalid(format!(
                "days must be between 1 and 365, got {days}"
            )));
        }
        let since = shared::util::now_millis() - days_to_millis(days);

        let consumed: HashMap<i64, i64> =
            inventory::consumption_by_item(self.pool(), store_id, since)
                .await?
                .into_iter()
                .collect();
        let records = inventory::find_by_store(self.pool(), store_id).await?;

        let stats = records
            .into_iter()
            .filter(|r| r.is_tracked)
            .map(|r| {
                let used = consumed.get(&r.item_id).copied().unwrap_or(0).max(0);
                build_stat(r.item_id, used, days, r.stock)
            })
            .collect();
        Ok(stats)
    }
}

fn build_stat(item_id: i64, consumed: i64, days: i64, current_stock: i64) -> ConsumptionStat {
    let average = Decimal::from(consumed) / Decimal::from(days);
    let days_of_cover = if average.is_zero() {
        None
    } else {
        (Decimal::from(current_stock) / average)
            .round_dp(1)
            .to_f64()
    };
    ConsumptionStat {
        item_id,
        consumed,
        average_daily: average.round_dp(2).to_f64().unwrap_or_default(),
        current_stock,
        days_of_cover,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_stat() {
        let s = build_stat(1, 21, 7, 15);
        assert_eq!(s.average_daily, 3.0);
        assert_eq!(s.days_of_cover, Some(5.0));
    }

    #[test]
    fn test_build_stat_without_consumption() {
        let s = build_stat(1, 0, 7, 15);
        assert_eq!(s.average_daily, 0.0);
        assert_eq!(s.days_of_cover, None);
    }
}
