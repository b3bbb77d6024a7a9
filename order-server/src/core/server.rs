//! Server Implementation
//!
//! HTTP 服务器 + 过期凭证清扫任务，ctrl-c 时一起退出

use std::time::Duration;

use tokio::sync::watch;

use crate::api;
use crate::core::{Config, Result, ServerState};
use crate::promotion::PromotionLedger;

/// HTTP Server
pub struct Server {
    config: Config,
    state: Option<ServerState>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: None,
        }
    }

    /// Run over an already initialized state
    pub fn with_state(config: Config, state: ServerState) -> Self {
        Self {
            config,
            state: Some(state),
        }
    }

    pub async fn run(&self) -> Result<()> {
        let state = match &self.state {
            Some(s) => s.clone(),
            None => ServerState::initialize(&self.config).await?,
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweeper = (self.config.credit_expiry_sweep_secs > 0).then(|| {
            tokio::spawn(sweep_expired_credits(
                state.promotions.clone(),
                Duration::from_secs(self.config.credit_expiry_sweep_secs),
                shutdown_rx,
            ))
        });

        let app = api::build_app().with_state(state);
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, "Order server listening");

        let shutdown = async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down...");
            let _ = shutdown_tx.send(true);
        };
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        if let Some(handle) = sweeper {
            let _ = handle.await;
        }
        Ok(())
    }
}

/// 周期性把过期的积分 / 优惠券 / 兑换券标记为 expired
async fn sweep_expired_credits(
    promotions: PromotionLedger,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match promotions.expire_all_overdue().await {
                    Ok(0) => {}
                    Ok(expired) => tracing::info!(expired, "Credit expiry sweep finished"),
                    Err(e) => tracing::warn!(error = %e, "Credit expiry sweep failed"),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    tracing::debug!("Credit expiry sweeper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbService;
    use crate::db::repository::{promotion, store};
    use shared::models::{Coupon, Store};

    #[tokio::test]
    async fn test_sweeper_expires_overdue_and_stops_on_shutdown() {
        let db = DbService::in_memory().await.unwrap();
        store::create(
            &db.pool,
            &Store {
                id: 1,
                brand_id: 3,
                name: "Harbour".into(),
                service_charge_rate: 0.0,
                currency_decimals: 0,
                is_active: true,
            },
        )
        .await
        .unwrap();
        let now = shared::util::now_millis();
        promotion::insert_coupon(
            &db.pool,
            &Coupon {
                id: 11,
                brand_id: 3,
                user_id: 1,
                name: "50 off".into(),
                value: 50.0,
                template_id: None,
                is_used: false,
                used_at: None,
                used_by_order_id: None,
                is_expired: false,
                expires_at: now - 1,
                restored_at: None,
                created_at: now - 10,
            },
        )
        .await
        .unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(sweep_expired_credits(
            PromotionLedger::new(db.pool.clone()),
            Duration::from_secs(3600),
            rx,
        ));
        // 首个 tick 立即触发
        tokio::time::sleep(Duration::from_millis(200)).await;
        let coupon = promotion::find_coupon(&db.pool, 11).await.unwrap().unwrap();
        assert!(coupon.is_expired);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper stops")
            .unwrap();
    }
}
