use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use shared::models::Platform;
use sqlx::SqlitePool;

use crate::core::{Config, Result};
use crate::db::DbService;
use crate::inventory::StockLedger;
use crate::orders::OrderService;
use crate::platforms::{
    AcceptPolicy, CredentialCache, FoodpandaAdapter, FoodpandaApi, HttpTokenRefresher,
    MarketplaceApi, PlatformAdapter, PlatformOrderService, SqliteCredentialStore,
    UberEatsAdapter, UberEatsApi,
};
use crate::promotion::PromotionLedger;

/// A marketplace integration: payload adapter plus outbound API
pub type Integration = (Arc<dyn PlatformAdapter>, Arc<dyn MarketplaceApi>);

/// 服务器状态 - 持有所有服务的共享引用
///
/// 所有字段都是 `Clone` 的浅拷贝 (内部是 pool / Arc)，axum handler 直接按值取。
///
/// | 字段 | 说明 |
/// |------|------|
/// | config | 配置项 (不可变) |
/// | db | SQLite 连接池 |
/// | stock | Stock Ledger |
/// | promotions | Promotion Ledger |
/// | orders | 下单 / 支付 / 取消流水线 |
/// | platforms | 外卖平台入单与回传 |
/// | credentials | 平台 token 缓存 |
#[derive(Clone)]
pub struct ServerState {
    pub config: Config,
    pub db: DbService,
    pub stock: StockLedger,
    pub promotions: PromotionLedger,
    pub orders: OrderService,
    pub platforms: Arc<PlatformOrderService>,
    pub credentials: Arc<CredentialCache>,
}

impl ServerState {
    /// Wire the services over an open database.
    ///
    /// Webhook secrets come from the per-platform config.
    pub fn new(
        config: Config,
        db: DbService,
        credentials: Arc<CredentialCache>,
        integrations: Vec<Integration>,
    ) -> Self {
        let pool = db.pool.clone();
        let tz = config.business_timezone;
        let stock = StockLedger::new(pool.clone(), tz);
        let promotions = PromotionLedger::new(pool.clone());
        let orders = OrderService::new(pool.clone(), tz, stock.clone(), promotions.clone());

        let mut platforms = PlatformOrderService::new(
            pool,
            orders.clone(),
            config.unmatched_item_policy,
            AcceptPolicy::from_config(&config),
        );
        for (adapter, api) in integrations {
            let secret = config.platform(adapter.platform()).webhook_secret.clone();
            platforms = platforms.register(adapter, api, secret);
        }

        Self {
            config,
            db,
            stock,
            promotions,
            orders,
            platforms: Arc::new(platforms),
            credentials,
        }
    }

    /// 初始化: 打开数据库、迁移、构建 HTTP clients
    pub async fn initialize(config: &Config) -> Result<Self> {
        let db = DbService::new(&config.database_path).await?;
        let timeout = Duration::from_millis(config.request_timeout_ms);

        let configs: HashMap<Platform, _> = [Platform::UberEats, Platform::Foodpanda]
            .into_iter()
            .map(|p| (p, config.platform(p).clone()))
            .collect();
        let refresher = Arc::new(HttpTokenRefresher::new(timeout, configs)?);
        let credentials = Arc::new(
            CredentialCache::new(
                Arc::new(SqliteCredentialStore::new(db.pool.clone())),
                config.token_refresh_margin_secs,
            )
            .with_refresher(Platform::UberEats, refresher.clone())
            .with_refresher(Platform::Foodpanda, refresher),
        );

        let integrations: Vec<Integration> = vec![
            (
                Arc::new(UberEatsAdapter) as Arc<dyn PlatformAdapter>,
                Arc::new(UberEatsApi::new(
                    &config.uber_eats.api_base_url,
                    timeout,
                    credentials.clone(),
                )?) as Arc<dyn MarketplaceApi>,
            ),
            (
                Arc::new(FoodpandaAdapter) as Arc<dyn PlatformAdapter>,
                Arc::new(FoodpandaApi::new(
                    &config.foodpanda.api_base_url,
                    timeout,
                    credentials.clone(),
                )?) as Arc<dyn MarketplaceApi>,
            ),
        ];

        Ok(Self::new(config.clone(), db, credentials, integrations))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db.pool
    }

    /// Send the marketplace accept in the background (deadline-bound)
    pub fn spawn_accept(&self, order_id: i64) {
        let platforms = self.platforms.clone();
        tokio::spawn(async move {
            match platforms.accept_with_deadline(order_id).await {
                Ok(status) => tracing::debug!(order_id, ?status, "Accept task finished"),
                Err(e) => tracing::error!(order_id, error = %e, "Accept task failed"),
            }
        });
    }
}
