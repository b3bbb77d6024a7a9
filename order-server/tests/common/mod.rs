//! 集成测试公共夹具
//!
//! 内存 SQLite + 固定的门店/菜单/库存，外卖平台 API 用 mock 代替。

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue};
use order_server::core::Integration;
use order_server::db::DbService;
use order_server::db::repository::{catalog, inventory, platform_store, promotion, store};
use order_server::platforms::{
    CredentialCache, CredentialKey, DenyReason, FoodpandaAdapter, FulfillmentStatus,
    MarketplaceApi, PlatformAdapter, PlatformError, SqliteCredentialStore, TokenRefresher,
    UberEatsAdapter, signature,
};
use order_server::{Config, ServerState};
use parking_lot::Mutex;
use serde_json::{Value, json};
use shared::models::{
    DishOption, DishTemplate, InventoryRecord, Platform, PlatformStore, Store, Voucher,
};

pub const BRAND_ID: i64 = 1;
pub const STORE_ID: i64 = 10;
pub const USER_ID: i64 = 7;

/// 120, tracked (stock 10), external id `beef-1`
pub const BEEF_NOODLES: i64 = 100;
/// 60, no inventory record
pub const BUBBLE_TEA: i64 = 101;
/// 90, tracked (stock 2)
pub const PORK_RICE: i64 = 102;
/// +20 option, external id `egg`
pub const FRIED_EGG: i64 = 200;

pub const WEBHOOK_SECRET: &str = "whsec_test";
pub const UBER_STORE: &str = "ue-store-1";
pub const FOODPANDA_STORE: &str = "fp-store-1";

pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// How the mock marketplace answers the accept call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptMode {
    Ok,
    /// Non-retryable HTTP error
    Reject(u16),
    /// Never answers
    Hang,
}

pub struct MockMarketplace {
    platform: Platform,
    pub accept_mode: Mutex<AcceptMode>,
    pub accept_calls: AtomicUsize,
    pub deny_calls: AtomicUsize,
    pub status_calls: Mutex<Vec<FulfillmentStatus>>,
    /// Order detail returned by `fetch_order`
    pub order_detail: Mutex<Option<Value>>,
    /// When set, accept fetches an access token first (like the real clients)
    credentials: Mutex<Option<Arc<CredentialCache>>>,
}

impl MockMarketplace {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            accept_mode: Mutex::new(AcceptMode::Ok),
            accept_calls: AtomicUsize::new(0),
            deny_calls: AtomicUsize::new(0),
            status_calls: Mutex::new(Vec::new()),
            order_detail: Mutex::new(None),
            credentials: Mutex::new(None),
        }
    }

    pub fn set_accept_mode(&self, mode: AcceptMode) {
        *self.accept_mode.lock() = mode;
    }

    pub fn accepts(&self) -> usize {
        self.accept_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketplaceApi for MockMarketplace {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn fetch_order(&self, _link: &PlatformStore, _reference: &str) -> Result<Value, PlatformError> {
        self.order_detail
            .lock()
            .clone()
            .ok_or_else(|| PlatformError::Http {
                status: 404,
                body: "order not found".into(),
            })
    }

    async fn accept(&self, link: &PlatformStore, _platform_order_id: &str) -> Result<(), PlatformError> {
        let credentials = self.credentials.lock().clone();
        if let Some(credentials) = credentials {
            credentials.token(&CredentialKey::for_link(link)).await?;
        }
        self.accept_calls.fetch_add(1, Ordering::SeqCst);
        let mode = *self.accept_mode.lock();
        match mode {
            AcceptMode::Ok => Ok(()),
            AcceptMode::Reject(status) => Err(PlatformError::Http {
                status,
                body: "rejected".into(),
            }),
            AcceptMode::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }

    async fn deny(
        &self,
        _link: &PlatformStore,
        _platform_order_id: &str,
        _reason: &DenyReason,
    ) -> Result<(), PlatformError> {
        self.deny_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_status(
        &self,
        _link: &PlatformStore,
        _platform_order_id: &str,
        status: FulfillmentStatus,
    ) -> Result<(), PlatformError> {
        self.status_calls.lock().push(status);
        Ok(())
    }
}

pub struct TestApp {
    pub state: ServerState,
    pub uber: Arc<MockMarketplace>,
    pub foodpanda: Arc<MockMarketplace>,
}

impl TestApp {
    pub fn pool(&self) -> &sqlx::SqlitePool {
        self.state.pool()
    }
}

pub async fn setup() -> TestApp {
    setup_with(|_| {}).await
}

/// Seeded app; `tweak` adjusts the config before services are wired
pub async fn setup_with(tweak: impl FnOnce(&mut Config)) -> TestApp {
    build(tweak, None).await
}

/// Seeded app whose marketplace calls need a token from `refresher`
pub async fn setup_with_refresher(refresher: Arc<dyn TokenRefresher>) -> TestApp {
    build(|_| {}, Some(refresher)).await
}

async fn build(tweak: impl FnOnce(&mut Config), refresher: Option<Arc<dyn TokenRefresher>>) -> TestApp {
    let mut config = Config::with_overrides(":memory:", 0);
    config.uber_eats.webhook_secret = Some(WEBHOOK_SECRET.into());
    config.foodpanda.webhook_secret = Some(WEBHOOK_SECRET.into());
    config.platform_accept_deadline_secs = 30;
    config.platform_accept_max_attempts = 3;
    tweak(&mut config);

    let db = DbService::in_memory().await.expect("in-memory db");
    seed(&db.pool).await;

    let mut credentials = CredentialCache::new(
        Arc::new(SqliteCredentialStore::new(db.pool.clone())),
        config.token_refresh_margin_secs,
    );
    if let Some(refresher) = &refresher {
        credentials = credentials
            .with_refresher(Platform::UberEats, refresher.clone())
            .with_refresher(Platform::Foodpanda, refresher.clone());
    }
    let credentials = Arc::new(credentials);
    let uber = Arc::new(MockMarketplace::new(Platform::UberEats));
    let foodpanda = Arc::new(MockMarketplace::new(Platform::Foodpanda));
    if refresher.is_some() {
        *uber.credentials.lock() = Some(credentials.clone());
        *foodpanda.credentials.lock() = Some(credentials.clone());
    }
    let uber_api: Arc<dyn MarketplaceApi> = uber.clone();
    let foodpanda_api: Arc<dyn MarketplaceApi> = foodpanda.clone();
    let integrations: Vec<Integration> = vec![
        (Arc::new(UberEatsAdapter) as Arc<dyn PlatformAdapter>, uber_api),
        (Arc::new(FoodpandaAdapter) as Arc<dyn PlatformAdapter>, foodpanda_api),
    ];

    let state = ServerState::new(config, db, credentials, integrations);
    TestApp {
        state,
        uber,
        foodpanda,
    }
}

async fn seed(pool: &sqlx::SqlitePool) {
    store::create(
        pool,
        &Store {
            id: STORE_ID,
            brand_id: BRAND_ID,
            name: "Main Street".into(),
            service_charge_rate: 10.0,
            currency_decimals: 0,
            is_active: true,
        },
    )
    .await
    .unwrap();

    for (id, name, price, external_id) in [
        (BEEF_NOODLES, "Beef Noodle Soup", 120.0, Some("beef-1")),
        (BUBBLE_TEA, "Bubble Tea", 60.0, None),
        (PORK_RICE, "Braised Pork Rice", 90.0, None),
    ] {
        catalog::create_template(
            pool,
            &DishTemplate {
                id,
                brand_id: BRAND_ID,
                name: name.into(),
                price,
                external_id: external_id.map(String::from),
                is_active: true,
            },
        )
        .await
        .unwrap();
    }

    catalog::create_option(
        pool,
        &DishOption {
            id: FRIED_EGG,
            brand_id: BRAND_ID,
            category_name: "Extras".into(),
            name: "Fried Egg".into(),
            price_modifier: 20.0,
            bound_template_id: None,
            external_id: Some("egg".into()),
            is_active: true,
        },
    )
    .await
    .unwrap();

    for (id, item_id, stock) in [(1, BEEF_NOODLES, 10), (2, PORK_RICE, 2)] {
        inventory::create(
            pool,
            &InventoryRecord {
                id,
                store_id: STORE_ID,
                item_id,
                is_tracked: true,
                is_sold_out: false,
                stock,
                warehouse_stock: None,
                daily_limit: None,
                updated_at: 0,
            },
        )
        .await
        .unwrap();
    }

    let now = shared::util::now_millis();
    for (id, platform, platform_store_id) in [
        (1, Platform::UberEats, UBER_STORE),
        (2, Platform::Foodpanda, FOODPANDA_STORE),
    ] {
        platform_store::create(
            pool,
            &PlatformStore {
                id,
                store_id: STORE_ID,
                platform,
                platform_store_id: platform_store_id.into(),
                access_token: None,
                refresh_token: None,
                token_expires_at: None,
                authorized_store_ids: None,
                is_active: true,
                created_at: now,
                updated_at: now,
            },
        )
        .await
        .unwrap();
    }
}

/// Voucher for `template_id` owned by [`USER_ID`]
pub async fn grant_voucher(pool: &sqlx::SqlitePool, template_id: i64, expires_at: i64) -> i64 {
    let id = shared::util::snowflake_id();
    promotion::insert_voucher(
        pool,
        &Voucher {
            id,
            brand_id: BRAND_ID,
            user_id: USER_ID,
            template_id,
            bundle_order_id: None,
            bundle_id: None,
            is_used: false,
            used_at: None,
            used_by_order_id: None,
            is_expired: false,
            is_invalidated: false,
            expires_at,
            restored_at: None,
            created_at: shared::util::now_millis(),
        },
    )
    .await
    .unwrap();
    id
}

pub async fn stock_of(pool: &sqlx::SqlitePool, item_id: i64) -> i64 {
    inventory::find(pool, STORE_ID, item_id)
        .await
        .unwrap()
        .map(|r| r.stock)
        .expect("inventory record")
}

pub async fn order_count(pool: &sqlx::SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(pool)
        .await
        .unwrap()
}

pub fn signed_headers(header: &'static str, body: &[u8]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header,
        HeaderValue::from_str(&signature::sign(WEBHOOK_SECRET, body).unwrap()).unwrap(),
    );
    headers
}

/// Foodpanda order push for `token` with the given products
pub fn foodpanda_order(token: &str, products: Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "token": token,
        "code": format!("{token}-code"),
        "expeditionType": "delivery",
        "platformRestaurant": {"id": FOODPANDA_STORE},
        "customer": {"firstName": "Ben"},
        "products": products,
    }))
    .unwrap()
}
