//! 外卖平台接入
//!
//! - [`token`]: Credential Cache, 每个平台身份单飞刷新
//! - [`adapter`]: 平台订单 → 内部订单的映射 trait 与目录匹配
//! - [`uber_eats`] / [`foodpanda`]: 各平台的 adapter 与 API client
//! - [`ingest`]: webhook 幂等入单、接单期限、拒单与状态回传

pub mod adapter;
pub mod client;
pub mod error;
pub mod foodpanda;
pub mod ingest;
pub mod oauth;
pub mod signature;
pub mod token;
pub mod uber_eats;

pub use adapter::{CatalogIndex, MappedOrder, Notification, OrderSource, PlatformAdapter};
pub use client::{DenyReason, FulfillmentStatus, MarketplaceApi};
pub use error::PlatformError;
pub use foodpanda::{FoodpandaAdapter, FoodpandaApi};
pub use ingest::{AcceptPolicy, PlatformOrderService, WebhookOutcome};
pub use oauth::HttpTokenRefresher;
pub use token::{AccessToken, CredentialCache, CredentialKey, CredentialStore, SqliteCredentialStore, TokenRefresher};
pub use uber_eats::{UberEatsAdapter, UberEatsApi};
