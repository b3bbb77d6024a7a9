//! Outbound marketplace API
//!
//! 所有调用都带 Credential Cache 的 bearer token；401 时作废该 token 并重试一次。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::Value;
use shared::models::{Platform, PlatformStore};

use super::error::PlatformError;
use super::token::{CredentialCache, CredentialKey};

/// Reason given when rejecting a marketplace order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    StoreClosed,
    ItemUnavailable,
    TooBusy,
    Other(String),
}

impl DenyReason {
    pub fn explanation(&self) -> &str {
        match self {
            DenyReason::StoreClosed => "Store is closed",
            DenyReason::ItemUnavailable => "Item unavailable",
            DenyReason::TooBusy => "Kitchen is too busy",
            DenyReason::Other(text) => text,
        }
    }
}

/// Fulfillment progress reported back to the marketplace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FulfillmentStatus {
    InProgress,
    ReadyForPickup,
}

#[async_trait]
pub trait MarketplaceApi: Send + Sync {
    fn platform(&self) -> Platform;

    /// Full order detail, by reference URL or order id
    async fn fetch_order(&self, link: &PlatformStore, reference: &str) -> Result<Value, PlatformError>;

    async fn accept(&self, link: &PlatformStore, platform_order_id: &str) -> Result<(), PlatformError>;

    async fn deny(
        &self,
        link: &PlatformStore,
        platform_order_id: &str,
        reason: &DenyReason,
    ) -> Result<(), PlatformError>;

    async fn update_status(
        &self,
        link: &PlatformStore,
        platform_order_id: &str,
        status: FulfillmentStatus,
    ) -> Result<(), PlatformError>;
}

/// Authorized JSON calls shared by the marketplace clients
#[derive(Clone)]
pub struct AuthorizedClient {
    client: Client,
    base_url: String,
    credentials: Arc<CredentialCache>,
}

impl AuthorizedClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        credentials: Arc<CredentialCache>,
    ) -> Result<Self, PlatformError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PlatformError::Network(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        })
    }

    /// Absolute URL for a path, or the reference itself if it already is one
    pub fn url(&self, path_or_url: &str) -> String {
        if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
            path_or_url.to_string()
        } else {
            format!("{}/{}", self.base_url, path_or_url.trim_start_matches('/'))
        }
    }

    /// Send with bearer auth; on 401 invalidate the token and retry once
    pub async fn send(
        &self,
        key: &CredentialKey,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Option<Value>, PlatformError> {
        let mut retried = false;
        loop {
            let token = self.credentials.token(key).await?;
            let result = self
                .send_once(self.build(method.clone(), url, body), &token)
                .await;
            match result {
                Err(e) if e.is_unauthorized() && !retried => {
                    tracing::info!(key = %key, url, "Marketplace rejected token, refreshing");
                    self.credentials.invalidate(key, &token).await;
                    retried = true;
                }
                Err(e) if e.is_unauthorized() => {
                    return Err(PlatformError::Auth(e.to_string()));
                }
                other => return other,
            }
        }
    }

    fn build(&self, method: Method, url: &str, body: Option<&Value>) -> RequestBuilder {
        let request = self.client.request(method, url);
        match body {
            Some(json) => request.json(json),
            None => request,
        }
    }

    async fn send_once(
        &self,
        request: RequestBuilder,
        token: &str,
    ) -> Result<Option<Value>, PlatformError> {
        let response = request.bearer_auth(token).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::Http {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::token::{AccessToken, CredentialStore};

    struct NoStore;

    #[async_trait]
    impl CredentialStore for NoStore {
        async fn load(&self, _key: &CredentialKey) -> Result<Option<AccessToken>, PlatformError> {
            Ok(None)
        }
        async fn save(&self, _key: &CredentialKey, _token: &AccessToken) -> Result<(), PlatformError> {
            Ok(())
        }
    }

    #[test]
    fn test_url_joins_paths_and_keeps_absolute_refs() {
        let cache = Arc::new(CredentialCache::new(Arc::new(NoStore), 300));
        let client =
            AuthorizedClient::new("https://api.example.com/", Duration::from_secs(5), cache).unwrap();
        assert_eq!(
            client.url("/v1/eats/orders/abc/accept_pos_order"),
            "https://api.example.com/v1/eats/orders/abc/accept_pos_order"
        );
        assert_eq!(
            client.url("https://api.example.com/v2/eats/order/abc"),
            "https://api.example.com/v2/eats/order/abc"
        );
    }

    #[test]
    fn test_deny_reason_text() {
        assert_eq!(DenyReason::StoreClosed.explanation(), "Store is closed");
        assert_eq!(DenyReason::Other("no rider".into()).explanation(), "no rider");
    }
}
