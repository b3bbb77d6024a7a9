//! Credential Cache (token manager)
//!
//! 每个平台身份 (platform, 可选 platform store) 一把异步锁。拿锁后检查缓存，
//! 过期或临近过期才刷新；并发调用者排在同一把锁后面，等到的是第一个调用者
//! 刷新出的结果 (token 或错误)，不会对授权服务器发出第二次刷新请求。

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use shared::models::{Platform, PlatformStore};
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use super::error::PlatformError;
use crate::db::repository::platform_store;

/// Platform identity a token belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialKey {
    pub platform: Platform,
    /// None for app-level (client credentials) tokens
    pub platform_store_id: Option<String>,
}

impl CredentialKey {
    pub fn app(platform: Platform) -> Self {
        Self {
            platform,
            platform_store_id: None,
        }
    }

    pub fn store(platform: Platform, platform_store_id: impl Into<String>) -> Self {
        Self {
            platform,
            platform_store_id: Some(platform_store_id.into()),
        }
    }

    /// Store-level key when the link was authorised per store (has its own
    /// refresh token), otherwise the application-level key
    pub fn for_link(link: &PlatformStore) -> Self {
        if link.refresh_token.is_some() {
            Self::store(link.platform, link.platform_store_id.clone())
        } else {
            Self::app(link.platform)
        }
    }
}

impl std::fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.platform_store_id {
            Some(id) => write!(f, "{}/{id}", self.platform),
            None => write!(f, "{}", self.platform),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix millis
    pub expires_at: i64,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("access_token", &"***")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AccessToken {
    /// Usable for at least `margin_ms` more
    pub fn is_fresh(&self, now: i64, margin_ms: i64) -> bool {
        self.expires_at - margin_ms > now
    }
}

/// Calls the upstream authorization server
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(
        &self,
        key: &CredentialKey,
        refresh_token: Option<&str>,
    ) -> Result<AccessToken, PlatformError>;
}

/// Persisted OAuth fields backing the in-memory cache
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self, key: &CredentialKey) -> Result<Option<AccessToken>, PlatformError>;
    async fn save(&self, key: &CredentialKey, token: &AccessToken) -> Result<(), PlatformError>;
}

/// OAuth fields on the platform-store link rows
pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn load(&self, key: &CredentialKey) -> Result<Option<AccessToken>, PlatformError> {
        let row =
            platform_store::load_token(&self.pool, key.platform, key.platform_store_id.as_deref())
                .await?;
        Ok(row.map(|(access_token, refresh_token, expires_at)| AccessToken {
            access_token,
            refresh_token,
            expires_at,
        }))
    }

    async fn save(&self, key: &CredentialKey, token: &AccessToken) -> Result<(), PlatformError> {
        platform_store::save_token(
            &self.pool,
            key.platform,
            key.platform_store_id.as_deref(),
            &token.access_token,
            token.refresh_token.as_deref(),
            token.expires_at,
        )
        .await?;
        Ok(())
    }
}

#[derive(Default)]
struct SlotState {
    token: Option<AccessToken>,
    /// Last failed refresh, tagged with its failure number
    failed: Option<(u64, PlatformError)>,
}

#[derive(Default)]
struct Slot {
    state: Mutex<SlotState>,
    /// Bumped under the lock whenever a refresh fails
    failures: AtomicU64,
}

pub struct CredentialCache {
    slots: DashMap<CredentialKey, Arc<Slot>>,
    refreshers: HashMap<Platform, Arc<dyn TokenRefresher>>,
    store: Arc<dyn CredentialStore>,
    margin_ms: i64,
}

impl CredentialCache {
    pub fn new(store: Arc<dyn CredentialStore>, margin_secs: i64) -> Self {
        Self {
            slots: DashMap::new(),
            refreshers: HashMap::new(),
            store,
            margin_ms: margin_secs.max(0) * 1000,
        }
    }

    pub fn with_refresher(mut self, platform: Platform, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refreshers.insert(platform, refresher);
        self
    }

    fn slot(&self, key: &CredentialKey) -> Arc<Slot> {
        // DashMap 的 entry 持有分片写锁，clone 出 Arc 后立即释放
        self.slots.entry(key.clone()).or_default().clone()
    }

    /// A valid access token, refreshed first if absent or near expiry
    pub async fn token(&self, key: &CredentialKey) -> Result<String, PlatformError> {
        let slot = self.slot(key);
        // 排队前记下失败次数: 等锁期间的那次刷新如果失败，直接共享它的错误
        let seen_failures = slot.failures.load(Ordering::SeqCst);
        let mut state = slot.state.lock().await;
        let now = shared::util::now_millis();

        if let Some(token) = state.token.as_ref().filter(|t| t.is_fresh(now, self.margin_ms)) {
            return Ok(token.access_token.clone());
        }
        if let Some((n, err)) = state.failed.as_ref().filter(|(n, _)| *n > seen_failures) {
            tracing::debug!(key = %key, failure = *n, "Sharing failed refresh with waiter");
            return Err(err.replay());
        }

        if state.token.is_none() {
            match self.store.load(key).await {
                Ok(Some(stored)) if stored.is_fresh(now, self.margin_ms) => {
                    let access = stored.access_token.clone();
                    state.token = Some(stored);
                    return Ok(access);
                }
                Ok(Some(stale)) => state.token = Some(stale),
                Ok(None) => {}
                Err(e) => tracing::warn!(key = %key, error = %e, "Failed to load stored credential"),
            }
        }

        let refresher = self
            .refreshers
            .get(&key.platform)
            .ok_or_else(|| PlatformError::Unsupported(key.platform.to_string()))?;
        let refresh_token = state.token.as_ref().and_then(|t| t.refresh_token.clone());

        tracing::debug!(key = %key, "Refreshing access token");
        let mut fresh = match refresher.refresh(key, refresh_token.as_deref()).await {
            Ok(fresh) => fresh,
            Err(e) => {
                let n = slot.failures.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::warn!(key = %key, error = %e, retryable = e.is_retryable(), "Token refresh failed");
                state.failed = Some((n, e.replay()));
                return Err(e);
            }
        };
        if fresh.refresh_token.is_none() {
            fresh.refresh_token = refresh_token;
        }

        if let Err(e) = self.store.save(key, &fresh).await {
            tracing::warn!(key = %key, error = %e, "Failed to persist refreshed credential");
        }
        tracing::info!(key = %key, expires_at = fresh.expires_at, "Access token refreshed");

        let access = fresh.access_token.clone();
        state.token = Some(fresh);
        state.failed = None;
        Ok(access)
    }

    /// Run `f` with a valid token
    pub async fn with_token<F, Fut, T>(&self, key: &CredentialKey, f: F) -> Result<T, PlatformError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<T, PlatformError>>,
    {
        let token = self.token(key).await?;
        f(token).await
    }

    /// Drop a token the marketplace rejected.
    ///
    /// Only clears the slot if it still holds `rejected`, so a token another
    /// caller just refreshed survives.
    pub async fn invalidate(&self, key: &CredentialKey, rejected: &str) {
        let slot = self.slot(key);
        let mut state = slot.state.lock().await;
        if let Some(token) = state.token.as_mut() {
            if token.access_token == rejected {
                // 保留 refresh token，下次直接刷新
                token.expires_at = 0;
                tracing::info!(key = %key, "Access token invalidated");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct MemoryStore(parking_lot::Mutex<HashMap<CredentialKey, AccessToken>>);

    #[async_trait]
    impl CredentialStore for MemoryStore {
        async fn load(&self, key: &CredentialKey) -> Result<Option<AccessToken>, PlatformError> {
            Ok(self.0.lock().get(key).cloned())
        }
        async fn save(&self, key: &CredentialKey, token: &AccessToken) -> Result<(), PlatformError> {
            self.0.lock().insert(key.clone(), token.clone());
            Ok(())
        }
    }

    struct SlowRefresher {
        calls: AtomicUsize,
        ttl_ms: i64,
    }

    #[async_trait]
    impl TokenRefresher for SlowRefresher {
        async fn refresh(
            &self,
            _key: &CredentialKey,
            _refresh_token: Option<&str>,
        ) -> Result<AccessToken, PlatformError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(AccessToken {
                access_token: format!("token-{n}"),
                refresh_token: Some("refresh".into()),
                expires_at: shared::util::now_millis() + self.ttl_ms,
            })
        }
    }

    /// Fails with a network error until `failures_left` runs out
    struct FlakyRefresher {
        calls: AtomicUsize,
        failures_left: AtomicUsize,
    }

    #[async_trait]
    impl TokenRefresher for FlakyRefresher {
        async fn refresh(
            &self,
            _key: &CredentialKey,
            _refresh_token: Option<&str>,
        ) -> Result<AccessToken, PlatformError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(PlatformError::Network("connection reset".into()));
            }
            Ok(AccessToken {
                access_token: format!("token-{n}"),
                refresh_token: None,
                expires_at: shared::util::now_millis() + 3_600_000,
            })
        }
    }

    fn flaky_cache(failures: usize) -> (Arc<CredentialCache>, Arc<FlakyRefresher>) {
        let refresher = Arc::new(FlakyRefresher {
            calls: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(failures),
        });
        let store = Arc::new(MemoryStore(parking_lot::Mutex::new(HashMap::new())));
        let cache = CredentialCache::new(store, 300)
            .with_refresher(Platform::UberEats, refresher.clone());
        (Arc::new(cache), refresher)
    }

    fn cache(ttl_ms: i64) -> (Arc<CredentialCache>, Arc<SlowRefresher>) {
        let refresher = Arc::new(SlowRefresher {
            calls: AtomicUsize::new(0),
            ttl_ms,
        });
        let store = Arc::new(MemoryStore(parking_lot::Mutex::new(HashMap::new())));
        let cache = CredentialCache::new(store, 300)
            .with_refresher(Platform::UberEats, refresher.clone());
        (Arc::new(cache), refresher)
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let (cache, refresher) = cache(3_600_000);
        let key = CredentialKey::app(Platform::UberEats);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                let key = key.clone();
                tokio::spawn(async move { cache.token(&key).await })
            })
            .collect();
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), "token-1");
        }
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_near_expiry_token_is_refreshed() {
        // TTL shorter than the 300 s margin: every call refreshes
        let (cache, refresher) = cache(60_000);
        let key = CredentialKey::app(Platform::UberEats);
        assert_eq!(cache.token(&key).await.unwrap(), "token-1");
        assert_eq!(cache.token(&key).await.unwrap(), "token-2");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_only_drops_rejected_token() {
        let (cache, refresher) = cache(3_600_000);
        let key = CredentialKey::app(Platform::UberEats);
        let first = cache.token(&key).await.unwrap();

        cache.invalidate(&key, "someone-elses-token").await;
        assert_eq!(cache.token(&key).await.unwrap(), first);

        cache.invalidate(&key, &first).await;
        assert_eq!(cache.token(&key).await.unwrap(), "token-2");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_platform() {
        let (cache, _) = cache(3_600_000);
        let err = cache
            .token(&CredentialKey::app(Platform::Foodpanda))
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_with_token_passes_token() {
        let (cache, _) = cache(3_600_000);
        let key = CredentialKey::store(Platform::UberEats, "store-1");
        let len = cache
            .with_token(&key, |t| async move { Ok(t.len()) })
            .await
            .unwrap();
        assert_eq!(len, "token-1".len());
    }

    #[tokio::test]
    async fn test_failed_refresh_is_shared_with_waiters() {
        let (cache, refresher) = flaky_cache(usize::MAX);
        let key = CredentialKey::app(Platform::UberEats);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let key = key.clone();
                tokio::spawn(async move { cache.token(&key).await })
            })
            .collect();
        for h in handles {
            let err = h.await.unwrap().unwrap_err();
            assert!(matches!(err, PlatformError::Network(_)), "{err:?}");
        }
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);

        // 之后的调用重新尝试
        assert!(cache.token(&key).await.is_err());
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_transient_refresh_error_stays_retryable() {
        let (cache, refresher) = flaky_cache(1);
        let key = CredentialKey::store(Platform::UberEats, "store-1");

        let err = cache.token(&key).await.unwrap_err();
        assert!(matches!(err, PlatformError::Network(_)), "{err:?}");
        assert!(err.is_retryable());

        assert_eq!(cache.token(&key).await.unwrap(), "token-2");
        assert_eq!(cache.token(&key).await.unwrap(), "token-2");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
    }
}
