//! OAuth token endpoint client

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use shared::models::Platform;

use super::error::PlatformError;
use super::token::{AccessToken, CredentialKey, TokenRefresher};
use crate::core::config::PlatformConfig;

/// Scope requested for Uber Eats client-credentials tokens
const UBER_EATS_SCOPE: &str = "eats.order eats.store";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Seconds
    expires_in: i64,
}

/// Refreshes tokens against each platform's OAuth endpoint
pub struct HttpTokenRefresher {
    client: Client,
    configs: HashMap<Platform, PlatformConfig>,
}

impl HttpTokenRefresher {
    pub fn new(timeout: Duration, configs: HashMap<Platform, PlatformConfig>) -> Result<Self, PlatformError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PlatformError::Network(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, configs })
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(
        &self,
        key: &CredentialKey,
        refresh_token: Option<&str>,
    ) -> Result<AccessToken, PlatformError> {
        let config = self
            .configs
            .get(&key.platform)
            .ok_or_else(|| PlatformError::Unsupported(key.platform.to_string()))?;
        if config.client_id.is_empty() {
            return Err(PlatformError::Auth(format!("{} client id not configured", key.platform)));
        }

        let mut form: Vec<(&str, &str)> = vec![
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
        ];
        match (key.platform, refresh_token) {
            (_, Some(token)) if key.platform_store_id.is_some() => {
                form.push(("grant_type", "refresh_token"));
                form.push(("refresh_token", token));
            }
            (Platform::UberEats, _) => {
                form.push(("grant_type", "client_credentials"));
                form.push(("scope", UBER_EATS_SCOPE));
            }
            (Platform::Foodpanda, _) => {
                // Foodpanda middleware 用 username/password 换 token
                form = vec![
                    ("username", config.client_id.as_str()),
                    ("password", config.client_secret.as_str()),
                    ("grant_type", "client_credentials"),
                ];
            }
        }

        let response = self.client.post(&config.token_url).form(&form).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(token_endpoint_error(status.as_u16(), body));
        }

        let token: TokenResponse = response.json().await?;
        Ok(AccessToken {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: shared::util::now_millis() + token.expires_in.max(0) * 1000,
        })
    }
}

/// 只有凭证被拒才算授权失败；限流和 5xx 保持可重试
fn token_endpoint_error(status: u16, body: String) -> PlatformError {
    match status {
        400 | 401 | 403 => {
            PlatformError::Auth(format!("token endpoint returned HTTP {status}: {body}"))
        }
        _ => PlatformError::Http { status, body },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_credentials_are_auth_errors() {
        for status in [400, 401, 403] {
            let err = token_endpoint_error(status, "invalid_client".into());
            assert!(matches!(err, PlatformError::Auth(_)), "{status}: {err:?}");
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn test_throttled_or_down_endpoint_stays_retryable() {
        for status in [429, 500, 503] {
            let err = token_endpoint_error(status, String::new());
            assert!(matches!(err, PlatformError::Http { .. }), "{status}: {err:?}");
            assert!(err.is_retryable(), "{status}");
        }
    }

    #[tokio::test]
    async fn test_missing_client_id_is_auth_error() {
        let refresher = HttpTokenRefresher::new(
            Duration::from_secs(1),
            HashMap::from([(
                Platform::UberEats,
                PlatformConfig {
                    api_base_url: "http://127.0.0.1:9".into(),
                    token_url: "http://127.0.0.1:9/oauth/token".into(),
                    client_id: String::new(),
                    client_secret: String::new(),
                    webhook_secret: None,
                },
            )]),
        )
        .unwrap();
        let err = refresher
            .refresh(&CredentialKey::app(Platform::UberEats), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Auth(_)), "{err:?}");
    }
}
