//! Marketplace order ingestion
//!
//! Webhook → 签名校验 → 解析通知 → 幂等检查 (platform, platform order id) →
//! 拉取/映射订单 → 宽松校验提交。新订单之后还要在平台期限内调用 accept，
//! 超时即视为平台弃单，内部订单走取消流程释放库存。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use serde::Serialize;
use serde_json::Value;
use shared::models::{
    AcceptStatus, CancelOutcome, Order, OrderStatus, Platform, PlatformOrigin, PlatformStore,
};
use sqlx::SqlitePool;

use super::adapter::{CatalogIndex, Notification, OrderSource, PlatformAdapter};
use super::client::{DenyReason, FulfillmentStatus, MarketplaceApi};
use super::error::PlatformError;
use crate::core::config::{Config, UnmatchedItemPolicy};
use crate::db::repository::{order, platform_store, store};
use crate::orders::{ExternalOrderDraft, OrderError, OrderService};

/// Actor recorded on cancellations the integration performs itself
const SYSTEM_ACTOR: &str = "system";

/// Accept call budget, measured from order receipt
#[derive(Debug, Clone, Copy)]
pub struct AcceptPolicy {
    pub deadline: Duration,
    pub max_attempts: u32,
    /// First retry delay, doubled per attempt
    pub retry_delay: Duration,
}

impl AcceptPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            deadline: Duration::from_secs(config.platform_accept_deadline_secs),
            max_attempts: config.platform_accept_max_attempts,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Result of one webhook delivery
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// New internal order; accept still has to be sent
    Created { order_id: i64, warnings: Vec<String> },
    /// Repeat notification, metadata refreshed only.
    /// `accept_pending`: the accept call never got a result (e.g. lost on restart)
    Duplicate { order_id: i64, accept_pending: bool },
    Cancelled { order_id: i64, warnings: Vec<String> },
    StatusUpdated { order_id: i64 },
    Ignored { reason: String },
}

impl WebhookOutcome {
    /// Order awaiting the marketplace accept call
    pub fn pending_accept(&self) -> Option<i64> {
        match self {
            WebhookOutcome::Created { order_id, .. }
            | WebhookOutcome::Duplicate {
                order_id,
                accept_pending: true,
            } => Some(*order_id),
            _ => None,
        }
    }
}

struct Integration {
    adapter: Arc<dyn PlatformAdapter>,
    api: Arc<dyn MarketplaceApi>,
    webhook_secret: Option<String>,
}

pub struct PlatformOrderService {
    pool: SqlitePool,
    orders: OrderService,
    integrations: HashMap<Platform, Integration>,
    policy: UnmatchedItemPolicy,
    accept: AcceptPolicy,
}

impl PlatformOrderService {
    pub fn new(
        pool: SqlitePool,
        orders: OrderService,
        policy: UnmatchedItemPolicy,
        accept: AcceptPolicy,
    ) -> Self {
        Self {
            pool,
            orders,
            integrations: HashMap::new(),
            policy,
            accept,
        }
    }

    /// Register a marketplace. Without a webhook secret signatures are not checked.
    pub fn register(
        mut self,
        adapter: Arc<dyn PlatformAdapter>,
        api: Arc<dyn MarketplaceApi>,
        webhook_secret: Option<String>,
    ) -> Self {
        let platform = adapter.platform();
        if webhook_secret.is_none() {
            tracing::warn!(%platform, "No webhook secret configured, signatures not verified");
        }
        self.integrations.insert(
            platform,
            Integration {
                adapter,
                api,
                webhook_secret,
            },
        );
        self
    }

    fn integration(&self, platform: Platform) -> Result<&Integration, PlatformError> {
        self.integrations
            .get(&platform)
            .ok_or_else(|| PlatformError::Unsupported(platform.to_string()))
    }

    pub async fn handle_webhook(
        &self,
        platform: Platform,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<WebhookOutcome, PlatformError> {
        let integration = self.integration(platform)?;
        if let Some(secret) = &integration.webhook_secret {
            integration.adapter.verify_signature(secret, headers, body)?;
        }

        match integration.adapter.parse_notification(body)? {
            Notification::NewOrder {
                platform_store_id,
                platform_order_id,
                source,
            } => {
                self.ingest(integration, &platform_store_id, &platform_order_id, source)
                    .await
            }
            Notification::Cancelled {
                platform_order_id,
                reason,
            } => self.cancelled(platform, &platform_order_id, reason).await,
            Notification::StatusUpdate {
                platform_order_id,
                status,
            } => {
                let Some(existing) =
                    order::find_by_platform_order(&self.pool, platform, &platform_order_id).await?
                else {
                    return Ok(ignored(platform, &platform_order_id, "status for unknown order"));
                };
                self.touch(&existing, Some(&status)).await?;
                tracing::info!(%platform, platform_order_id, status, order_id = existing.id, "Marketplace status synced");
                Ok(WebhookOutcome::StatusUpdated {
                    order_id: existing.id,
                })
            }
            Notification::Ignored(kind) => {
                tracing::debug!(%platform, kind, "Webhook event ignored");
                Ok(WebhookOutcome::Ignored { reason: kind })
            }
        }
    }

    async fn ingest(
        &self,
        integration: &Integration,
        platform_store_id: &str,
        platform_order_id: &str,
        source: OrderSource,
    ) -> Result<WebhookOutcome, PlatformError> {
        let platform = integration.adapter.platform();
        if let Some(existing) =
            order::find_by_platform_order(&self.pool, platform, platform_order_id).await?
        {
            return self.duplicate(&existing).await;
        }

        let link = platform_store::find_by_platform_store_id(&self.pool, platform, platform_store_id)
            .await?
            .ok_or_else(|| PlatformError::StoreNotLinked {
                platform,
                platform_store_id: platform_store_id.to_string(),
            })?;
        let store = store::find_by_id(&self.pool, link.store_id)
            .await?
            .filter(|s| s.is_active)
            .ok_or(OrderError::StoreNotFound(link.store_id))?;

        let payload: Value = match source {
            OrderSource::Inline(payload) => payload,
            OrderSource::Fetch(reference) => integration.api.fetch_order(&link, &reference).await?,
        };
        let catalog = CatalogIndex::load(&self.pool, store.brand_id).await?;
        let mapped = integration
            .adapter
            .to_internal_order(&payload, &catalog, store.currency_decimals)?;
        if mapped.platform_order_id != platform_order_id {
            return Err(PlatformError::payload(format!(
                "order detail {} does not match notification {platform_order_id}",
                mapped.platform_order_id
            )));
        }

        let now = shared::util::now_millis();
        let draft = ExternalOrderDraft {
            store_id: store.id,
            order_type: mapped.order_type,
            guest_name: mapped.guest_name,
            items: mapped.items,
            origin: PlatformOrigin {
                platform,
                platform_order_id: platform_order_id.to_string(),
                display_id: mapped.display_id,
                raw_payload: payload,
                platform_status: mapped.platform_status,
                accept_status: AcceptStatus::Pending,
                received_at: now,
                last_synced_at: now,
                warnings: mapped.warnings,
            },
        };

        let committed = match self.orders.ingest_external(draft).await {
            Ok(committed) => committed,
            Err(OrderError::Duplicate(_)) => {
                // 并发投递: 另一个请求先插入了同一个平台订单
                let existing =
                    order::find_by_platform_order(&self.pool, platform, platform_order_id)
                        .await?
                        .ok_or_else(|| OrderError::Duplicate(platform_order_id.to_string()))?;
                return self.duplicate(&existing).await;
            }
            Err(e) => return Err(e.into()),
        };

        let warnings = committed
            .platform
            .as_ref()
            .map(|o| o.warnings.clone())
            .unwrap_or_default();
        self.report_warnings(&committed, &warnings);
        tracing::info!(
            %platform,
            platform_order_id,
            order_id = committed.id,
            sequence_code = %committed.sequence_code,
            "Marketplace order ingested"
        );
        Ok(WebhookOutcome::Created {
            order_id: committed.id,
            warnings,
        })
    }

    async fn duplicate(&self, existing: &Order) -> Result<WebhookOutcome, PlatformError> {
        self.touch(existing, None).await?;
        let accept_pending = existing.status != OrderStatus::Cancelled
            && existing
                .platform
                .as_ref()
                .is_some_and(|o| o.accept_status == AcceptStatus::Pending);
        tracing::info!(
            order_id = existing.id,
            accept_pending,
            "Repeat marketplace notification, metadata refreshed"
        );
        Ok(WebhookOutcome::Duplicate {
            order_id: existing.id,
            accept_pending,
        })
    }

    async fn cancelled(
        &self,
        platform: Platform,
        platform_order_id: &str,
        reason: Option<String>,
    ) -> Result<WebhookOutcome, PlatformError> {
        let Some(existing) =
            order::find_by_platform_order(&self.pool, platform, platform_order_id).await?
        else {
            return Ok(ignored(platform, platform_order_id, "cancellation for unknown order"));
        };
        self.touch(&existing, Some("CANCELLED")).await?;

        let reason = reason.unwrap_or_else(|| format!("cancelled on {platform}"));
        match self.orders.cancel(existing.id, &reason, platform.as_str()).await {
            Ok(outcome) => Ok(WebhookOutcome::Cancelled {
                order_id: existing.id,
                warnings: outcome.warnings,
            }),
            Err(OrderError::AlreadyCancelled(order_id)) => Ok(WebhookOutcome::Duplicate {
                order_id,
                accept_pending: false,
            }),
            Err(OrderError::TerminalState { order_id, status }) => {
                tracing::warn!(
                    target: "operator_alert",
                    %platform,
                    platform_order_id,
                    order_id,
                    %status,
                    "Marketplace cancelled an order that is already {status}"
                );
                Ok(ignored(platform, platform_order_id, "order already completed"))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn touch(&self, existing: &Order, status: Option<&str>) -> Result<(), PlatformError> {
        order::touch_platform_origin(&self.pool, existing.id, status, shared::util::now_millis())
            .await?;
        Ok(())
    }

    fn report_warnings(&self, committed: &Order, warnings: &[String]) {
        if warnings.is_empty() {
            return;
        }
        match self.policy {
            UnmatchedItemPolicy::Silent => {}
            UnmatchedItemPolicy::Warn => {
                tracing::warn!(order_id = committed.id, ?warnings, "Marketplace order ingested with warnings");
            }
            UnmatchedItemPolicy::Alert => {
                tracing::error!(
                    target: "operator_alert",
                    order_id = committed.id,
                    store_id = committed.store_id,
                    total = committed.total,
                    ?warnings,
                    "Marketplace order needs review: unmatched or mis-priced items"
                );
            }
        }
    }

    async fn link_for(&self, existing: &Order) -> Result<(PlatformStore, &Integration, String), PlatformError> {
        let origin = existing
            .platform
            .as_ref()
            .ok_or_else(|| PlatformError::payload(format!("order {} is not a marketplace order", existing.id)))?;
        let integration = self.integration(origin.platform)?;
        let link = platform_store::find_by_store(&self.pool, origin.platform, existing.store_id)
            .await?
            .ok_or_else(|| PlatformError::StoreNotLinked {
                platform: origin.platform,
                platform_store_id: format!("(store {})", existing.store_id),
            })?;
        Ok((link, integration, origin.platform_order_id.clone()))
    }

    /// Send the accept call with bounded retries inside the accept deadline.
    ///
    /// Missing the deadline (or a non-retryable rejection) forfeits the order:
    /// recorded as `forfeited` and the internal order is cancelled so its
    /// reservation is unwound. That is an outcome, not an error.
    pub async fn accept_with_deadline(&self, order_id: i64) -> Result<AcceptStatus, PlatformError> {
        let existing = self.orders.find(order_id).await?;
        let (link, integration, platform_order_id) = self.link_for(&existing).await?;
        let received_at = existing
            .platform
            .as_ref()
            .map(|o| o.received_at)
            .unwrap_or(existing.created_at);
        if let Some(origin) = existing.platform.as_ref().filter(|o| o.accept_status != AcceptStatus::Pending) {
            return Ok(origin.accept_status);
        }
        if existing.status == OrderStatus::Cancelled {
            tracing::info!(order_id, "Order cancelled before accept, skipping");
            return Ok(AcceptStatus::Pending);
        }

        let deadline_at = received_at + i64::try_from(self.accept.deadline.as_millis()).unwrap_or(i64::MAX);
        let mut delay = self.accept.retry_delay;
        let mut last_error: Option<PlatformError> = None;

        for attempt in 1..=self.accept.max_attempts {
            let remaining = deadline_at - shared::util::now_millis();
            if remaining <= 0 {
                break;
            }
            let budget = Duration::from_millis(remaining as u64);
            let result = tokio::time::timeout(budget, integration.api.accept(&link, &platform_order_id)).await;
            match result {
                Ok(Ok(())) => {
                    order::set_accept_status(
                        &self.pool,
                        order_id,
                        AcceptStatus::Accepted,
                        shared::util::now_millis(),
                    )
                    .await?;
                    tracing::info!(order_id, platform_order_id, attempt, "Marketplace order accepted");
                    return Ok(AcceptStatus::Accepted);
                }
                Ok(Err(e)) if !e.is_retryable() => {
                    tracing::warn!(order_id, attempt, error = %e, "Accept rejected, not retrying");
                    last_error = Some(e);
                    break;
                }
                Ok(Err(e)) => {
                    tracing::warn!(order_id, attempt, error = %e, "Accept failed, will retry");
                    last_error = Some(e);
                }
                Err(_) => {
                    last_error = Some(PlatformError::Timeout);
                    break;
                }
            }

            if attempt < self.accept.max_attempts {
                let remaining = (deadline_at - shared::util::now_millis()).max(0) as u64;
                tokio::time::sleep(delay.min(Duration::from_millis(remaining))).await;
                delay = delay.saturating_mul(2);
            }
        }

        self.forfeit(order_id, &platform_order_id, last_error).await
    }

    async fn forfeit(
        &self,
        order_id: i64,
        platform_order_id: &str,
        cause: Option<PlatformError>,
    ) -> Result<AcceptStatus, PlatformError> {
        let cause = cause.map_or_else(|| "accept deadline passed".to_string(), |e| e.to_string());
        let recorded = order::set_accept_status(
            &self.pool,
            order_id,
            AcceptStatus::Forfeited,
            shared::util::now_millis(),
        )
        .await?;
        if !recorded {
            // 已经有别的结果 (并发的 accept 任务)
            let latest = self.orders.find(order_id).await?;
            return Ok(latest
                .platform
                .map_or(AcceptStatus::Pending, |o| o.accept_status));
        }
        tracing::error!(
            target: "operator_alert",
            order_id,
            platform_order_id,
            cause = %cause,
            "Marketplace order forfeited, accept not confirmed in time"
        );

        match self
            .orders
            .cancel(order_id, "marketplace accept not confirmed in time", SYSTEM_ACTOR)
            .await
        {
            Ok(outcome) => {
                for warning in &outcome.warnings {
                    tracing::warn!(order_id, warning, "Forfeit cancellation warning");
                }
                Ok(AcceptStatus::Forfeited)
            }
            Err(OrderError::AlreadyCancelled(_)) => Ok(AcceptStatus::Forfeited),
            Err(e) => Err(e.into()),
        }
    }

    /// Reject a marketplace order and cancel it internally
    pub async fn deny(&self, order_id: i64, reason: DenyReason) -> Result<CancelOutcome, PlatformError> {
        let existing = self.orders.find(order_id).await?;
        if existing.status.is_terminal() {
            return Err(OrderError::TerminalState {
                order_id,
                status: existing.status,
            }
            .into());
        }
        let (link, integration, platform_order_id) = self.link_for(&existing).await?;
        integration.api.deny(&link, &platform_order_id, &reason).await?;
        self.touch(&existing, Some("DENIED")).await?;
        tracing::info!(order_id, platform_order_id, reason = reason.explanation(), "Marketplace order denied");

        let outcome = self
            .orders
            .cancel(order_id, &format!("denied: {}", reason.explanation()), SYSTEM_ACTOR)
            .await?;
        Ok(outcome)
    }

    /// Kitchen started: notify the marketplace, then move to `preparing`
    pub async fn mark_in_progress(&self, order_id: i64) -> Result<Order, PlatformError> {
        let existing = self.orders.find(order_id).await?;
        let (link, integration, platform_order_id) = self.link_for(&existing).await?;
        integration
            .api
            .update_status(&link, &platform_order_id, FulfillmentStatus::InProgress)
            .await?;
        Ok(self.orders.advance_status(order_id, OrderStatus::Preparing).await?)
    }

    /// Food ready for the courier
    pub async fn mark_ready(&self, order_id: i64) -> Result<Order, PlatformError> {
        let existing = self.orders.find(order_id).await?;
        if existing.status.is_terminal() {
            return Err(OrderError::TerminalState {
                order_id,
                status: existing.status,
            }
            .into());
        }
        let (link, integration, platform_order_id) = self.link_for(&existing).await?;
        integration
            .api
            .update_status(&link, &platform_order_id, FulfillmentStatus::ReadyForPickup)
            .await?;
        self.touch(&existing, Some("READY_FOR_PICKUP")).await?;
        Ok(self.orders.find(order_id).await?)
    }
}

fn ignored(platform: Platform, platform_order_id: &str, reason: &str) -> WebhookOutcome {
    tracing::info!(%platform, platform_order_id, reason, "Webhook ignored");
    WebhookOutcome::Ignored {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_accept_for_created_and_unanswered_repeat() {
        let created = WebhookOutcome::Created {
            order_id: 7,
            warnings: vec![],
        };
        assert_eq!(created.pending_accept(), Some(7));
        let repeat = |accept_pending| WebhookOutcome::Duplicate {
            order_id: 7,
            accept_pending,
        };
        assert_eq!(repeat(true).pending_accept(), Some(7));
        assert_eq!(repeat(false).pending_accept(), None);
        assert_eq!(
            WebhookOutcome::StatusUpdated { order_id: 7 }.pending_accept(),
            None
        );
    }

    #[test]
    fn test_outcome_serializes_tagged() {
        let json = serde_json::to_value(WebhookOutcome::Ignored {
            reason: "x".into(),
        })
        .unwrap();
        assert_eq!(json["outcome"], "ignored");

        let json = serde_json::to_value(WebhookOutcome::Duplicate {
            order_id: 7,
            accept_pending: true,
        })
        .unwrap();
        assert_eq!(json["outcome"], "duplicate");
        assert_eq!(json["accept_pending"], true);
    }
}
