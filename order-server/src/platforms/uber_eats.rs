//! Uber Eats
//!
//! Webhook 只带通知 (`resource_href`)，订单详情需要回拉。金额是 `amount_e5`
//! 定点整数 (×10^5)。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use reqwest::Method;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use shared::models::{OrderType, Platform, PlatformStore};

use super::adapter::{
    CatalogIndex, ExternalLine, ExternalOption, MappedOrder, Notification, OrderSource,
    PlatformAdapter, build_dish_line, opt_str, str_field,
};
use super::client::{AuthorizedClient, DenyReason, FulfillmentStatus, MarketplaceApi};
use super::error::PlatformError;
use super::signature::verify_hex_header;
use super::token::{CredentialCache, CredentialKey};
use crate::orders::money::{round_currency, to_f64};

pub const SIGNATURE_HEADER: &str = "x-uber-signature";

/// `amount_e5` → store currency
pub fn money_from_e5(amount_e5: i64, currency_decimals: i32) -> f64 {
    to_f64(round_currency(Decimal::new(amount_e5, 5), currency_decimals))
}

fn price_e5(value: &Value, pointer: &str) -> i64 {
    value.pointer(pointer).and_then(Value::as_i64).unwrap_or(0)
}

pub struct UberEatsAdapter;

impl PlatformAdapter for UberEatsAdapter {
    fn platform(&self) -> Platform {
        Platform::UberEats
    }

    fn verify_signature(
        &self,
        secret: &str,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<(), PlatformError> {
        verify_hex_header(secret, headers, SIGNATURE_HEADER, body)
    }

    fn parse_notification(&self, body: &[u8]) -> Result<Notification, PlatformError> {
        let event: Value = serde_json::from_slice(body)?;
        let event_type = str_field(&event, "/event_type")?;
        let order_id = || str_field(&event, "/meta/resource_id").map(str::to_string);

        match event_type {
            "orders.notification" | "orders.scheduled.notification" => {
                let platform_store_id = str_field(&event, "/meta/user_id")?.to_string();
                let platform_order_id = order_id()?;
                let href = opt_str(&event, "/resource_href")
                    .unwrap_or_else(|| format!("/v2/eats/order/{platform_order_id}"));
                Ok(Notification::NewOrder {
                    platform_store_id,
                    platform_order_id,
                    source: OrderSource::Fetch(href),
                })
            }
            "orders.cancel" => Ok(Notification::Cancelled {
                platform_order_id: order_id()?,
                reason: opt_str(&event, "/meta/reason"),
            }),
            other => match opt_str(&event, "/meta/status") {
                Some(status) if other.starts_with("orders.") => Ok(Notification::StatusUpdate {
                    platform_order_id: order_id()?,
                    status,
                }),
                _ => Ok(Notification::Ignored(other.to_string())),
            },
        }
    }

    fn to_internal_order(
        &self,
        payload: &Value,
        catalog: &CatalogIndex,
        currency_decimals: i32,
    ) -> Result<MappedOrder, PlatformError> {
        let platform_order_id = str_field(payload, "/id")?.to_string();
        let items = payload
            .pointer("/cart/items")
            .and_then(Value::as_array)
            .ok_or_else(|| PlatformError::payload("missing field /cart/items"))?;

        let mut warnings = Vec::new();
        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            let quantity = item.get("quantity").and_then(Value::as_i64).unwrap_or(1);
            let options = item
                .get("selected_modifier_groups")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(|group| group.get("selected_items").and_then(Value::as_array))
                .flatten()
                .map(|modifier| {
                    let count = modifier.get("quantity").and_then(Value::as_i64).unwrap_or(1);
                    ExternalOption {
                        external_id: opt_str(modifier, "/external_data")
                            .or_else(|| opt_str(modifier, "/id")),
                        name: opt_str(modifier, "/title").unwrap_or_default(),
                        price: money_from_e5(
                            price_e5(modifier, "/price/unit_price/amount_e5") * count,
                            currency_decimals,
                        ),
                    }
                })
                .collect();

            let line = ExternalLine {
                external_id: opt_str(item, "/external_data").or_else(|| opt_str(item, "/id")),
                name: str_field(item, "/title")?.to_string(),
                unit_price: money_from_e5(
                    price_e5(item, "/price/unit_price/amount_e5"),
                    currency_decimals,
                ),
                quantity: i32::try_from(quantity.max(1)).unwrap_or(i32::MAX),
                options,
                note: opt_str(item, "/special_instructions"),
            };
            lines.push(build_dish_line(line, catalog, &mut warnings));
        }

        let order_type = match payload.get("type").and_then(Value::as_str) {
            Some("PICK_UP") => OrderType::Takeout,
            Some("DINE_IN") => OrderType::DineIn,
            _ => OrderType::Delivery,
        };

        Ok(MappedOrder {
            platform_order_id,
            display_id: opt_str(payload, "/display_id"),
            order_type,
            guest_name: opt_str(payload, "/eater/first_name"),
            items: lines,
            platform_status: opt_str(payload, "/current_state"),
            warnings,
        })
    }
}

/// Uber Eats order API
pub struct UberEatsApi {
    http: AuthorizedClient,
}

impl UberEatsApi {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        credentials: Arc<CredentialCache>,
    ) -> Result<Self, PlatformError> {
        Ok(Self {
            http: AuthorizedClient::new(base_url, timeout, credentials)?,
        })
    }

    async fn post(
        &self,
        link: &PlatformStore,
        path: String,
        body: Value,
    ) -> Result<(), PlatformError> {
        let key = CredentialKey::for_link(link);
        self.http
            .send(&key, Method::POST, &self.http.url(&path), Some(&body))
            .await?;
        Ok(())
    }
}

fn deny_code(reason: &DenyReason) -> &'static str {
    match reason {
        DenyReason::StoreClosed => "STORE_CLOSED",
        DenyReason::ItemUnavailable => "ITEM_AVAILABILITY",
        DenyReason::TooBusy => "CAPACITY",
        DenyReason::Other(_) => "OTHER",
    }
}

#[async_trait]
impl MarketplaceApi for UberEatsApi {
    fn platform(&self) -> Platform {
        Platform::UberEats
    }

    async fn fetch_order(&self, link: &PlatformStore, reference: &str) -> Result<Value, PlatformError> {
        let key = CredentialKey::for_link(link);
        let url = if reference.contains('/') {
            self.http.url(reference)
        } else {
            self.http.url(&format!("/v2/eats/order/{reference}"))
        };
        self.http
            .send(&key, Method::GET, &url, None)
            .await?
            .ok_or_else(|| PlatformError::payload("empty order detail"))
    }

    async fn accept(&self, link: &PlatformStore, platform_order_id: &str) -> Result<(), PlatformError> {
        self.post(
            link,
            format!("/v1/eats/orders/{platform_order_id}/accept_pos_order"),
            json!({ "reason": "accepted" }),
        )
        .await
    }

    async fn deny(
        &self,
        link: &PlatformStore,
        platform_order_id: &str,
        reason: &DenyReason,
    ) -> Result<(), PlatformError> {
        self.post(
            link,
            format!("/v1/eats/orders/{platform_order_id}/deny_pos_order"),
            json!({
                "reason": {
                    "explanation": reason.explanation(),
                    "code": deny_code(reason),
                }
            }),
        )
        .await
    }

    async fn update_status(
        &self,
        link: &PlatformStore,
        platform_order_id: &str,
        status: FulfillmentStatus,
    ) -> Result<(), PlatformError> {
        let action = match status {
            FulfillmentStatus::InProgress => "start_preparing",
            FulfillmentStatus::ReadyForPickup => "ready",
        };
        self.post(
            link,
            format!("/v1/eats/orders/{platform_order_id}/{action}"),
            json!({}),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{DishTemplate, LineItem};

    fn catalog() -> CatalogIndex {
        CatalogIndex::new(
            vec![DishTemplate {
                id: 1,
                brand_id: 1,
                name: "Beef Noodle Soup".into(),
                price: 120.0,
                external_id: Some("beef-1".into()),
                is_active: true,
            }],
            vec![],
        )
    }

    #[test]
    fn test_money_from_e5() {
        assert_eq!(money_from_e5(12_000_000, 0), 120.0);
        assert_eq!(money_from_e5(1_234_567, 2), 12.35);
        assert_eq!(money_from_e5(0, 2), 0.0);
    }

    #[test]
    fn test_parse_notifications() {
        let adapter = UberEatsAdapter;
        let new_order = br#"{
            "event_type": "orders.notification",
            "meta": {"resource_id": "ue-123", "user_id": "store-9", "status": "pos"},
            "resource_href": "https://api.uber.com/v2/eats/order/ue-123"
        }"#;
        assert_eq!(
            adapter.parse_notification(new_order).unwrap(),
            Notification::NewOrder {
                platform_store_id: "store-9".into(),
                platform_order_id: "ue-123".into(),
                source: OrderSource::Fetch("https://api.uber.com/v2/eats/order/ue-123".into()),
            }
        );

        let cancel = br#"{"event_type": "orders.cancel", "meta": {"resource_id": "ue-123"}}"#;
        assert!(matches!(
            adapter.parse_notification(cancel).unwrap(),
            Notification::Cancelled { platform_order_id, .. } if platform_order_id == "ue-123"
        ));

        let other = br#"{"event_type": "store.provisioned", "meta": {}}"#;
        assert!(matches!(
            adapter.parse_notification(other).unwrap(),
            Notification::Ignored(_)
        ));

        assert!(adapter.parse_notification(b"not json").is_err());
    }

    #[test]
    fn test_to_internal_order() {
        let payload = json!({
            "id": "ue-123",
            "display_id": "A1B2C",
            "current_state": "CREATED",
            "type": "PICK_UP",
            "eater": {"first_name": "Amy"},
            "cart": {"items": [
                {
                    "id": "x",
                    "external_data": "beef-1",
                    "title": "Beef Noodle Soup",
                    "quantity": 2,
                    "price": {"unit_price": {"amount_e5": 12_000_000}},
                    "selected_modifier_groups": [{
                        "title": "Extras",
                        "selected_items": [{
                            "title": "Fried Egg",
                            "quantity": 1,
                            "price": {"unit_price": {"amount_e5": 2_000_000}}
                        }]
                    }]
                },
                {
                    "id": "y",
                    "title": "Bubble Tea",
                    "quantity": 1,
                    "price": {"unit_price": {"amount_e5": 6_000_000}}
                }
            ]}
        });
        let mapped = UberEatsAdapter
            .to_internal_order(&payload, &catalog(), 0)
            .unwrap();
        assert_eq!(mapped.platform_order_id, "ue-123");
        assert_eq!(mapped.display_id.as_deref(), Some("A1B2C"));
        assert_eq!(mapped.order_type, OrderType::Takeout);
        assert_eq!(mapped.guest_name.as_deref(), Some("Amy"));
        assert_eq!(mapped.items.len(), 2);

        let LineItem::Dish(beef) = &mapped.items[0] else {
            panic!("expected dish")
        };
        assert_eq!(beef.template_id, Some(1));
        assert_eq!(beef.subtotal, 280.0);

        // bubble tea and the unmatched egg option
        assert_eq!(mapped.warnings.len(), 2);
    }
}
