//! Foodpanda
//!
//! Webhook 直接推送完整订单；金额是十进制字符串 ("120.00")。状态推送
//! (`ORDER_CANCELLED` 等) 走同一个 endpoint。

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use reqwest::Method;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
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

pub const SIGNATURE_HEADER: &str = "x-foodpanda-signature";

/// Decimal string or JSON number
fn decimal_field(value: &Value, key: &str) -> Option<Decimal> {
    match value.get(key)? {
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

fn money(value: &Value, key: &str, currency_decimals: i32) -> f64 {
    decimal_field(value, key)
        .map(|d| to_f64(round_currency(d, currency_decimals)))
        .unwrap_or(0.0)
}

fn quantity(value: &Value) -> i32 {
    decimal_field(value, "quantity")
        .and_then(|d| d.trunc().to_i32())
        .filter(|q| *q > 0)
        .unwrap_or(1)
}

pub struct FoodpandaAdapter;

impl PlatformAdapter for FoodpandaAdapter {
    fn platform(&self) -> Platform {
        Platform::Foodpanda
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
        let payload: Value = serde_json::from_slice(body)?;

        if payload.get("products").is_some() {
            return Ok(Notification::NewOrder {
                platform_store_id: str_field(&payload, "/platformRestaurant/id")?.to_string(),
                platform_order_id: str_field(&payload, "/token")?.to_string(),
                source: OrderSource::Inline(payload),
            });
        }

        let Some(status) = opt_str(&payload, "/status") else {
            return Ok(Notification::Ignored("payload without products or status".into()));
        };
        let platform_order_id = opt_str(&payload, "/orderToken")
            .or_else(|| opt_str(&payload, "/token"))
            .ok_or_else(|| PlatformError::payload("status push without order token"))?;
        if status.eq_ignore_ascii_case("ORDER_CANCELLED") || status.eq_ignore_ascii_case("CANCELLED")
        {
            Ok(Notification::Cancelled {
                platform_order_id,
                reason: opt_str(&payload, "/message").or_else(|| opt_str(&payload, "/reason")),
            })
        } else {
            Ok(Notification::StatusUpdate {
                platform_order_id,
                status,
            })
        }
    }

    fn to_internal_order(
        &self,
        payload: &Value,
        catalog: &CatalogIndex,
        currency_decimals: i32,
    ) -> Result<MappedOrder, PlatformError> {
        let platform_order_id = str_field(payload, "/token")?.to_string();
        let products = payload
            .get("products")
            .and_then(Value::as_array)
            .ok_or_else(|| PlatformError::payload("missing field /products"))?;

        let mut warnings = Vec::new();
        let mut lines = Vec::with_capacity(products.len());
        for product in products {
            let options = product
                .get("selectedToppings")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .map(|topping| ExternalOption {
                    external_id: opt_str(topping, "/remoteCode"),
                    name: opt_str(topping, "/name").unwrap_or_default(),
                    price: money(topping, "price", currency_decimals) * f64::from(quantity(topping)),
                })
                .collect();

            let line = ExternalLine {
                external_id: opt_str(product, "/remoteCode"),
                name: str_field(product, "/name")?.to_string(),
                unit_price: money(product, "unitPrice", currency_decimals),
                quantity: quantity(product),
                options,
                note: opt_str(product, "/comment"),
            };
            lines.push(build_dish_line(line, catalog, &mut warnings));
        }

        let order_type = match payload.get("expeditionType").and_then(Value::as_str) {
            Some("pickup") => OrderType::Takeout,
            _ => OrderType::Delivery,
        };

        Ok(MappedOrder {
            platform_order_id,
            display_id: opt_str(payload, "/code"),
            order_type,
            guest_name: opt_str(payload, "/customer/firstName"),
            items: lines,
            platform_status: opt_str(payload, "/status"),
            warnings,
        })
    }
}

/// Foodpanda (Delivery Hero POS middleware) order API
pub struct FoodpandaApi {
    http: AuthorizedClient,
}

impl FoodpandaApi {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        credentials: Arc<CredentialCache>,
    ) -> Result<Self, PlatformError> {
        Ok(Self {
            http: AuthorizedClient::new(base_url, timeout, credentials)?,
        })
    }

    async fn set_status(
        &self,
        link: &PlatformStore,
        token: &str,
        body: Value,
    ) -> Result<(), PlatformError> {
        let key = CredentialKey::for_link(link);
        let url = self.http.url(&format!("/v2/order/status/{token}"));
        self.http.send(&key, Method::PUT, &url, Some(&body)).await?;
        Ok(())
    }
}

fn reject_code(reason: &DenyReason) -> &'static str {
    match reason {
        DenyReason::StoreClosed => "CLOSED",
        DenyReason::ItemUnavailable => "ITEM_UNAVAILABLE",
        DenyReason::TooBusy => "TOO_BUSY",
        DenyReason::Other(_) => "OTHER",
    }
}

#[async_trait]
impl MarketplaceApi for FoodpandaApi {
    fn platform(&self) -> Platform {
        Platform::Foodpanda
    }

    async fn fetch_order(&self, link: &PlatformStore, reference: &str) -> Result<Value, PlatformError> {
        let key = CredentialKey::for_link(link);
        let url = self.http.url(&format!("/v2/orders/{reference}"));
        self.http
            .send(&key, Method::GET, &url, None)
            .await?
            .ok_or_else(|| PlatformError::payload("empty order detail"))
    }

    async fn accept(&self, link: &PlatformStore, platform_order_id: &str) -> Result<(), PlatformError> {
        let accepted_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        self.set_status(
            link,
            platform_order_id,
            json!({ "status": "order_accepted", "acceptanceTime": accepted_at }),
        )
        .await
    }

    async fn deny(
        &self,
        link: &PlatformStore,
        platform_order_id: &str,
        reason: &DenyReason,
    ) -> Result<(), PlatformError> {
        self.set_status(
            link,
            platform_order_id,
            json!({
                "status": "order_rejected",
                "reason": reject_code(reason),
                "message": reason.explanation(),
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
        match status {
            // 接单即视为开始备餐，没有单独的状态
            FulfillmentStatus::InProgress => Ok(()),
            FulfillmentStatus::ReadyForPickup => {
                let key = CredentialKey::for_link(link);
                let url = self
                    .http
                    .url(&format!("/v2/orders/{platform_order_id}/preparation-completed"));
                self.http.send(&key, Method::POST, &url, None).await?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{DishOption, DishTemplate, LineItem};

    fn catalog() -> CatalogIndex {
        CatalogIndex::new(
            vec![DishTemplate {
                id: 1,
                brand_id: 1,
                name: "Beef Noodle Soup".into(),
                price: 120.0,
                external_id: None,
                is_active: true,
            }],
            vec![DishOption {
                id: 10,
                brand_id: 1,
                category_name: "Extras".into(),
                name: "Fried Egg".into(),
                price_modifier: 20.0,
                bound_template_id: Some(7),
                external_id: Some("egg".into()),
                is_active: true,
            }],
        )
    }

    fn order_payload() -> Value {
        json!({
            "token": "fp-token-1",
            "code": "q2xz-1234",
            "expeditionType": "pickup",
            "platformRestaurant": {"id": "fp-store-1"},
            "customer": {"firstName": "Ben"},
            "products": [{
                "remoteCode": null,
                "name": "beef noodle soup",
                "quantity": "2",
                "unitPrice": "120.00",
                "selectedToppings": [
                    {"remoteCode": "egg", "name": "Egg", "price": "20.00", "quantity": 1}
                ]
            }]
        })
    }

    #[test]
    fn test_new_order_is_inline() {
        let body = serde_json::to_vec(&order_payload()).unwrap();
        match FoodpandaAdapter.parse_notification(&body).unwrap() {
            Notification::NewOrder {
                platform_store_id,
                platform_order_id,
                source: OrderSource::Inline(_),
            } => {
                assert_eq!(platform_store_id, "fp-store-1");
                assert_eq!(platform_order_id, "fp-token-1");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_status_pushes() {
        let cancel = br#"{"status": "ORDER_CANCELLED", "orderToken": "fp-token-1", "message": "customer"}"#;
        assert_eq!(
            FoodpandaAdapter.parse_notification(cancel).unwrap(),
            Notification::Cancelled {
                platform_order_id: "fp-token-1".into(),
                reason: Some("customer".into()),
            }
        );
        let picked = br#"{"status": "ORDER_PICKED_UP", "orderToken": "fp-token-1"}"#;
        assert!(matches!(
            FoodpandaAdapter.parse_notification(picked).unwrap(),
            Notification::StatusUpdate { .. }
        ));
        assert!(matches!(
            FoodpandaAdapter.parse_notification(b"{}").unwrap(),
            Notification::Ignored(_)
        ));
    }

    #[test]
    fn test_to_internal_order() {
        let mapped = FoodpandaAdapter
            .to_internal_order(&order_payload(), &catalog(), 0)
            .unwrap();
        assert_eq!(mapped.display_id.as_deref(), Some("q2xz-1234"));
        assert_eq!(mapped.order_type, OrderType::Takeout);
        assert_eq!(mapped.guest_name.as_deref(), Some("Ben"));
        assert!(mapped.warnings.is_empty(), "{:?}", mapped.warnings);

        let LineItem::Dish(line) = &mapped.items[0] else {
            panic!("expected dish")
        };
        assert_eq!(line.template_id, Some(1));
        assert_eq!(line.quantity, 2);
        assert_eq!(line.subtotal, 280.0);
        assert_eq!(line.options[0].option_id, Some(10));
    }

    #[test]
    fn test_decimal_strings() {
        let v = json!({"price": "12.345", "quantity": 3});
        assert_eq!(money(&v, "price", 2), 12.35);
        assert_eq!(quantity(&v), 3);
        assert_eq!(quantity(&json!({})), 1);
    }
}
