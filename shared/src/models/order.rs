//! Order Model
//!
//! An order is the unit of fulfillment. It is created only by the commit
//! pipeline and never hard-deleted: cancellation is a status.

use serde::{Deserialize, Serialize};

use super::platform::Platform;

/// Order lifecycle status
///
/// `pending → paid → {completed | cancelled}`, with `confirmed` / `preparing`
/// as intermediate operational states.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum OrderStatus {
    Pending,
    Paid,
    Confirmed,
    Preparing,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// Completed and cancelled orders never change status again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether an operational transition `self → next` is allowed.
    ///
    /// `Cancelled` is handled by the rollback pipeline and `Paid` by the
    /// payment transition, both are rejected here.
    pub fn can_advance_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Preparing)
                | (Paid, Confirmed)
                | (Paid, Preparing)
                | (Paid, Completed)
                | (Confirmed, Preparing)
                | (Confirmed, Completed)
                | (Preparing, Completed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Confirmed => "confirmed",
            Self::Preparing => "preparing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dine-in / takeout / delivery
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum OrderType {
    DineIn,
    Takeout,
    Delivery,
}

impl OrderType {
    /// Prefix of the daily sequence code (D001 / T001 / E001)
    pub fn sequence_prefix(&self) -> char {
        match self {
            Self::DineIn => 'D',
            Self::Takeout => 'T',
            Self::Delivery => 'E',
        }
    }
}

/// Payment method recorded on the order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum PaymentMethod {
    Cash,
    Card,
    Gateway,
    /// Settled by the marketplace
    Platform,
}

impl PaymentMethod {
    /// Cash and marketplace-settled orders are paid when they are placed
    pub fn settles_immediately(&self) -> bool {
        matches!(self, Self::Cash | Self::Platform)
    }
}

/// A customization option chosen on a dish line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SelectedOption {
    /// Catalog option id (None when the marketplace option could not be matched)
    pub option_id: Option<i64>,
    pub name: String,
    pub price_modifier: f64,
    /// Stock-tracked catalog entry this option consumes, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_template_id: Option<i64>,
}

/// Dish line item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DishLine {
    /// Catalog dish template (None for unmatched marketplace items)
    pub template_id: Option<i64>,
    pub name: String,
    pub unit_price: f64,
    pub quantity: i32,
    #[serde(default)]
    pub options: Vec<SelectedOption>,
    /// `(unit_price + Σ option modifiers) × quantity`
    pub subtotal: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Marketplace item id, kept for reconciliation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

/// Bundle line item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BundleLine {
    pub bundle_id: i64,
    pub name: String,
    pub unit_price: f64,
    pub quantity: i32,
    pub subtotal: f64,
}

/// Polymorphic line item, discriminated by `itemType`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "itemType", rename_all = "snake_case")]
pub enum LineItem {
    Dish(DishLine),
    Bundle(BundleLine),
}

impl LineItem {
    pub fn subtotal(&self) -> f64 {
        match self {
            Self::Dish(d) => d.subtotal,
            Self::Bundle(b) => b.subtotal,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Dish(_) => "dish",
            Self::Bundle(_) => "bundle",
        }
    }
}

/// Promotion model referenced by a discount
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DiscountModel {
    Point,
    Coupon,
    Voucher,
}

/// Discount as recorded on the order
///
/// `claimed_amount` is what the caller submitted, `amount` is what the
/// promotion ledger re-derived from the credit's own definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppliedDiscount {
    pub discount_model: DiscountModel,
    /// Credit ids consumed (one for coupon/voucher, one per point)
    pub ref_ids: Vec<i64>,
    pub claimed_amount: f64,
    pub amount: f64,
}

/// Marketplace accept state for externally sourced orders
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AcceptStatus {
    Pending,
    Accepted,
    Forfeited,
}

/// Origin metadata for orders ingested from a marketplace
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlatformOrigin {
    pub platform: Platform,
    pub platform_order_id: String,
    /// Short code shown to couriers / on the tablet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_id: Option<String>,
    pub raw_payload: serde_json::Value,
    /// Last platform-reported state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_status: Option<String>,
    pub accept_status: AcceptStatus,
    pub received_at: i64,
    pub last_synced_at: i64,
    /// Lenient-ingestion warnings (unmatched items, stock shortfalls)
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Order entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    pub brand_id: i64,
    pub store_id: i64,
    /// Human-readable daily sequence code (e.g. `T007`)
    pub sequence_code: String,
    pub user_id: Option<i64>,
    pub guest_name: Option<String>,
    pub order_type: OrderType,
    pub items: Vec<LineItem>,
    pub dish_subtotal: f64,
    pub bundle_subtotal: f64,
    pub service_charge: f64,
    pub discounts: Vec<AppliedDiscount>,
    pub total_discount: f64,
    pub manual_adjustment: f64,
    pub total: f64,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub paid_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_reference: Option<String>,
    pub points_awarded: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<PlatformOrigin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_by: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Order {
    /// Dish lines, in order
    pub fn dish_lines(&self) -> impl Iterator<Item = &DishLine> {
        self.items.iter().filter_map(|i| match i {
            LineItem::Dish(d) => Some(d),
            LineItem::Bundle(_) => None,
        })
    }

    /// Bundle lines, in order
    pub fn bundle_lines(&self) -> impl Iterator<Item = &BundleLine> {
        self.items.iter().filter_map(|i| match i {
            LineItem::Bundle(b) => Some(b),
            LineItem::Dish(_) => None,
        })
    }

    pub fn is_paid(&self) -> bool {
        self.paid_at.is_some()
    }
}

// ========== Inbound requests ==========

/// Requested line item on order creation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "itemType", rename_all = "snake_case")]
pub enum LineItemInput {
    #[serde(rename_all = "camelCase")]
    Dish {
        template_id: i64,
        #[serde(default)]
        option_ids: Vec<i64>,
        quantity: i32,
        #[serde(default)]
        note: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Bundle { bundle_id: i64, quantity: i32 },
}

/// Requested discount on order creation, discriminated by `discountModel`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "discountModel")]
pub enum DiscountInput {
    #[serde(rename_all = "camelCase")]
    Point { point_ids: Vec<i64>, amount: f64 },
    #[serde(rename_all = "camelCase")]
    Coupon { coupon_id: i64, amount: f64 },
    #[serde(rename_all = "camelCase")]
    Voucher { voucher_id: i64, amount: f64 },
}

impl DiscountInput {
    pub fn model(&self) -> DiscountModel {
        match self {
            Self::Point { .. } => DiscountModel::Point,
            Self::Coupon { .. } => DiscountModel::Coupon,
            Self::Voucher { .. } => DiscountModel::Voucher,
        }
    }

    pub fn claimed_amount(&self) -> f64 {
        match self {
            Self::Point { amount, .. }
            | Self::Coupon { amount, .. }
            | Self::Voucher { amount, .. } => *amount,
        }
    }
}

/// Inbound order creation (storefront / POS)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub brand_id: i64,
    pub store_id: i64,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub guest_name: Option<String>,
    pub order_type: OrderType,
    pub items: Vec<LineItemInput>,
    #[serde(default)]
    pub discounts: Vec<DiscountInput>,
    pub payment_method: PaymentMethod,
    /// Set when an online payment was already confirmed before placing
    #[serde(default)]
    pub payment_confirmed: bool,
    #[serde(default)]
    pub payment_reference: Option<String>,
}

/// Result of a successful order placement
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedOrder {
    pub order: Order,
    /// Present when the order was paid at placement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points_awarded: Option<i64>,
}

/// Payment callback / cashier confirmation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkPaidRequest {
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub payment_reference: Option<String>,
}

/// Operational status change
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceStatusRequest {
    pub status: OrderStatus,
}

/// Admin total adjustment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustOrderRequest {
    pub manual_adjustment: f64,
    pub actor: String,
}

/// Cancellation request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrderRequest {
    pub reason: String,
    pub actor: String,
}

/// Cancellation result: the cancelled order plus any repair steps that failed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOutcome {
    pub order: Order,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_item_tagged_by_item_type() {
        let json = r#"{"itemType":"dish","templateId":7,"optionIds":[3],"quantity":2}"#;
        let item: LineItemInput = serde_json::from_str(json).unwrap();
        match item {
            LineItemInput::Dish {
                template_id,
                option_ids,
                quantity,
                ..
            } => {
                assert_eq!(template_id, 7);
                assert_eq!(option_ids, vec![3]);
                assert_eq!(quantity, 2);
            }
            LineItemInput::Bundle { .. } => panic!("expected dish"),
        }

        let json = r#"{"itemType":"bundle","bundleId":9,"quantity":1}"#;
        let item: LineItemInput = serde_json::from_str(json).unwrap();
        assert!(matches!(item, LineItemInput::Bundle { bundle_id: 9, quantity: 1 }));
    }

    #[test]
    fn test_discount_tagged_by_discount_model() {
        let json = r#"{"discountModel":"Voucher","voucherId":42,"amount":100.0}"#;
        let d: DiscountInput = serde_json::from_str(json).unwrap();
        assert_eq!(d.model(), DiscountModel::Voucher);
        assert_eq!(d.claimed_amount(), 100.0);
    }

    #[test]
    fn test_status_transitions() {
        assert!(OrderStatus::Paid.can_advance_to(OrderStatus::Completed));
        assert!(OrderStatus::Confirmed.can_advance_to(OrderStatus::Preparing));
        assert!(!OrderStatus::Completed.can_advance_to(OrderStatus::Preparing));
        assert!(!OrderStatus::Pending.can_advance_to(OrderStatus::Completed));
        assert!(!OrderStatus::Pending.can_advance_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Cancelled.is_terminal());
    }
}
