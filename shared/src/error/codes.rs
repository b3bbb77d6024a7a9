//! Unified error codes for the ordering platform
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 4xxx: Order errors
//! - 5xxx: Payment errors
//! - 6xxx: Catalog / inventory errors
//! - 7xxx: Promotion errors
//! - 8xxx: Marketplace platform errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,
    /// Required field missing
    RequiredField = 7,
    /// Value out of range
    ValueOutOfRange = 8,

    // ==================== 4xxx: Order ====================
    /// Order not found
    OrderNotFound = 4001,
    /// Order has already been paid
    OrderAlreadyPaid = 4002,
    /// Order has already been completed
    OrderAlreadyCompleted = 4003,
    /// Order has already been cancelled
    OrderAlreadyCancelled = 4004,
    /// Order is empty
    OrderEmpty = 4007,
    /// Status transition not allowed from the current state
    InvalidStatusTransition = 4008,
    /// Invalid quantity on a line item
    InvalidQuantity = 4009,
    /// Invalid monetary amount
    InvalidAmount = 4010,

    // ==================== 5xxx: Payment ====================
    /// Payment processing failed
    PaymentFailed = 5001,
    /// Invalid payment method
    PaymentInvalidMethod = 5003,

    // ==================== 6xxx: Catalog / Inventory ====================
    /// Dish template not found
    DishNotFound = 6001,
    /// Dish template is not available
    DishUnavailable = 6002,
    /// Insufficient stock
    InsufficientStock = 6003,
    /// Dish option not found
    OptionNotFound = 6101,
    /// Store not found
    StoreNotFound = 6201,
    /// Inventory record not found
    InventoryNotFound = 6301,
    /// Item is marked sold out
    ItemSoldOut = 6302,
    /// Daily limit reached
    DailyLimitReached = 6303,
    /// Allocation would exceed warehouse stock
    WarehouseStockExceeded = 6304,

    // ==================== 7xxx: Promotion ====================
    /// Promotion credit not found
    PromotionNotFound = 7001,
    /// Promotion credit has expired
    PromotionExpired = 7002,
    /// Promotion credit does not match the order
    PromotionMismatch = 7003,
    /// Promotion credit has already been used
    PromotionAlreadyUsed = 7004,
    /// Bundle not found
    BundleNotFound = 7101,
    /// Bundle purchase not allowed
    BundleIneligible = 7102,
    /// Points rule not found
    PointsRuleNotFound = 7201,

    // ==================== 8xxx: Platform ====================
    /// Platform not supported
    PlatformNotSupported = 8001,
    /// No store linked for the platform store id
    PlatformStoreNotFound = 8002,
    /// Webhook signature invalid
    WebhookSignatureInvalid = 8003,
    /// Webhook payload could not be read
    WebhookPayloadInvalid = 8004,
    /// Marketplace API call failed
    PlatformApiError = 8101,
    /// Marketplace authorization failed
    PlatformAuthFailed = 8102,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Network error
    NetworkError = 9003,
    /// Operation timed out
    TimeoutError = 9004,
    /// Configuration error
    ConfigError = 9005,
    /// System busy
    SystemBusy = 9404,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the default message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::AlreadyExists => "Resource already exists",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::RequiredField => "Required field is missing",
            ErrorCode::ValueOutOfRange => "Value is out of range",

            // Order
            ErrorCode::OrderNotFound => "Order not found",
            ErrorCode::OrderAlreadyPaid => "Order has already been paid",
            ErrorCode::OrderAlreadyCompleted => "Order has already been completed",
            ErrorCode::OrderAlreadyCancelled => "Order has already been cancelled",
            ErrorCode::OrderEmpty => "Order is empty",
            ErrorCode::InvalidStatusTransition => "Order status change is not allowed",
            ErrorCode::InvalidQuantity => "Invalid quantity",
            ErrorCode::InvalidAmount => "Invalid amount",

            // Payment
            ErrorCode::PaymentFailed => "Payment processing failed",
            ErrorCode::PaymentInvalidMethod => "Invalid payment method",

            // Catalog / Inventory
            ErrorCode::DishNotFound => "Dish not found",
            ErrorCode::DishUnavailable => "Dish is not available",
            ErrorCode::InsufficientStock => "Insufficient stock",
            ErrorCode::OptionNotFound => "Dish option not found",
            ErrorCode::StoreNotFound => "Store not found",
            ErrorCode::InventoryNotFound => "Inventory record not found",
            ErrorCode::ItemSoldOut => "Item is sold out",
            ErrorCode::DailyLimitReached => "Daily limit reached",
            ErrorCode::WarehouseStockExceeded => "Allocation exceeds warehouse stock",

            // Promotion
            ErrorCode::PromotionNotFound => "Promotion not found",
            ErrorCode::PromotionExpired => "Promotion has expired",
            ErrorCode::PromotionMismatch => "Promotion does not apply to this order",
            ErrorCode::PromotionAlreadyUsed => "Promotion has already been used",
            ErrorCode::BundleNotFound => "Bundle not found",
            ErrorCode::BundleIneligible => "Bundle cannot be purchased",
            ErrorCode::PointsRuleNotFound => "Points rule not found",

            // Platform
            ErrorCode::PlatformNotSupported => "Platform not supported",
            ErrorCode::PlatformStoreNotFound => "No store linked to this platform store",
            ErrorCode::WebhookSignatureInvalid => "Webhook signature is invalid",
            ErrorCode::WebhookPayloadInvalid => "Webhook payload is invalid",
            ErrorCode::PlatformApiError => "Marketplace is unavailable, please retry later",
            ErrorCode::PlatformAuthFailed => "Marketplace authorization failed",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::NetworkError => "Network error",
            ErrorCode::TimeoutError => "Operation timed out",
            ErrorCode::ConfigError => "Configuration error",
            ErrorCode::SystemBusy => "System busy, please retry later",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error returned when a u16 does not map to any [`ErrorCode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            4 => Ok(ErrorCode::AlreadyExists),
            5 => Ok(ErrorCode::InvalidRequest),
            7 => Ok(ErrorCode::RequiredField),
            8 => Ok(ErrorCode::ValueOutOfRange),

            // Order
            4001 => Ok(ErrorCode::OrderNotFound),
            4002 => Ok(ErrorCode::OrderAlreadyPaid),
            4003 => Ok(ErrorCode::OrderAlreadyCompleted),
            4004 => Ok(ErrorCode::OrderAlreadyCancelled),
            4007 => Ok(ErrorCode::OrderEmpty),
            4008 => Ok(ErrorCode::InvalidStatusTransition),
            4009 => Ok(ErrorCode::InvalidQuantity),
            4010 => Ok(ErrorCode::InvalidAmount),

            // Payment
            5001 => Ok(ErrorCode::PaymentFailed),
            5003 => Ok(ErrorCode::PaymentInvalidMethod),

            // Catalog / Inventory
            6001 => Ok(ErrorCode::DishNotFound),
            6002 => Ok(ErrorCode::DishUnavailable),
            6003 => Ok(ErrorCode::InsufficientStock),
            6101 => Ok(ErrorCode::OptionNotFound),
            6201 => Ok(ErrorCode::StoreNotFound),
            6301 => Ok(ErrorCode::InventoryNotFound),
            6302 => Ok(ErrorCode::ItemSoldOut),
            6303 => Ok(ErrorCode::DailyLimitReached),
            6304 => Ok(ErrorCode::WarehouseStockExceeded),

            // Promotion
            7001 => Ok(ErrorCode::PromotionNotFound),
            7002 => Ok(ErrorCode::PromotionExpired),
            7003 => Ok(ErrorCode::PromotionMismatch),
            7004 => Ok(ErrorCode::PromotionAlreadyUsed),
            7101 => Ok(ErrorCode::BundleNotFound),
            7102 => Ok(ErrorCode::BundleIneligible),
            7201 => Ok(ErrorCode::PointsRuleNotFound),

            // Platform
            8001 => Ok(ErrorCode::PlatformNotSupported),
            8002 => Ok(ErrorCode::PlatformStoreNotFound),
            8003 => Ok(ErrorCode::WebhookSignatureInvalid),
            8004 => Ok(ErrorCode::WebhookPayloadInvalid),
            8101 => Ok(ErrorCode::PlatformApiError),
            8102 => Ok(ErrorCode::PlatformAuthFailed),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),
            9003 => Ok(ErrorCode::NetworkError),
            9004 => Ok(ErrorCode::TimeoutError),
            9005 => Ok(ErrorCode::ConfigError),
            9404 => Ok(ErrorCode::SystemBusy),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
