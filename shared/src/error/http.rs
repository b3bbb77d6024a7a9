//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            // Success
            Self::Success => StatusCode::OK,

            // 404 Not Found
            Self::NotFound
            | Self::OrderNotFound
            | Self::DishNotFound
            | Self::OptionNotFound
            | Self::StoreNotFound
            | Self::InventoryNotFound
            | Self::PromotionNotFound
            | Self::BundleNotFound
            | Self::PointsRuleNotFound
            | Self::PlatformStoreNotFound => StatusCode::NOT_FOUND,

            // 409 Conflict
            Self::AlreadyExists
            | Self::OrderAlreadyPaid
            | Self::OrderAlreadyCompleted
            | Self::OrderAlreadyCancelled
            | Self::InvalidStatusTransition
            | Self::InsufficientStock
            | Self::ItemSoldOut
            | Self::DailyLimitReached
            | Self::PromotionAlreadyUsed => StatusCode::CONFLICT,

            // 401 Unauthorized
            Self::WebhookSignatureInvalid => StatusCode::UNAUTHORIZED,

            // 502 Bad Gateway (upstream marketplace failed)
            Self::PlatformApiError | Self::PlatformAuthFailed => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable (transient errors, client can retry)
            Self::NetworkError | Self::TimeoutError | Self::SystemBusy => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            // 500 Internal Server Error
            Self::Unknown | Self::InternalError | Self::DatabaseError | Self::ConfigError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }

            // 400 Bad Request (default for validation/business errors)
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Same request may succeed if sent again later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PlatformApiError | Self::NetworkError | Self::TimeoutError | Self::SystemBusy
        )
    }
}
