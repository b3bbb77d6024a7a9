//! Unified error system
//!
//! - [`ErrorCode`]: Standardized error codes for all error types
//! - [`ErrorCategory`]: Classification of errors by domain
//! - [`AppError`]: Rich error type with codes, messages, and details
//! - [`ErrorBody`]: JSON body of failed requests
//!
//! # Error Code Ranges
//!
//! - 0xxx: General errors
//! - 4xxx: Order errors
//! - 5xxx: Payment errors
//! - 6xxx: Catalog / inventory errors
//! - 7xxx: Promotion errors
//! - 8xxx: Marketplace platform errors
//! - 9xxx: System errors
//!
//! # Example
//!
//! ```
//! use shared::error::{AppError, ErrorCategory, ErrorCode};
//!
//! let err = AppError::with_message(ErrorCode::InsufficientStock, "Only 2 left")
//!     .with_detail("item_id", 42);
//!
//! let body = err.body();
//! assert_eq!(body.code, 6003);
//! assert_eq!(body.category, ErrorCategory::Inventory);
//! ```

mod category;
mod codes;
mod http;
mod types;

pub use category::ErrorCategory;
pub use codes::{ErrorCode, InvalidErrorCode};
pub use types::{AppError, AppResult, ErrorBody};
