//! Promotion Ledger: points, coupons and vouchers

pub mod error;
pub mod ledger;
mod rewards;

pub use error::PromotionError;
pub use ledger::{CreditScope, PromotionLedger};
pub use rewards::points_for;
