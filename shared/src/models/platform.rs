//! Marketplace Integration Models

use serde::{Deserialize, Serialize};

/// Supported delivery marketplaces
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum Platform {
    UberEats,
    Foodpanda,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UberEats => "uber_eats",
            Self::Foodpanda => "foodpanda",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uber_eats" | "ubereats" => Ok(Self::UberEats),
            "foodpanda" => Ok(Self::Foodpanda),
            other => Err(format!("Unsupported platform: {other}")),
        }
    }
}

/// Store ↔ marketplace link, carrying the persisted OAuth fields
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct PlatformStore {
    pub id: i64,
    pub store_id: i64,
    pub platform: Platform,
    /// Platform-assigned store identifier, stored at integration time
    pub platform_store_id: String,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<i64>,
    /// JSON array of platform store ids the token is authorised for
    pub authorized_store_ids: Option<String>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}
