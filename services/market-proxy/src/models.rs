//! Wire models for proxy responses and validated upstream payloads

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

use crate::cache::CacheStats;

/// Error body returned for every failed request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Always `true`
    pub error: bool,
    /// Human-readable error message
    pub message: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: true,
            message: message.into(),
        }
    }
}

/// One row of an upstream `/coins/markets` listing.
///
/// Only the fields the merger relies on are typed; everything else is kept
/// verbatim in `extra` and passed through to the client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MarketRow {
    pub id: String,
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub current_price: Option<Number>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An asset priced in every requested currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub image: Option<String>,
    /// Currency code to price; `null` when that currency's listing lacked the asset
    pub current_price: BTreeMap<String, Option<Number>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AssetRecord {
    /// Seed a record from the first listing that mentions the asset
    pub fn seed(row: MarketRow, currency: &str) -> Self {
        let mut current_price = BTreeMap::new();
        current_price.insert(currency.to_string(), row.current_price);

        Self {
            id: row.id,
            name: row.name,
            symbol: row.symbol,
            image: row.image,
            current_price,
            extra: row.extra,
        }
    }
}

/// Liveness payload for `/health`
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `online` while the process serves requests
    pub status: String,
    /// ISO 8601 timestamp
    pub timestamp: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub cache: CacheStats,
}

impl HealthResponse {
    pub fn online(now: DateTime<Utc>, uptime_seconds: u64, cache: CacheStats) -> Self {
        Self {
            status: "online".to_string(),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds,
            cache,
        }
    }
}
