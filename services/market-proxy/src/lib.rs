//! Market data caching proxy
//!
//! Sits between client applications and a third-party crypto market data API.
//! Features:
//! - Response cache keyed by normalized request signature, with TTL expiry
//! - Fixed-window rate limiting per client
//! - Multi-currency fan-out for market listings, merged into one result
//! - Generic passthrough for every other upstream endpoint

#![allow(missing_docs)]

use anyhow::Result;

pub mod cache;
pub mod clock;
pub mod config;
pub mod errors;
pub mod fanout;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod rate_limiter;
pub mod server;
pub mod upstream;

pub use cache::ResponseCache;
pub use config::{
    CacheConfig, CorsConfig, FanoutConfig, MergeStrategy, ProxyConfig, RateLimitConfig,
    ServerConfig, UpstreamConfig,
};
pub use errors::{ProxyError, ProxyResult};
pub use fanout::CurrencyFanoutMerger;
pub use rate_limiter::RateLimiter;
pub use server::ProxyServer;
pub use upstream::{UpstreamClient, UpstreamRequestSpec};

/// Start the proxy server
pub async fn start_server(config: ProxyConfig) -> Result<()> {
    let server = ProxyServer::new(config)?;
    server.start().await
}
