//! Configuration for the market data proxy

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Placeholder values shipped in sample env files; treated as "no key"
pub const API_KEY_PLACEHOLDERS: &[&str] = &["SUA_API_KEY_AQUI", "YOUR_API_KEY_HERE"];

/// Market proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Upstream market data API
    pub upstream: UpstreamConfig,
    /// Response cache configuration
    pub cache: CacheConfig,
    /// Rate limiting configuration
    pub rate_limiting: RateLimitConfig,
    /// Multi-currency fan-out configuration
    pub fanout: FanoutConfig,
    /// CORS configuration
    pub cors: CorsConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Enable compression
    pub compression: bool,
}

/// Upstream API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL every upstream path is joined onto
    pub base_url: String,
    /// Optional API credential, appended as `x_cg_pro_api_key`
    pub api_key: Option<String>,
    /// Per-call timeout in seconds
    pub timeout_seconds: u64,
    /// Optional outbound throttle; upstream calls wait for a permit
    pub max_calls_per_minute: Option<u32>,
}

/// Response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL applied to entries stored without an explicit TTL
    pub default_ttl_seconds: u64,
    /// Interval of the background expiry sweep
    pub sweep_interval_seconds: u64,
    /// Optional entry bound; least recently used entries are evicted past it
    pub max_entries: Option<usize>,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,
    /// Fixed window length in seconds
    pub window_seconds: u64,
    /// Requests admitted per client key per window
    pub max_requests: u32,
    /// Key clients on `X-Forwarded-For` / `X-Real-IP` instead of the peer address.
    /// Only safe behind a proxy that overwrites those headers.
    pub trust_forwarded_headers: bool,
}

/// How per-currency listings are combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// The first currency's listing decides which assets appear
    #[default]
    FirstCurrency,
    /// Every asset seen in any currency's listing appears
    Union,
}

/// Fan-out configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    pub merge_strategy: MergeStrategy,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Enable CORS
    pub enabled: bool,
    /// Allowed origins, `*` for any
    pub allowed_origins: Vec<String>,
    /// Max age for preflight requests
    pub max_age_seconds: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3001,
                timeout_seconds: 30,
                compression: true,
            },
            upstream: UpstreamConfig {
                base_url: "https://api.coingecko.com/api/v3".to_string(),
                api_key: None,
                timeout_seconds: 10,
                max_calls_per_minute: None,
            },
            cache: CacheConfig {
                default_ttl_seconds: 600,    // 10 minutes
                sweep_interval_seconds: 120, // 2 minutes
                max_entries: None,
            },
            rate_limiting: RateLimitConfig {
                enabled: true,
                window_seconds: 15 * 60,
                max_requests: 100,
                trust_forwarded_headers: false,
            },
            fanout: FanoutConfig {
                merge_strategy: MergeStrategy::FirstCurrency,
            },
            cors: CorsConfig {
                enabled: true,
                allowed_origins: vec!["*".to_string()],
                max_age_seconds: 86400, // 24 hours
            },
        }
    }
}

impl ProxyConfig {
    /// Load configuration from an optional file plus the environment.
    ///
    /// Precedence, lowest first: defaults, file, `PROXY_*` variables
    /// (`PROXY_CACHE__DEFAULT_TTL_SECONDS`), then the flat legacy variables
    /// `PORT`, `COINGECKO_API_URL`, `COINGECKO_API_KEY` and `CACHE_TTL`.
    pub fn load(path: &str) -> Result<Self> {
        let defaults = config::Config::try_from(&Self::default())?;

        let settings = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("PROXY")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .set_override_option("server.port", legacy_env("PORT"))?
            .set_override_option("upstream.base_url", legacy_env("COINGECKO_API_URL"))?
            .set_override_option("upstream.api_key", legacy_env("COINGECKO_API_KEY"))?
            .set_override_option("cache.default_ttl_seconds", legacy_env("CACHE_TTL"))?
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Get server address
    #[must_use]
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl UpstreamConfig {
    /// The API key, unless it is absent, blank or a known placeholder
    #[must_use]
    pub fn effective_api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty() && !API_KEY_PLACEHOLDERS.contains(key))
    }
}

fn legacy_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}
