//! HTTP client for the upstream market data API

use governor::{
    Quota, RateLimiter as GovernorRateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{num::NonZeroU32, time::Duration};
use tracing::{debug, error, warn};

use crate::{
    config::UpstreamConfig,
    errors::{ProxyError, ProxyResult},
    models::MarketRow,
};

/// Query parameter carrying the API credential
pub const API_KEY_PARAM: &str = "x_cg_pro_api_key";

const GENERIC_UPSTREAM_MESSAGE: &str = "Failed to fetch data from the upstream API";

/// One upstream call: a path under the base URL and its query parameters
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpstreamRequestSpec {
    pub base_path: String,
    pub query_params: Vec<(String, String)>,
}

impl UpstreamRequestSpec {
    pub fn new(base_path: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            query_params: Vec::new(),
        }
    }

    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query_params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}

/// Client for the priced-data API. No retries happen at this layer.
pub struct UpstreamClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    throttle: Option<GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl std::fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("throttled", &self.throttle.is_some())
            .finish()
    }
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .user_agent(concat!("market-proxy/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let throttle = config
            .max_calls_per_minute
            .and_then(NonZeroU32::new)
            .map(|per_minute| GovernorRateLimiter::direct(Quota::per_minute(per_minute)));

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.effective_api_key().map(str::to_string),
            throttle,
        })
    }

    #[must_use]
    pub const fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Final URL for `spec`, credential excluded
    #[must_use]
    pub fn url_for(&self, spec: &UpstreamRequestSpec) -> String {
        format!(
            "{}/{}",
            self.base_url,
            spec.base_path.trim_start_matches('/')
        )
    }

    /// Issue a GET and return the JSON body
    pub async fn fetch(&self, spec: &UpstreamRequestSpec) -> ProxyResult<Value> {
        let url = self.url_for(spec);

        if let Some(throttle) = &self.throttle {
            throttle.until_ready().await;
        }

        debug!(url = %url, params = ?spec.query_params, "Fetching from upstream");

        let mut request = self.client.get(&url).query(&spec.query_params);
        if let Some(key) = &self.api_key {
            request = request.query(&[(API_KEY_PARAM, key)]);
        }

        let response = request
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                error!("Upstream transport failure for {}: {}", url, e);
                ProxyError::transport()
            })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| {
            error!("Failed to read upstream body from {}: {}", url, e);
            ProxyError::transport()
        })?;

        if !status.is_success() {
            let message = extract_error_message(&body)
                .unwrap_or_else(|| GENERIC_UPSTREAM_MESSAGE.to_string());
            warn!(
                "Upstream returned {} for {}: {}",
                status.as_u16(),
                url,
                message
            );
            return Err(ProxyError::upstream(status.as_u16(), message));
        }

        serde_json::from_slice(&body).map_err(|e| {
            warn!("Upstream returned non-JSON body for {}: {}", url, e);
            ProxyError::MalformedUpstreamResponse(format!("invalid JSON from upstream: {e}"))
        })
    }

    /// Fetch and validate against an expected schema
    pub async fn fetch_as<T: DeserializeOwned>(
        &self,
        spec: &UpstreamRequestSpec,
    ) -> ProxyResult<T> {
        let value = self.fetch(spec).await?;
        serde_json::from_value(value).map_err(|e| {
            warn!("Unexpected upstream payload for {}: {}", spec.base_path, e);
            ProxyError::MalformedUpstreamResponse(format!(
                "unexpected payload from {}: {e}",
                spec.base_path
            ))
        })
    }

    /// Fetch a `/coins/markets` listing priced in one currency
    pub async fn fetch_markets(&self, spec: &UpstreamRequestSpec) -> ProxyResult<Vec<MarketRow>> {
        self.fetch_as(spec).await
    }
}

/// Pull a human-readable message out of an upstream error body.
///
/// Understands `{"error": "..."}`, `{"error": {"message": "..."}}` and
/// `{"status": {"error_message": "..."}}`.
fn extract_error_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;

    let candidate = match value.get("error") {
        Some(Value::String(message)) => Some(message.clone()),
        Some(Value::Object(inner)) => inner
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    };

    candidate
        .or_else(|| {
            value
                .pointer("/status/error_message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .filter(|message| !message.trim().is_empty())
}
