//! Middleware for rate limiting, request logging and CORS

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::{
    config::CorsConfig,
    errors::ProxyError,
    rate_limiter::{RateDecision, RateLimiter},
};

pub const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
pub const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
pub const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// Key used when neither a peer address nor a trusted header is available
const UNKNOWN_CLIENT: &str = "unknown";

/// Rate limiting middleware state
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<RateLimiter>,
}

impl std::fmt::Debug for RateLimitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitState")
            .field("limiter", &"Arc<RateLimiter>")
            .finish()
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(rate_limit_state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let limiter = &rate_limit_state.limiter;
    if !limiter.is_enabled() {
        return next.run(request).await;
    }

    let client_key = client_key(&request, limiter.config().trust_forwarded_headers);

    match limiter.admit(&client_key) {
        RateDecision::Allowed {
            limit,
            remaining,
            reset_after_secs,
        } => {
            let mut response = next.run(request).await;
            insert_rate_headers(response.headers_mut(), limit, remaining, reset_after_secs);
            response
        }
        RateDecision::Rejected {
            limit,
            retry_after_secs,
        } => {
            let mut response = ProxyError::RateLimitExceeded {
                retry_after_secs,
                message: limiter.rejection_message(),
            }
            .into_response();
            insert_rate_headers(response.headers_mut(), limit, 0, retry_after_secs);
            response
        }
    }
}

fn insert_rate_headers(headers: &mut HeaderMap, limit: u32, remaining: u32, reset_secs: u64) {
    headers.insert(RATELIMIT_LIMIT, HeaderValue::from(limit));
    headers.insert(RATELIMIT_REMAINING, HeaderValue::from(remaining));
    headers.insert(RATELIMIT_RESET, HeaderValue::from(reset_secs));
}

/// Request deadline middleware.
///
/// A request still running after `limit` is abandoned and answered like an
/// upstream transport failure, with the usual JSON error body.
pub async fn timeout_middleware(
    State(limit): State<Duration>,
    request: Request,
    next: Next,
) -> Response {
    let uri = request.uri().clone();

    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            warn!("Request to {} exceeded the {:?} deadline", uri, limit);
            ProxyError::transport().into_response()
        }
    }
}

/// Request logging middleware
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = std::time::Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let client = client_key(&request, false);

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    info!(
        method = %method,
        uri = %uri,
        status = %status,
        duration_ms = duration.as_millis(),
        client = %client,
        "Request processed"
    );

    response
}

/// CORS layer factory
pub fn create_cors_layer(config: &CorsConfig) -> CorsLayer {
    let mut cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(config.max_age_seconds));

    if config.allowed_origins.iter().any(|origin| origin == "*") {
        cors = cors.allow_origin(Any);
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|origin| HeaderValue::from_str(origin).ok())
            .collect();
        cors = cors.allow_origin(origins);
    }

    cors
}

/// Identify the client for rate limiting.
///
/// Forwarded headers are only consulted when the deployment vouches for them;
/// otherwise any client could pick its own bucket.
pub fn client_key(request: &Request, trust_forwarded_headers: bool) -> String {
    if trust_forwarded_headers {
        if let Some(forwarded) = forwarded_client(request.headers()) {
            return forwarded;
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(
            || UNKNOWN_CLIENT.to_string(),
            |ConnectInfo(addr)| addr.ip().to_string(),
        )
}

fn forwarded_client(headers: &HeaderMap) -> Option<String> {
    let from_forwarded_for = headers
        .get("X-Forwarded-For")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    let from_real_ip = || {
        headers
            .get("X-Real-IP")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
    };

    from_forwarded_for.or_else(from_real_ip).map(str::to_string)
}
