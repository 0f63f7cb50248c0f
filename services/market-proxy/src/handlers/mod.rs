//! Route handlers
//!
//! Every proxied route goes through [`serve_cached`]: the normalized request
//! signature is looked up first, and only a miss reaches the upstream.

pub mod health;
pub mod market_data;
pub mod passthrough;
pub mod search;

pub use health::health_check;
pub use market_data::list_markets;
pub use passthrough::passthrough;
pub use search::search;

use axum::{
    Json,
    extract::{Query, rejection::QueryRejection},
    http::Uri,
};
use serde_json::Value;
use std::future::Future;
use tracing::debug;

use crate::{
    cache::request_signature,
    errors::{ProxyError, ProxyResult},
    server::AppState,
};

/// Query string as ordered key/value pairs
pub type QueryPairs = Vec<(String, String)>;

/// Serve from cache, or run `fetch` and cache its result.
///
/// Failures are never cached.
pub async fn serve_cached<F, Fut>(state: &AppState, uri: &Uri, fetch: F) -> ProxyResult<Json<Value>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ProxyResult<Value>>,
{
    let signature = request_signature(uri);

    if let Some(cached) = state.cache.get(&signature) {
        debug!("Serving cached response for {}", signature);
        return Ok(Json(cached));
    }

    debug!("Cache miss for {}", signature);
    let value = fetch().await?;
    state.cache.set(&signature, value.clone());
    Ok(Json(value))
}

/// Unwrap query pairs, turning a rejection into a JSON 400
pub fn query_pairs(query: Result<Query<QueryPairs>, QueryRejection>) -> ProxyResult<QueryPairs> {
    query
        .map(|Query(pairs)| pairs)
        .map_err(|rejection| ProxyError::MalformedRequest(rejection.body_text()))
}
