//! Asset search handler

use axum::{
    Json,
    extract::{OriginalUri, Query, State, rejection::QueryRejection},
};
use serde_json::Value;
use tracing::error;

use super::{QueryPairs, query_pairs, serve_cached};
use crate::{
    errors::{ProxyError, ProxyResult},
    server::AppState,
    upstream::UpstreamRequestSpec,
};

const SEARCH_PATH: &str = "search";

/// `GET /api/search?query=<text>`, forwarded verbatim
pub async fn search(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    query: Result<Query<QueryPairs>, QueryRejection>,
) -> ProxyResult<Json<Value>> {
    let params = query_pairs(query)?;
    let text = params
        .iter()
        .find(|(key, _)| key == "query")
        .map(|(_, value)| value.clone())
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| {
            ProxyError::MalformedRequest("the query parameter is required".to_string())
        })?;

    let result = serve_cached(&state, &uri, || async {
        let spec = UpstreamRequestSpec::new(SEARCH_PATH).param("query", text.as_str());
        state.upstream.fetch(&spec).await
    })
    .await;

    if let Err(e) = &result {
        error!("Search request failed for {}: {}", uri, e);
    }
    result
}
