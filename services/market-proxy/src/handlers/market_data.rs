//! Market listing handler

use axum::{
    Json,
    extract::{OriginalUri, Query, State, rejection::QueryRejection},
};
use serde_json::Value;
use tracing::error;

use super::{QueryPairs, query_pairs, serve_cached};
use crate::{
    errors::{ProxyError, ProxyResult},
    fanout::{CURRENCY_LIST_PARAM, CURRENCY_PARAM, MARKETS_PATH, parse_currency_list},
    server::AppState,
    upstream::UpstreamRequestSpec,
};

/// `GET /api/coins/markets`
///
/// With `vs_currencies` the listing is fanned out per currency and merged;
/// otherwise the query is forwarded as-is.
pub async fn list_markets(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    query: Result<Query<QueryPairs>, QueryRejection>,
) -> ProxyResult<Json<Value>> {
    let params = query_pairs(query)?;

    let result = serve_cached(&state, &uri, || async {
        match currency_list(&params) {
            Some(raw) => {
                let currencies = parse_currency_list(raw)?;
                let forwarded: QueryPairs = params
                    .iter()
                    .filter(|(key, _)| key != CURRENCY_LIST_PARAM && key != CURRENCY_PARAM)
                    .cloned()
                    .collect();

                let records = state.fanout.fetch_merged(&currencies, &forwarded).await?;
                serde_json::to_value(records).map_err(|e| {
                    ProxyError::Internal(format!("failed to encode merged listing: {e}"))
                })
            }
            None => {
                let spec = UpstreamRequestSpec::new(MARKETS_PATH).params(params.iter().cloned());
                state.upstream.fetch(&spec).await
            }
        }
    })
    .await;

    if let Err(e) = &result {
        error!("Failed to fetch market listing for {}: {}", uri, e);
    }
    result
}

fn currency_list(params: &[(String, String)]) -> Option<&str> {
    params
        .iter()
        .find(|(key, _)| key == CURRENCY_LIST_PARAM)
        .map(|(_, value)| value.as_str())
}
