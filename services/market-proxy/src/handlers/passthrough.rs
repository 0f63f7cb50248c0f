//! Generic passthrough for upstream endpoints without a dedicated route

use axum::{
    Json,
    extract::{OriginalUri, Path, Query, State, rejection::QueryRejection},
};
use serde_json::Value;
use tracing::error;

use super::{QueryPairs, query_pairs, serve_cached};
use crate::{
    errors::{ProxyError, ProxyResult},
    server::AppState,
    upstream::UpstreamRequestSpec,
};

const API_PREFIX: &str = "/api/";

/// `GET /api/*path`, forwarded to the same path upstream
pub async fn passthrough(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Path(path): Path<String>,
    query: Result<Query<QueryPairs>, QueryRejection>,
) -> ProxyResult<Json<Value>> {
    let params = query_pairs(query)?;
    validate_path(&path)?;
    let upstream_path = encoded_upstream_path(uri.path())?;

    let result = serve_cached(&state, &uri, || async {
        let spec = UpstreamRequestSpec::new(upstream_path).params(params.iter().cloned());
        state.upstream.fetch(&spec).await
    })
    .await;

    if let Err(e) = &result {
        error!("Passthrough to /{} failed: {}", path, e);
    }
    result
}

/// The request path below `/api/`, still percent-encoded.
///
/// `Path` hands handlers the decoded text; splicing that into the upstream URL
/// would turn an encoded `?`, `/` or `#` into URL syntax.
fn encoded_upstream_path(raw: &str) -> ProxyResult<&str> {
    raw.strip_prefix(API_PREFIX)
        .ok_or_else(|| ProxyError::NotFound(format!("No route for {raw}")))
}

/// Reject dot segments so a request cannot climb out of the upstream base path
fn validate_path(path: &str) -> ProxyResult<()> {
    if path.split('/').any(|segment| segment == ".." || segment == ".") {
        return Err(ProxyError::MalformedRequest(format!(
            "invalid upstream path: {path}"
        )));
    }
    Ok(())
}
