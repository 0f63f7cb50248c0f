//! Error types for the market data proxy

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::models::ErrorBody;

/// Message used when a transport-level failure hides the real cause
pub const TRANSPORT_FAILURE: &str = "transport failure";

/// Proxy error types
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProxyError {
    /// Non-2xx answer or transport failure talking to the upstream API
    #[error("Upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    /// Upstream answered 2xx with a payload we could not interpret
    #[error("Malformed upstream response: {0}")]
    MalformedUpstreamResponse(String),

    /// Client request is missing or has an invalid parameter
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// No route matches the request
    #[error("Not found: {0}")]
    NotFound(String),

    /// Failure inside the proxy itself
    #[error("Internal error: {0}")]
    Internal(String),

    /// Client exceeded its request quota
    #[error("Rate limited: {message}")]
    RateLimitExceeded { retry_after_secs: u64, message: String },
}

impl ProxyError {
    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
        }
    }

    pub fn transport() -> Self {
        Self::upstream(500, TRANSPORT_FAILURE)
    }

    /// HTTP status reported to the client
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Self::MalformedUpstreamResponse(_) => StatusCode::BAD_GATEWAY,
            Self::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Client-facing message, without the variant prefix
    #[must_use]
    pub fn client_message(&self) -> &str {
        match self {
            Self::Upstream { message, .. }
            | Self::MalformedUpstreamResponse(message)
            | Self::MalformedRequest(message)
            | Self::NotFound(message)
            | Self::Internal(message)
            | Self::RateLimitExceeded { message, .. } => message,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorBody::new(self.client_message()));
        let mut response = (status, body).into_response();

        if let Self::RateLimitExceeded {
            retry_after_secs, ..
        } = self
        {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }

        response
    }
}

pub type ProxyResult<T> = Result<T, ProxyError>;
