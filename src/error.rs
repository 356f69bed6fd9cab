//! Request-level error taxonomy.
//!
//! Every variant maps onto exactly one HTTP status and a small JSON body.
//! Token problems are deliberately absent: a bad token downgrades the caller
//! to the unauthenticated tier instead of failing the request.

use axum::http::{header, StatusCode};
use serde_json::json;

use crate::http::response::ProxyResponse;

/// Errors produced while handling a single proxied request.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    // Config errors (500)
    #[error("Server not configured: NS_PROXY_SECRET missing/weak")]
    MissingSecret,

    #[error("Server not configured: BALLDONTLIE_API_KEY missing")]
    MissingUpstreamKey,

    // Client errors (4xx)
    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Forbidden")]
    Forbidden,

    #[error("Missing endpoint parameter")]
    MissingEndpoint,

    #[error("Endpoint not allowed")]
    EndpointNotAllowed,

    #[error("Invalid endpoint")]
    InvalidEndpoint,

    // Admission errors (429)
    #[error("Too many requests. Cooldown active.")]
    Banned { retry_after_secs: u64 },

    #[error("Rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },

    #[error("Rate limit (no token). Call /api/proxy?init=1 and send X-NS-Token.")]
    LegacyIpOnly { retry_after_secs: u64 },

    #[error("Rate limit (ip).")]
    LegacyIp { retry_after_secs: u64 },

    #[error("Rate limit (token).")]
    LegacyToken { retry_after_secs: u64 },

    // Upstream errors (502)
    #[error("Upstream API error")]
    Upstream(#[source] reqwest::Error),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MissingSecret | ProxyError::MissingUpstreamKey => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ProxyError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::Forbidden
            | ProxyError::EndpointNotAllowed
            | ProxyError::InvalidEndpoint => StatusCode::FORBIDDEN,
            ProxyError::MissingEndpoint => StatusCode::BAD_REQUEST,
            ProxyError::Banned { .. }
            | ProxyError::RateLimited { .. }
            | ProxyError::LegacyIpOnly { .. }
            | ProxyError::LegacyIp { .. }
            | ProxyError::LegacyToken { .. } => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Seconds the client should wait before retrying, for admission errors.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            ProxyError::Banned { retry_after_secs }
            | ProxyError::RateLimited { retry_after_secs }
            | ProxyError::LegacyIpOnly { retry_after_secs }
            | ProxyError::LegacyIp { retry_after_secs }
            | ProxyError::LegacyToken { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// Render the error as a JSON response. Upstream error details stay in the logs.
    pub fn into_proxy_response(self) -> ProxyResponse {
        let body = match &self {
            ProxyError::MissingUpstreamKey => json!({
                "error": self.to_string(),
                "hint": "Set BALLDONTLIE_API_KEY in the proxy environment.",
            }),
            _ => json!({ "error": self.to_string() }),
        };

        let mut response = ProxyResponse::json(self.status(), &body);
        if let Some(secs) = self.retry_after() {
            response = response.header(header::RETRY_AFTER, secs.to_string());
        }
        response
    }
}

impl axum::response::IntoResponse for ProxyError {
    fn into_response(self) -> axum::response::Response {
        self.into_proxy_response().into_response()
    }
}
