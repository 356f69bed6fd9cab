//! Forwarding to the upstream sports-stats API.
//!
//! # Responsibilities
//! - Build the upstream URL from the fixed base and a validated endpoint
//! - Attach the bearer credential and a fixed User-Agent
//! - Normalize the reply: JSON passes through, anything else becomes a
//!   structured error with a short snippet
//!
//! # Design Decisions
//! - Single attempt, no retries
//! - Transport failures (connect, timeout, body read) map to 502
//! - Upstream status is passed through for both JSON and non-JSON bodies

use std::time::Instant;

use axum::http::{header, StatusCode};
use serde_json::{json, Value};

use crate::config::UpstreamConfig;
use crate::error::ProxyError;
use crate::http::response::ProxyResponse;
use crate::observability::metrics;

/// Longest upstream snippet echoed back on invalid JSON.
pub const SNIPPET_CHARS: usize = 200;

/// Sends validated requests upstream.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    base_url: String,
    user_agent: String,
    cache_control: String,
}

impl Forwarder {
    pub fn new(client: reqwest::Client, config: &UpstreamConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user_agent: config.user_agent.clone(),
            cache_control: config.cache_control.clone(),
        }
    }

    /// GET `{base_url}{endpoint}` and normalize the reply.
    pub async fn forward(&self, endpoint: &str, api_key: &str) -> Result<ProxyResponse, ProxyError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let start = Instant::now();

        let upstream = self
            .client
            .get(&url)
            .header(header::AUTHORIZATION, bearer(api_key))
            .header(header::ACCEPT, "application/json")
            .header(header::USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(ProxyError::Upstream)?;

        let status = upstream.status();
        let text = upstream.text().await.map_err(ProxyError::Upstream)?;
        metrics::record_upstream(status.as_u16(), start);

        tracing::debug!(
            endpoint = %endpoint,
            status = status.as_u16(),
            bytes = text.len(),
            "Upstream responded"
        );

        Ok(normalize(status, &text).header(header::CACHE_CONTROL, &self.cache_control))
    }
}

/// Accept keys given either bare or already as `Bearer <key>`, with any
/// run of whitespace after the scheme.
pub fn bearer(api_key: &str) -> String {
    let has_scheme = api_key
        .get(..6)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("bearer"))
        && api_key
            .as_bytes()
            .get(6)
            .is_some_and(|b| b.is_ascii_whitespace());
    if has_scheme {
        api_key.to_string()
    } else {
        format!("Bearer {}", api_key)
    }
}

/// Pass JSON through; replace anything else with a sanitized error body.
pub fn normalize(status: StatusCode, text: &str) -> ProxyResponse {
    match serde_json::from_str::<Value>(text) {
        Ok(value) if !value.is_null() => ProxyResponse::json(status, &value),
        _ => {
            tracing::warn!(status = status.as_u16(), "Upstream returned invalid JSON");
            ProxyResponse::json(
                status,
                &json!({
                    "error": "Upstream returned invalid JSON",
                    "upstreamStatus": status.as_u16(),
                    "upstreamSnippet": snippet(text),
                }),
            )
        }
    }
}

fn snippet(text: &str) -> String {
    text.chars().take(SNIPPET_CHARS).collect()
}
