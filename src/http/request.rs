//! Request value type consumed by the proxy pipeline.
//!
//! # Responsibilities
//! - Capture method, path, decoded query, headers and body of a request
//! - Resolve the client IP (forwarded header or peer address)
//! - Expose the request ID assigned by the tower-http layer
//!
//! # Design Decisions
//! - Only the first `X-Forwarded-For` hop is used, as the edge platform appends
//! - Duplicate query keys: first occurrence wins

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::body::Bytes;
use axum::http::{request::Parts, HeaderMap, HeaderName, HeaderValue, Method};

/// Header carrying the per-request correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";

const UNKNOWN_IP: &str = "unknown";

/// An inbound request as seen by the proxy pipeline.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
    pub client_ip: String,
    pub body: Bytes,
}

impl ProxyRequest {
    /// Build a request from a method and a path with optional query string.
    pub fn new(method: Method, path_and_query: &str) -> Self {
        let (path, query) = match path_and_query.split_once('?') {
            Some((p, q)) => (p, q),
            None => (path_and_query, ""),
        };

        Self {
            method,
            path: path.to_string(),
            query: parse_query(query),
            headers: HeaderMap::new(),
            client_ip: UNKNOWN_IP.to_string(),
            body: Bytes::new(),
        }
    }

    /// Build a request from axum request parts.
    pub fn from_parts(
        parts: &Parts,
        body: Bytes,
        peer: Option<SocketAddr>,
        trust_forwarded_for: bool,
    ) -> Self {
        Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            query: parse_query(parts.uri.query().unwrap_or_default()),
            headers: parts.headers.clone(),
            client_ip: resolve_client_ip(&parts.headers, peer, trust_forwarded_for),
            body,
        }
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(v) = HeaderValue::from_str(value) {
            self.headers.insert(HeaderName::from_static(name), v);
        }
        self
    }

    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = ip.into();
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Header value as text; non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn user_agent(&self) -> &str {
        self.header("user-agent").unwrap_or_default()
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn request_id(&self) -> &str {
        self.header(X_REQUEST_ID).unwrap_or("unknown")
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        params.entry(key.into_owned()).or_insert_with(|| value.into_owned());
    }
    params
}

/// Resolve the caller's IP.
///
/// With `trust_forwarded_for`, the first entry of `X-Forwarded-For` wins;
/// otherwise (or when the header is absent) the peer address is used.
pub fn resolve_client_ip(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_IP.to_string())
}
