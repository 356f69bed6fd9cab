//! Response value type produced by the proxy pipeline.
//!
//! # Responsibilities
//! - Hold status, headers and a fully buffered body
//! - Offer a small builder API for the pipeline stages
//! - Convert into an axum response at the edge
//!
//! # Design Decisions
//! - Framework independent: pipeline code never touches axum's `Response`
//! - Bodies are always buffered; upstream payloads are small JSON documents

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::Value;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// A buffered HTTP response.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxyResponse {
    /// A response with the given status and no body.
    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// A JSON response.
    pub fn json(status: StatusCode, value: &Value) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_default();
        let mut response = Self::empty(status);
        response.body = Bytes::from(body);
        response
            .headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        response
    }

    /// Set a header, replacing any previous value.
    ///
    /// Values that are not valid header text are dropped with a warning.
    pub fn header(mut self, name: HeaderName, value: impl AsRef<str>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn set_header(&mut self, name: HeaderName, value: impl AsRef<str>) {
        match HeaderValue::from_str(value.as_ref()) {
            Ok(v) => {
                self.headers.insert(name, v);
            }
            Err(_) => {
                tracing::warn!(header = %name, "Dropping invalid response header value");
            }
        }
    }

    /// Look up a header as text.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Parse the body as JSON, if it is JSON.
    pub fn json_body(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
