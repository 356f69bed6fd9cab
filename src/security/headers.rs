//! Origin gate and static security headers.
//!
//! # Responsibilities
//! - Reflect `Origin` for allow-listed and preview-deployment origins
//! - Attach fixed hardening headers to every response
//!
//! # Design Decisions
//! - Origins are reflected, never wildcarded
//! - Preview pattern is case-insensitive; exact list is case-sensitive
//! - Disallowed origins get no CORS headers at all (the browser blocks)

use axum::http::{header, HeaderName};
use regex::{Regex, RegexBuilder};

use crate::config::CorsConfig;
use crate::http::response::ProxyResponse;

/// Decides CORS exposure for a request origin.
#[derive(Debug, Clone)]
pub struct OriginGate {
    allowed_origins: Vec<String>,
    preview_pattern: Option<Regex>,
    allowed_methods: String,
    allowed_headers: String,
    max_age: String,
}

impl OriginGate {
    pub fn from_config(config: &CorsConfig) -> Result<Self, regex::Error> {
        let preview_pattern = if config.preview_origin_pattern.is_empty() {
            None
        } else {
            Some(
                RegexBuilder::new(&config.preview_origin_pattern)
                    .case_insensitive(true)
                    .build()?,
            )
        };

        Ok(Self {
            allowed_origins: config.allowed_origins.clone(),
            preview_pattern,
            allowed_methods: config.allowed_methods.clone(),
            allowed_headers: config.allowed_headers.clone(),
            max_age: config.max_age_secs.to_string(),
        })
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|o| o == origin)
            || self
                .preview_pattern
                .as_ref()
                .is_some_and(|re| re.is_match(origin))
    }

    /// Add CORS headers when `origin` is allowed.
    pub fn apply_cors(&self, origin: Option<&str>, response: &mut ProxyResponse) {
        let Some(origin) = origin.filter(|o| self.is_allowed(o)) else {
            return;
        };

        response.set_header(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        response.set_header(header::VARY, "Origin");
        response.set_header(header::ACCESS_CONTROL_ALLOW_METHODS, &self.allowed_methods);
        response.set_header(header::ACCESS_CONTROL_ALLOW_HEADERS, &self.allowed_headers);
        response.set_header(header::ACCESS_CONTROL_MAX_AGE, &self.max_age);
    }
}

/// Hardening headers carried by every response.
pub const SECURITY_HEADERS: [(HeaderName, &str); 3] = [
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::REFERRER_POLICY, "strict-origin-when-cross-origin"),
    (header::X_FRAME_OPTIONS, "DENY"),
];

/// Attach the fixed hardening headers.
pub fn apply_security_headers(response: &mut ProxyResponse) {
    for (name, value) in SECURITY_HEADERS {
        response.set_header(name, value);
    }
}
