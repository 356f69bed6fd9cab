//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (capacities, intervals, windows > 0)
//! - Check URLs and origin patterns parse
//! - Keep the upstream timeout inside the request timeout
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use regex::RegexBuilder;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("invalid bind address `{0}`")]
    BindAddress(String),

    #[error("invalid upstream base URL `{0}`")]
    UpstreamUrl(String),

    #[error("endpoint prefix `{0}` must start with `/`")]
    EndpointPrefix(String),

    #[error("allowed origin `{0}` is not a scheme://host origin")]
    Origin(String),

    #[error("invalid preview origin pattern: {0}")]
    PreviewPattern(String),

    #[error("max_risk_weight ({risk}) must not exceed max_weight ({max})")]
    RiskWeight { risk: u32, max: u32 },

    #[error("timeouts.upstream_secs ({upstream}) must be below timeouts.request_secs ({request})")]
    UpstreamTimeout { upstream: u64, request: u64 },
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    let rl = &config.rate_limit;
    let positive: [(&'static str, u64); 10] = [
        ("rate_limit.burst_capacity", rl.burst_capacity as u64),
        ("rate_limit.burst_refill_tokens", rl.burst_refill_tokens as u64),
        ("rate_limit.burst_refill_interval_ms", rl.burst_refill_interval_ms),
        ("rate_limit.sustained_window_secs", rl.sustained_window_secs),
        ("rate_limit.sustained_max", rl.sustained_max as u64),
        ("rate_limit.max_weight", rl.max_weight as u64),
        ("rate_limit.legacy.window_secs", rl.legacy.window_secs),
        ("token.ttl_secs", config.token.ttl_secs),
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("timeouts.upstream_secs", config.timeouts.upstream_secs),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::NotPositive { field });
        }
    }

    // A stalled upstream must surface as the pipeline's 502, not a bare 408.
    let timeouts = &config.timeouts;
    if timeouts.upstream_secs > 0 && timeouts.upstream_secs >= timeouts.request_secs {
        errors.push(ValidationError::UpstreamTimeout {
            upstream: timeouts.upstream_secs,
            request: timeouts.request_secs,
        });
    }

    if rl.max_risk_weight > rl.max_weight {
        errors.push(ValidationError::RiskWeight {
            risk: rl.max_risk_weight,
            max: rl.max_weight,
        });
    }

    match url::Url::parse(&config.upstream.base_url) {
        Ok(u) if matches!(u.scheme(), "http" | "https") && u.host().is_some() => {}
        _ => errors.push(ValidationError::UpstreamUrl(config.upstream.base_url.clone())),
    }

    for prefix in config
        .upstream
        .allowed_endpoints
        .iter()
        .chain(config.upstream.heavy_endpoints.iter())
    {
        if !prefix.starts_with('/') {
            errors.push(ValidationError::EndpointPrefix(prefix.clone()));
        }
    }

    for origin in &config.cors.allowed_origins {
        if !is_bare_origin(origin) {
            errors.push(ValidationError::Origin(origin.clone()));
        }
    }

    if !config.cors.preview_origin_pattern.is_empty() {
        if let Err(e) = RegexBuilder::new(&config.cors.preview_origin_pattern)
            .case_insensitive(true)
            .build()
        {
            errors.push(ValidationError::PreviewPattern(e.to_string()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Browsers send `Origin` as `scheme://host[:port]` with no path or trailing slash.
fn is_bare_origin(origin: &str) -> bool {
    match url::Url::parse(origin) {
        Ok(u) => u.host().is_some() && u.origin().ascii_serialization() == origin,
        Err(_) => false,
    }
}
