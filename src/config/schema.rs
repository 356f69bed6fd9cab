//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.
//! Secrets are not part of the schema; see [`crate::config::secrets`].

use serde::{Deserialize, Serialize};

/// Root configuration for the stats proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, TLS, client IP trust).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Cross-origin allow-list.
    pub cors: CorsConfig,

    /// Anti-bot token settings.
    pub token: TokenConfig,

    /// Adaptive and legacy rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Upstream sports-stats API.
    pub upstream: UpstreamConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Request hardening.
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Take the client IP from the first `X-Forwarded-For` hop.
    /// Disable when the proxy is exposed directly to clients.
    pub trust_forwarded_for: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
            trust_forwarded_for: true,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Upstream fetch timeout in seconds.
    pub upstream_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            upstream_secs: 25,
        }
    }
}

/// CORS allow-list.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Origins reflected verbatim when matched exactly.
    pub allowed_origins: Vec<String>,

    /// Case-insensitive pattern for preview deployment origins.
    /// Empty disables pattern matching.
    pub preview_origin_pattern: String,

    /// Value of `Access-Control-Allow-Methods`.
    pub allowed_methods: String,

    /// Value of `Access-Control-Allow-Headers`.
    pub allowed_headers: String,

    /// Value of `Access-Control-Max-Age`.
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "https://josegarcia1003.github.io".to_string(),
                "https://nio-sports-pro.vercel.app".to_string(),
            ],
            preview_origin_pattern: r"^https://[a-z0-9-]+\.vercel\.app$".to_string(),
            allowed_methods: "GET,POST,OPTIONS".to_string(),
            allowed_headers: "Content-Type, X-NS-Token, X-UID".to_string(),
            max_age_secs: 600,
        }
    }
}

/// Signed token settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Token lifetime in seconds.
    pub ttl_secs: u64,

    /// Minimum accepted length of the signing secret.
    pub min_secret_len: usize,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 600,
            min_secret_len: 32,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Burst bucket capacity (tokens).
    pub burst_capacity: u32,

    /// Tokens added per refill step.
    pub burst_refill_tokens: u32,

    /// Length of one refill step in milliseconds.
    pub burst_refill_interval_ms: u64,

    /// Sustained sliding window length in seconds.
    pub sustained_window_secs: u64,

    /// Maximum weighted requests per sustained window.
    pub sustained_max: usize,

    /// Cooldown applied after an adaptive rejection, in seconds.
    pub ban_secs: u64,

    /// Upper bound of a single request's weight.
    pub max_weight: u32,

    /// Upper bound of the bot-risk contribution to a request's weight.
    pub max_risk_weight: u32,

    /// Interval of the idle-state sweep in seconds. 0 disables it. Read
    /// once at startup.
    pub sweep_interval_secs: u64,

    /// Legacy per-minute ceilings.
    pub legacy: LegacyLimitConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            burst_capacity: 25,
            burst_refill_tokens: 25,
            burst_refill_interval_ms: 10_000,
            sustained_window_secs: 600,
            sustained_max: 180,
            ban_secs: 30,
            max_weight: 5,
            max_risk_weight: 3,
            sweep_interval_secs: 60,
            legacy: LegacyLimitConfig::default(),
        }
    }
}

/// Legacy fixed ceilings, applied after the adaptive checks.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LegacyLimitConfig {
    /// Trailing window length in seconds.
    pub window_secs: u64,

    /// Requests per window for an IP without a valid token.
    pub ip_only_per_min: usize,

    /// Requests per window for an IP presenting a valid token.
    pub ip_per_min: usize,

    /// Requests per window for a single token.
    pub token_per_min: usize,
}

impl Default for LegacyLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            ip_only_per_min: 10,
            ip_per_min: 60,
            token_per_min: 120,
        }
    }
}

/// Upstream API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL the endpoint is appended to.
    pub base_url: String,

    /// Endpoint prefixes that may be forwarded.
    pub allowed_endpoints: Vec<String>,

    /// Endpoint prefixes that cost double.
    pub heavy_endpoints: Vec<String>,

    /// User-Agent sent upstream.
    pub user_agent: String,

    /// Cache directive attached to upstream-derived responses.
    pub cache_control: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.balldontlie.io/v1".to_string(),
            allowed_endpoints: vec![
                "/players".to_string(),
                "/season_averages".to_string(),
                "/stats".to_string(),
                "/games".to_string(),
            ],
            heavy_endpoints: vec!["/stats".to_string()],
            user_agent: "NioSports-Pro-Proxy/1.0".to_string(),
            cache_control: "s-maxage=120, stale-while-revalidate=600".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error), overridden by `RUST_LOG`.
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes (CSP reports are the only bodies read).
    pub max_body_size: usize,

    /// User-Agent values shorter than this are rejected as bots.
    pub min_user_agent_len: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 64 * 1024,
            min_user_agent_len: 8,
        }
    }
}
