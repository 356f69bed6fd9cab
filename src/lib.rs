//! Edge proxy for a sports-statistics front-end.
//!
//! Gates browser traffic (origin allow-list, User-Agent checks, signed
//! anti-bot tokens, adaptive rate limiting) in front of a third-party
//! stats API whose key must never reach the browser.

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod net;
pub mod upstream;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::ProxyConfig;
pub use config::Secrets;
pub use error::ProxyError;
pub use http::{HttpServer, ProxyService};
pub use lifecycle::Shutdown;
