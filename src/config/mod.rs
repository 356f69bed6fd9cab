//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)                      environment
//!     → loader.rs (parse & deserialize)       → secrets.rs (NS_PROXY_SECRET,
//!     → validation.rs (semantic checks)          BALLDONTLIE_API_KEY)
//!     → ProxyConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads + validates
//!     → server swaps the runtime policy (arc-swap)
//! ```
//!
//! # Design Decisions
//! - All fields have defaults; running without a config file is supported
//! - Secrets never live in the TOML file
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod secrets;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    CorsConfig, LegacyLimitConfig, ListenerConfig, ProxyConfig, RateLimitConfig, TokenConfig,
    UpstreamConfig,
};
pub use secrets::Secrets;
