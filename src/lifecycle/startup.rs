//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration (or fall back to defaults)
//! - Bind the listener
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners bind last (traffic only when ready)

use std::path::Path;

use tokio::net::TcpListener;

use crate::config::{load_config, ConfigError, ProxyConfig};

/// Load the config file when one is given, defaults otherwise.
///
/// `bind_override` replaces `listener.bind_address` (e.g. from `--bind`).
pub fn load_startup_config(
    path: Option<&Path>,
    bind_override: Option<&str>,
) -> Result<ProxyConfig, ConfigError> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(bind) = bind_override {
        config.listener.bind_address = bind.to_string();
    }
    Ok(config)
}

/// Bind the configured listener address.
pub async fn bind_listener(config: &ProxyConfig) -> std::io::Result<TcpListener> {
    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");
    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let config = load_startup_config(None, None).unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn test_bind_override() {
        let config = load_startup_config(None, Some("127.0.0.1:3000")).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:3000");
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let config = load_startup_config(None, Some("127.0.0.1:0")).unwrap();
        let listener = bind_listener(&config).await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }
}
