//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("Invalid origin pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("HTTP client setup failed: {0}")]
    Client(#[from] reqwest::Error),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ProxyConfig, ConfigError> {
    let config: ProxyConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = parse_config(
            r#"
            [rate_limit]
            burst_capacity = 40

            [rate_limit.legacy]
            ip_only_per_min = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.rate_limit.burst_capacity, 40);
        assert_eq!(config.rate_limit.burst_refill_tokens, 25);
        assert_eq!(config.rate_limit.legacy.ip_only_per_min, 5);
        assert_eq!(config.rate_limit.legacy.token_per_min, 120);
        assert_eq!(config.upstream.allowed_endpoints.len(), 4);
    }

    #[test]
    fn test_validation_errors_surface() {
        let err = parse_config("[rate_limit]\nsustained_max = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref errors) if errors.len() == 1));
        assert!(err.to_string().contains("rate_limit.sustained_max"));
    }

    #[test]
    fn test_parse_error() {
        let err = parse_config("[rate_limit\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("does-not-exist.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
