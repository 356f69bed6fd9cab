//! Operator secrets read from the environment.

use std::env;
use std::fmt;

/// Env var holding the token signing secret.
pub const SIGNING_SECRET_ENV: &str = "NS_PROXY_SECRET";

/// Env var holding the upstream API key.
pub const UPSTREAM_KEY_ENV: &str = "BALLDONTLIE_API_KEY";

/// Secrets captured once at startup. Never serialized or logged.
#[derive(Clone, Default)]
pub struct Secrets {
    pub signing_secret: Option<String>,
    pub upstream_api_key: Option<String>,
}

impl Secrets {
    pub fn new(signing_secret: impl Into<String>, upstream_api_key: impl Into<String>) -> Self {
        Self {
            signing_secret: non_empty(signing_secret.into()),
            upstream_api_key: non_empty(upstream_api_key.into()),
        }
    }

    pub fn from_env() -> Self {
        Self {
            signing_secret: env::var(SIGNING_SECRET_ENV).ok().and_then(non_empty),
            upstream_api_key: env::var(UPSTREAM_KEY_ENV).ok().and_then(non_empty),
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("signing_secret", &self.signing_secret.as_ref().map(|_| "<redacted>"))
            .field("upstream_api_key", &self.upstream_api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_values_are_absent() {
        let secrets = Secrets::new("   ", "key");
        assert!(secrets.signing_secret.is_none());
        assert_eq!(secrets.upstream_api_key.as_deref(), Some("key"));
    }

    #[test]
    fn test_debug_redacts() {
        let secrets = Secrets::new("super-secret-value", "api-key");
        let printed = format!("{:?}", secrets);
        assert!(!printed.contains("super-secret-value"));
        assert!(!printed.contains("api-key"));
    }
}
