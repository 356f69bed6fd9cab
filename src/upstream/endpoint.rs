//! Endpoint allow-list and cost classification.

use crate::config::UpstreamConfig;
use crate::error::ProxyError;

/// Which upstream paths may be requested, and what they cost.
#[derive(Debug, Clone)]
pub struct EndpointPolicy {
    allowed: Vec<String>,
    heavy: Vec<String>,
}

impl EndpointPolicy {
    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self {
            allowed: config.allowed_endpoints.clone(),
            heavy: config.heavy_endpoints.clone(),
        }
    }

    /// 2 for heavy endpoint families, 1 otherwise (including no endpoint).
    pub fn route_weight(&self, endpoint: Option<&str>) -> u32 {
        match endpoint {
            Some(e) if self.heavy.iter().any(|p| e.starts_with(p.as_str())) => 2,
            _ => 1,
        }
    }

    /// Validate the requested endpoint against the allow-list and the
    /// absolute-URL guard.
    pub fn validate<'a>(&self, endpoint: Option<&'a str>) -> Result<&'a str, ProxyError> {
        let endpoint = endpoint
            .filter(|e| !e.is_empty())
            .ok_or(ProxyError::MissingEndpoint)?;

        if !self.allowed.iter().any(|p| endpoint.starts_with(p.as_str())) {
            return Err(ProxyError::EndpointNotAllowed);
        }
        if endpoint.contains("http://") || endpoint.contains("https://") {
            return Err(ProxyError::InvalidEndpoint);
        }
        Ok(endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> EndpointPolicy {
        EndpointPolicy::from_config(&UpstreamConfig::default())
    }

    #[test]
    fn test_allowed_prefixes() {
        let p = policy();
        assert_eq!(p.validate(Some("/players")).unwrap(), "/players");
        assert_eq!(
            p.validate(Some("/games?seasons[]=2024")).unwrap(),
            "/games?seasons[]=2024"
        );
        assert!(matches!(
            p.validate(Some("/anything-else")),
            Err(ProxyError::EndpointNotAllowed)
        ));
        assert!(matches!(
            p.validate(Some("players")),
            Err(ProxyError::EndpointNotAllowed)
        ));
    }

    #[test]
    fn test_missing_endpoint() {
        assert!(matches!(policy().validate(None), Err(ProxyError::MissingEndpoint)));
        assert!(matches!(policy().validate(Some("")), Err(ProxyError::MissingEndpoint)));
    }

    #[test]
    fn test_absolute_url_rejected_despite_prefix() {
        let p = policy();
        assert!(matches!(
            p.validate(Some("/players?x=http://evil.com")),
            Err(ProxyError::InvalidEndpoint)
        ));
        assert!(matches!(
            p.validate(Some("/stats/https://evil.com")),
            Err(ProxyError::InvalidEndpoint)
        ));
    }

    #[test]
    fn test_route_weight() {
        let p = policy();
        assert_eq!(p.route_weight(Some("/stats?player_ids[]=1")), 2);
        assert_eq!(p.route_weight(Some("/players")), 1);
        assert_eq!(p.route_weight(None), 1);
    }
}
