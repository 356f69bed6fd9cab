//! Per-request pipeline: gate → token → admission → forward.
//!
//! # Data Flow
//! ```text
//! ProxyRequest
//!     → OPTIONS?                       204
//!     → /api/csp-report*?              POST: csp.rs, 204; else 405
//!     → not GET?                       405
//!     → implausible User-Agent?        403
//!     → token service configured?      else 500
//!     → ?init=1                        issue token
//!     → verify X-NS-Token              invalid ⇒ unauthenticated tier
//!     → adaptive limiter (ban, burst, sustained)   429 Retry-After: ban
//!     → legacy per-minute counters                 429 Retry-After: window
//!     → endpoint policy                400 / 403
//!     → upstream key configured?       else 500
//!     → forwarder                      upstream status / 502
//!     → security headers + CORS on every response
//! ```
//!
//! # Design Decisions
//! - Limiter state outlives config reloads; only the policy is swapped
//! - Endpoint validation happens after admission, so invalid endpoints
//!   still cost rate-limit budget

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::http::{header, Method, StatusCode};
use serde_json::json;

use crate::config::{ConfigError, ProxyConfig, Secrets};
use crate::error::ProxyError;
use crate::http::csp;
use crate::http::request::ProxyRequest;
use crate::http::response::ProxyResponse;
use crate::observability::metrics;
use crate::security::bot::{bot_risk_score, user_agent_plausible};
use crate::security::headers::{apply_security_headers, OriginGate};
use crate::security::identity::ClientKey;
use crate::security::rate_limit::{AdaptiveLimiter, Admission, LegacyVerdict, LimiterPolicy};
use crate::security::token::{unix_millis, TokenService};
use crate::upstream::{EndpointPolicy, Forwarder};

/// Path prefix of the CSP report receiver.
pub const CSP_REPORT_PATH: &str = "/api/csp-report";

/// Token header sent by the front-end.
pub const TOKEN_HEADER: &str = "x-ns-token";

/// Optional opaque user id header.
pub const UID_HEADER: &str = "x-uid";

/// Reloadable policy derived from a `ProxyConfig` plus the startup secrets.
pub struct Settings {
    pub gate: OriginGate,
    pub tokens: Option<TokenService>,
    pub limits: LimiterPolicy,
    pub endpoints: EndpointPolicy,
    pub forwarder: Forwarder,
    pub min_user_agent_len: usize,
}

impl Settings {
    pub fn build(
        config: &ProxyConfig,
        secrets: &Secrets,
        client: &reqwest::Client,
    ) -> Result<Self, ConfigError> {
        let tokens = TokenService::new(
            secrets.signing_secret.as_deref(),
            config.token.min_secret_len,
            Duration::from_secs(config.token.ttl_secs),
        )
        .ok();

        Ok(Self {
            gate: OriginGate::from_config(&config.cors)?,
            tokens,
            limits: LimiterPolicy::from(&config.rate_limit),
            endpoints: EndpointPolicy::from_config(&config.upstream),
            forwarder: Forwarder::new(client.clone(), &config.upstream),
            min_user_agent_len: config.security.min_user_agent_len,
        })
    }
}

/// The proxy core, shared by every request.
pub struct ProxyService {
    settings: ArcSwap<Settings>,
    limiter: AdaptiveLimiter,
    secrets: Secrets,
    client: reqwest::Client,
}

impl ProxyService {
    pub fn new(config: &ProxyConfig, secrets: Secrets) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.upstream_secs))
            .build()?;
        let settings = Settings::build(config, &secrets, &client)?;

        if settings.tokens.is_none() {
            tracing::error!(
                min_len = config.token.min_secret_len,
                "NS_PROXY_SECRET missing or too short; proxy requests will fail with 500"
            );
        }
        if secrets.upstream_api_key.is_none() {
            tracing::error!("BALLDONTLIE_API_KEY missing; forwarded requests will fail with 500");
        }

        Ok(Self {
            settings: ArcSwap::from_pointee(settings),
            limiter: AdaptiveLimiter::new(),
            secrets,
            client,
        })
    }

    /// Swap in the policy from a new config. Limiter state is kept.
    pub fn reload(&self, config: &ProxyConfig) -> Result<(), ConfigError> {
        let settings = Settings::build(config, &self.secrets, &self.client)?;
        self.settings.store(Arc::new(settings));
        tracing::info!("Proxy policy reloaded");
        Ok(())
    }

    pub fn limiter(&self) -> &AdaptiveLimiter {
        &self.limiter
    }

    /// Drop idle limiter state. Returns the number of entries removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let settings = self.settings.load();
        let removed = self.limiter.sweep(&settings.limits, now);
        metrics::record_tracked_keys(self.limiter.tracked_keys());
        removed
    }

    /// Handle one request. Never fails: every error becomes a response.
    pub async fn handle(&self, req: ProxyRequest) -> ProxyResponse {
        let start = Instant::now();
        let settings = self.settings.load_full();

        let mut response = match self.dispatch(&settings, &req).await {
            Ok(response) => response,
            Err(err) => {
                log_rejection(&req, &err);
                err.into_proxy_response()
            }
        };

        apply_security_headers(&mut response);
        settings.gate.apply_cors(req.header("origin"), &mut response);

        let route = if req.path.starts_with(CSP_REPORT_PATH) {
            "csp_report"
        } else {
            "proxy"
        };
        metrics::record_request(route, response.status.as_u16(), start);
        response
    }

    async fn dispatch(
        &self,
        settings: &Settings,
        req: &ProxyRequest,
    ) -> Result<ProxyResponse, ProxyError> {
        if req.method == Method::OPTIONS {
            return Ok(ProxyResponse::empty(StatusCode::NO_CONTENT));
        }
        if req.path.starts_with(CSP_REPORT_PATH) {
            return match req.method {
                Method::POST => Ok(csp::receive(&req.body)),
                _ => Err(ProxyError::MethodNotAllowed),
            };
        }
        if req.method != Method::GET {
            return Err(ProxyError::MethodNotAllowed);
        }

        let user_agent = req.user_agent();
        if !user_agent_plausible(user_agent, settings.min_user_agent_len) {
            return Err(ProxyError::Forbidden);
        }

        let tokens = settings.tokens.as_ref().ok_or(ProxyError::MissingSecret)?;
        let ip = req.client_ip.as_str();

        if req.query_param("init") == Some("1") {
            let issued = tokens.issue(ip, user_agent, unix_millis());
            metrics::record_token_issued();
            tracing::debug!(client_ip = %ip, "Issued token");
            let body = json!({ "token": issued.token, "expiresInMs": issued.expires_in_ms });
            return Ok(ProxyResponse::json(StatusCode::OK, &body)
                .header(header::CACHE_CONTROL, "no-store"));
        }

        let verified = req.header(TOKEN_HEADER).and_then(|token| {
            let verified = tokens.verify(token, ip, user_agent, unix_millis());
            metrics::record_token_verification(verified.is_some());
            verified
        });
        let jti = verified.as_ref().map(|v| v.jti.as_str());

        let uid = req
            .header(UID_HEADER)
            .map(str::trim)
            .filter(|uid| !uid.is_empty());
        let key = ClientKey::new(ip, uid, jti);

        let endpoint = req.query_param("endpoint").filter(|e| !e.is_empty());
        let weight = settings.limits.request_weight(
            settings.endpoints.route_weight(endpoint),
            bot_risk_score(req, settings.min_user_agent_len),
        );

        let now = Instant::now();
        let ban_secs = settings.limits.ban.as_secs();
        let admission = self.limiter.admit(key.as_str(), weight, &settings.limits, now);
        if let Some(reason) = admission.reason() {
            metrics::record_rate_limited(reason);
            tracing::warn!(client = %key, weight, reason, "Adaptive rate limit rejected request");
            return Err(match admission {
                Admission::Banned => ProxyError::Banned {
                    retry_after_secs: ban_secs,
                },
                _ => ProxyError::RateLimited {
                    retry_after_secs: ban_secs,
                },
            });
        }

        let window_secs = settings.limits.legacy.window.as_secs();
        let verdict = self.limiter.check_legacy(ip, jti, &settings.limits, now);
        if let Some(reason) = verdict.reason() {
            metrics::record_rate_limited(reason);
            tracing::warn!(client = %key, client_ip = %ip, reason, "Legacy rate limit rejected request");
            return Err(match verdict {
                LegacyVerdict::IpOnlyExceeded => ProxyError::LegacyIpOnly {
                    retry_after_secs: window_secs,
                },
                LegacyVerdict::IpExceeded => ProxyError::LegacyIp {
                    retry_after_secs: window_secs,
                },
                _ => ProxyError::LegacyToken {
                    retry_after_secs: window_secs,
                },
            });
        }

        let endpoint = settings.endpoints.validate(endpoint)?;
        let api_key = self
            .secrets
            .upstream_api_key
            .as_deref()
            .ok_or(ProxyError::MissingUpstreamKey)?;

        tracing::debug!(client = %key, endpoint = %endpoint, weight, "Forwarding request");
        settings.forwarder.forward(endpoint, api_key).await
    }
}

fn log_rejection(req: &ProxyRequest, err: &ProxyError) {
    let request_id = req.request_id();
    match err {
        ProxyError::MissingSecret | ProxyError::MissingUpstreamKey => {
            tracing::error!(request_id = %request_id, error = %err, "Proxy misconfigured");
        }
        ProxyError::Upstream(source) => {
            tracing::error!(request_id = %request_id, error = %source, "Upstream request failed");
        }
        ProxyError::Banned { .. }
        | ProxyError::RateLimited { .. }
        | ProxyError::LegacyIpOnly { .. }
        | ProxyError::LegacyIp { .. }
        | ProxyError::LegacyToken { .. } => {
            // Logged with the client key where the decision is made.
        }
        _ => {
            tracing::debug!(
                request_id = %request_id,
                method = %req.method,
                path = %req.path,
                error = %err,
                "Request rejected"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";
    const UA: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";
    const CLIENT_IP: &str = "198.51.100.4";

    fn service() -> ProxyService {
        ProxyService::new(&ProxyConfig::default(), Secrets::new(SECRET, "")).unwrap()
    }

    #[tokio::test]
    async fn test_csp_report_is_hardened() {
        let req = ProxyRequest::new(Method::POST, "/api/csp-report")
            .with_client_ip(CLIENT_IP)
            .with_body(r#"{"csp-report":{"violated-directive":"img-src"}}"#);

        let response = service().handle(req).await;
        assert_eq!(response.status, StatusCode::NO_CONTENT);
        assert_eq!(response.header_value("x-frame-options"), Some("DENY"));
        assert_eq!(response.header_value("x-content-type-options"), Some("nosniff"));
    }

    #[tokio::test]
    async fn test_issued_token_binds_client_ip() {
        let service = service();
        let req = ProxyRequest::new(Method::GET, "/api/proxy?init=1")
            .with_header("user-agent", UA)
            .with_client_ip(CLIENT_IP);

        let response = service.handle(req).await;
        assert_eq!(response.status, StatusCode::OK);
        let body = response.json_body().unwrap();
        let token = body["token"].as_str().unwrap();

        let settings = service.settings.load();
        let tokens = settings.tokens.as_ref().unwrap();
        assert_eq!(body["expiresInMs"], tokens.ttl().as_millis() as u64);

        let now = unix_millis();
        assert!(tokens.verify(token, CLIENT_IP, UA, now).is_some());
        assert!(tokens.verify(token, "198.51.100.5", UA, now).is_none());
    }
}
