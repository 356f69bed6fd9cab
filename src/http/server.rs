//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router for `/api/proxy` and `/api/csp-report`
//! - Wire up middleware (hardening headers, tracing, timeout, request ID)
//! - Convert axum requests into `ProxyRequest` and hand them to the pipeline
//! - Apply config reloads and run the limiter sweep in the background
//! - Serve plain HTTP or TLS with graceful shutdown

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, State},
    http::{HeaderName, HeaderValue, Method, Request},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{ConfigError, ProxyConfig, Secrets};
use crate::http::pipeline::{ProxyService, CSP_REPORT_PATH};
use crate::http::request::{ProxyRequest, X_REQUEST_ID};
use crate::http::response::ProxyResponse;
use crate::net::tls::load_tls_config;
use crate::security::headers::SECURITY_HEADERS;

/// Path of the proxy endpoint.
pub const PROXY_PATH: &str = "/api/proxy";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ProxyService>,
    pub trust_forwarded_for: bool,
    pub max_body_size: usize,
}

/// HTTP server for the stats proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    service: Arc<ProxyService>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration and secrets.
    pub fn new(config: ProxyConfig, secrets: Secrets) -> Result<Self, ConfigError> {
        let service = Arc::new(ProxyService::new(&config, secrets)?);

        let state = AppState {
            service: service.clone(),
            trust_forwarded_for: config.listener.trust_forwarded_for,
            max_body_size: config.security.max_body_size,
        };

        let router = Self::build_router(&config, state);
        Ok(Self {
            router,
            config,
            service,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let csp_nested = format!("{CSP_REPORT_PATH}/{{*rest}}");
        let [nosniff, referrer, frame] = SECURITY_HEADERS;

        // Bodies are bounded by the handler, not a limit layer, so an
        // oversized CSP report still gets its 204.
        Router::new()
            .route(PROXY_PATH, any(proxy_handler))
            .route(CSP_REPORT_PATH, any(proxy_handler))
            .route(&csp_nested, any(proxy_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(hardening(nosniff))
                    .layer(hardening(referrer))
                    .layer(hardening(frame))
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http().make_span_with(
                        |request: &Request<Body>| {
                            let request_id = request
                                .headers()
                                .get(X_REQUEST_ID)
                                .and_then(|v| v.to_str().ok())
                                .unwrap_or("unknown");
                            tracing::info_span!(
                                "request",
                                method = %request.method(),
                                path = %request.uri().path(),
                                request_id = %request_id,
                            )
                        },
                    ))
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TimeoutLayer::new(Duration::from_secs(
                        config.timeouts.request_secs,
                    ))),
            )
    }

    /// The router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// The shared proxy core.
    pub fn service(&self) -> Arc<ProxyService> {
        self.service.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            tls = self.config.listener.tls.is_some(),
            "HTTP server starting"
        );

        let service = self.service.clone();
        tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                if let Err(e) = service.reload(&config) {
                    tracing::error!(error = %e, "Failed to apply config update");
                }
            }
        });

        let sweep_secs = self.config.rate_limit.sweep_interval_secs;
        if sweep_secs > 0 {
            let service = self.service.clone();
            let mut sweep_shutdown = shutdown.resubscribe();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(sweep_secs));
                // First tick completes immediately.
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            let removed = service.sweep(Instant::now());
                            if removed > 0 {
                                tracing::debug!(removed, "Swept idle rate limit entries");
                            }
                        }
                        _ = sweep_shutdown.recv() => break,
                    }
                }
            });
        }

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        match &self.config.listener.tls {
            Some(tls) => {
                let rustls =
                    load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;
                let handle = axum_server::Handle::new();
                let drain = handle.clone();
                let grace = Duration::from_secs(self.config.timeouts.request_secs);
                tokio::spawn(async move {
                    let _ = shutdown.recv().await;
                    drain.graceful_shutdown(Some(grace));
                });

                axum_server::from_tcp_rustls(listener.into_std()?, rustls)
                    .handle(handle)
                    .serve(app)
                    .await?;
            }
            None => {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        let _ = shutdown.recv().await;
                    })
                    .await?;
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Fixed hardening header for responses produced outside the pipeline
/// (timeouts, unknown routes).
fn hardening((name, value): (HeaderName, &'static str)) -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::overriding(name, HeaderValue::from_static(value))
}

/// Single handler for both endpoints; the pipeline dispatches on path.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> ProxyResponse {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let (parts, body) = request.into_parts();

    let body = if parts.method == Method::POST {
        match axum::body::to_bytes(body, state.max_body_size).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!(error = %e, "Discarding unreadable request body");
                Bytes::new()
            }
        }
    } else {
        Bytes::new()
    };

    let request = ProxyRequest::from_parts(&parts, body, peer, state.trust_forwarded_for);
    state.service.handle(request).await
}
