//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::StatusCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use stats_proxy::config::{ProxyConfig, Secrets};
use stats_proxy::http::HttpServer;
use stats_proxy::lifecycle::Shutdown;

pub const SECRET: &str = "0123456789abcdef0123456789abcdef";
pub const API_KEY: &str = "test-upstream-key";
pub const BROWSER_UA: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0) AppleWebKit/605.1.15 Safari/605.1.15";

/// What the mock upstream saw for one request.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub target: String,
    pub authorization: Option<String>,
    pub user_agent: Option<String>,
}

pub struct MockUpstream {
    pub addr: SocketAddr,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl MockUpstream {
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

/// Start a mock upstream that always answers `status` with `body`.
pub async fn start_mock_upstream(status: u16, body: &'static str) -> MockUpstream {
    start_programmable_upstream(move |_target| async move { (status, body.to_string()) }).await
}

/// Start a programmable mock upstream. The closure gets the request target
/// (path and query) and returns status and body.
pub async fn start_programmable_upstream<F, Fut>(f: F) -> MockUpstream
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let f = Arc::new(f);

    let recorded = seen.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            let recorded = recorded.clone();
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                let request = parse_head(&head);
                let target = request.target.clone();
                recorded.lock().unwrap().push(request);

                let (status, body) = f(target).await;
                let reason = StatusCode::from_u16(status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("Unknown");
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len(),
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    MockUpstream { addr, seen }
}

async fn read_head(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn parse_head(head: &str) -> SeenRequest {
    let mut lines = head.lines();
    let target = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or_default()
        .to_string();

    let mut authorization = None;
    let mut user_agent = None;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            match name.trim().to_ascii_lowercase().as_str() {
                "authorization" => authorization = Some(value.trim().to_string()),
                "user-agent" => user_agent = Some(value.trim().to_string()),
                _ => {}
            }
        }
    }

    SeenRequest {
        target,
        authorization,
        user_agent,
    }
}

/// An address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Default config pointed at `base_url`, with metrics and sweeping off.
pub fn test_config(base_url: &str) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.upstream.base_url = base_url.to_string();
    config.observability.metrics_enabled = false;
    config.rate_limit.sweep_interval_secs = 0;
    config.timeouts.upstream_secs = 2;
    config
}

pub fn test_secrets() -> Secrets {
    Secrets::new(SECRET, API_KEY)
}

/// Start the proxy on an ephemeral port. The returned `Shutdown` stops it.
pub async fn spawn_proxy(config: ProxyConfig, secrets: Secrets) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (_, config_updates) = mpsc::unbounded_channel();
    let server = HttpServer::new(config, secrets).unwrap();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, shutdown)
}

/// A reqwest client that looks like a browser to the bot heuristics.
pub fn browser_client() -> reqwest::Client {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        reqwest::header::ACCEPT,
        reqwest::header::HeaderValue::from_static("application/json"),
    );
    headers.insert(
        reqwest::header::ACCEPT_LANGUAGE,
        reqwest::header::HeaderValue::from_static("en-US,en;q=0.9"),
    );
    reqwest::Client::builder()
        .user_agent(BROWSER_UA)
        .default_headers(headers)
        .no_proxy()
        .build()
        .unwrap()
}
