//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware, request ID)
//!     → request.rs (method, path, query, client IP)
//!     → pipeline.rs (gate, token, limiter, forwarder)
//!         → csp.rs for violation reports
//!     → response.rs (status, headers, JSON body)
//!     → Send to client
//! ```

pub mod csp;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod server;

pub use pipeline::ProxyService;
pub use request::{ProxyRequest, X_REQUEST_ID};
pub use response::ProxyResponse;
pub use server::HttpServer;
