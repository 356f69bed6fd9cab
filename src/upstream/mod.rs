//! Upstream forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! admitted request
//!     → endpoint.rs (allow-list, absolute-URL guard)
//!     → forwarder.rs (GET upstream, bearer key, normalize body)
//!     → ProxyResponse
//! ```

pub mod endpoint;
pub mod forwarder;

pub use endpoint::EndpointPolicy;
pub use forwarder::Forwarder;
