//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → tls.rs (optional TLS handshake, rustls)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - TLS is optional; most deployments terminate it at the edge platform
//! - Certificate problems are fatal at startup

pub mod tls;
