//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events, request spans)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (human or JSON lines)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every span via tower-http
//! - Secrets and tokens are never logged; client keys are
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
