//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → headers.rs (origin allow-list, CORS + hardening headers)
//!     → bot.rs (User-Agent gate, risk score)
//!     → token.rs (issue / verify signed anti-bot tokens)
//!     → identity.rs (pick the rate-limit key)
//!     → rate_limit.rs (ban, burst, sustained, legacy counters)
//!     → Pass to upstream
//! ```
//!
//! # Design Decisions
//! - CORS is advisory: disallowed origins get no CORS headers, not a 403
//! - A bad token downgrades the caller instead of rejecting it
//! - No trust in client input beyond the first forwarded hop

pub mod bot;
pub mod headers;
pub mod identity;
pub mod rate_limit;
pub mod token;
