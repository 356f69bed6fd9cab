//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Bind listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Broadcast → Stop accepting → Drain → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: a bad config file or an unbindable address is fatal
//! - Config reload is driven by the file watcher, not SIGHUP

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
