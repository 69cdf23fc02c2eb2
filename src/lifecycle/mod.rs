//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → service registry → route table → breakers → dispatcher
//!
//! Shutdown (shutdown.rs):
//!     Trigger → server stops accepting and drains, sweeper and health
//!     monitor exit their loops
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: registry first, routes and breakers depend on it
//! - Any startup error is fatal
//! - No hot reload; routes and services are immutable once built

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{build_state, StartupError};
