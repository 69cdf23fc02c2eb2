//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → GET each enabled service's health path
//!     → Update state.rs
//!
//! Status table (state.rs):
//!     Latest probe outcome per service, read by the admin API
//! ```
//!
//! # Design Decisions
//! - Informational only: probe results never open or close a circuit
//! - Health state is per service

pub mod active;
pub mod state;

pub use active::HealthMonitor;
pub use state::{HealthTable, ServiceHealth};
