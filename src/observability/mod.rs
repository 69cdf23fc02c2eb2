//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters, gauges, histograms via `metrics`)
//!
//! Consumers:
//!     → stdout (pretty for development, JSON for production)
//!     → Prometheus scrape endpoint on its own address
//! ```
//!
//! # Design Decisions
//! - The request ID is recorded on the request span, so every event inside
//!   dispatch carries it
//! - Metric updates go through the `metrics` facade; without an installed
//!   recorder they are no-ops

pub mod logging;
pub mod metrics;
