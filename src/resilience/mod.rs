//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatch to a service:
//!     → circuit_breaker.rs (fail fast while the service is known-bad)
//!     → timeouts.rs (per-attempt deadline)
//!     → retries.rs (retry 5xx / connect / timeout with backoff.rs delays)
//!     → circuit_breaker.rs (final outcome only)
//! ```
//!
//! # Design Decisions
//! - One breaker per service, never global
//! - A retried request counts as one call for the breaker
//! - Retries apply to every method; the body is buffered so it can be replayed

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{
    BreakerSnapshot, CallPermit, CircuitBreaker, CircuitBreakerRegistry, CircuitOpen, CircuitState,
};
pub use retries::{OutboundRequest, RetryExecutor, RetryPolicy};
