//! Downstream services.
//!
//! # Data Flow
//! ```text
//! Route matched → target service name
//!     → registry.rs (base URL, timeout, feature flag)
//!     → client.rs (HTTP call, transport error classification)
//! ```
//!
//! # Design Decisions
//! - Each service is a single fixed base URL; no load balancing
//! - Registry is built once at startup and never mutated
//! - The client sits behind a trait so resilience logic is testable

pub mod client;
pub mod registry;

pub use client::{DownstreamClient, HyperClient, TransportError};
pub use registry::{RegistryError, ServiceEndpoint, ServiceRegistry};
