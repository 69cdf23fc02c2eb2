//! Edge gateway request-dispatch core.
//!
//! Matches inbound requests to downstream services, enforces route, IP and
//! user rate limits, and forwards through per-service circuit breakers with
//! bounded retries.

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod routing;
pub mod upstream;

// Traffic protection
pub mod resilience;
pub mod security;

// Cross-cutting concerns
pub mod admin;
pub mod health;
pub mod lifecycle;
pub mod observability;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
