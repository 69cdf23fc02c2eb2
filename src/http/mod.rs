//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request-id / trace / timeout layers)
//!     → request.rs (request ID, span, peer address)
//!     → dispatch.rs (identity, route, limits, outbound request)
//!     → [resilience: breaker + retries]
//!     → response.rs (error envelopes, rate-limit headers)
//!     → Send to client
//! ```

pub mod dispatch;
pub mod request;
pub mod response;
pub mod server;

pub use dispatch::Dispatcher;
pub use response::{error_response, is_error_envelope, ErrorEnvelope};
pub use server::{AppState, HttpServer};
