//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → identity.rs (resolve caller, reject bad credentials)
//!     → rate_limit.rs (route, IP and user scoped windows)
//!     → headers.rs (client IP, curated forward set)
//!     → Pass to dispatch
//! ```
//!
//! # Design Decisions
//! - Rate limits are checked before any byte reaches a backend
//! - Fail closed: reject on any security check failure
//! - No trust in client input

pub mod headers;
pub mod identity;
pub mod rate_limit;

pub use identity::{AnonymousVerifier, AuthRejection, Identity, IdentityVerifier, StaticTokenVerifier};
pub use rate_limit::{LimitKey, LimitScope, RateLimitDecision, RateLimitSweeper, RateLimited, RateLimiter};
