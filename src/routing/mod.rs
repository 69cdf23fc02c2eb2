//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → router.rs (ordered route scan)
//!     → matcher.rs (segment / wildcard match, method filter)
//!     → Return: matched Route or NoMatch (404)
//!     → rewrite.rs (downstream path)
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → Compile patterns and method filters
//!     → Freeze as immutable RouteTable (config order kept)
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path
//! - Deterministic: same input always matches same route
//! - First match wins (ordered by configuration)

pub mod matcher;
pub mod rewrite;
pub mod router;

pub use matcher::{MethodFilter, Params, PatternError, RoutePattern};
pub use rewrite::PathRewrite;
pub use router::{Route, RouteError, RouteTable};
