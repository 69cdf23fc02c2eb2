//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap each downstream attempt with the service's own deadline
//! - Cancel the attempt cleanly on timeout (the future is dropped)
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other transport errors
//! - The per-attempt deadline is shorter than the overall request timeout

use std::future::Future;
use std::time::Duration;

use crate::upstream::TransportError;

/// Run one downstream call under `timeout`.
pub async fn call_with_timeout<T, F>(timeout: Duration, call: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(timeout)),
    }
}
