//! Exponential backoff.

use std::time::Duration;

/// Delay after failed attempt `attempt` (1-based): `min(initial * 2^(attempt-1), max)`.
///
/// No jitter; the sequence is deterministic.
pub fn retry_delay(attempt: u32, initial: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 2u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
    initial.saturating_mul(factor).min(max)
}
