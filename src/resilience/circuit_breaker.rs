//! Circuit breaker for downstream protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: service assumed down, requests fail fast
//! - Half-Open: one probe request tests whether the service recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= threshold
//! Open → Half-Open: first call after reset timeout (becomes the probe)
//! Half-Open → Closed: probe succeeds
//! Half-Open → Open: probe fails (fresh last-failure timestamp)
//! ```
//!
//! # Design Decisions
//! - Per-service circuit breaker (not global), created at startup
//! - Fail fast in Open state (no network attempt)
//! - Single probe in Half-Open: the Open → Half-Open transition and the probe
//!   slot are taken under the breaker's own lock, so concurrent callers
//!   during the probe are rejected
//! - A probe whose caller went away releases its slot on drop

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Call rejected by an open circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("circuit open, retry after {retry_after:?}")]
pub struct CircuitOpen {
    pub retry_after: Duration,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Failure-tracking state machine for one downstream service.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

/// Point-in-time view for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub service: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub probe_in_flight: bool,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn from_config(name: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        Self::new(
            name,
            config.failure_threshold,
            Duration::from_millis(config.reset_timeout_ms),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reset_timeout(&self) -> Duration {
        self.reset_timeout
    }

    /// Ask permission for one call. The permit must be settled with
    /// [`CallPermit::success`] or [`CallPermit::failure`].
    pub fn try_acquire(&self) -> Result<CallPermit<'_>, CircuitOpen> {
        self.try_acquire_at(Instant::now())
    }

    fn try_acquire_at(&self, now: Instant) -> Result<CallPermit<'_>, CircuitOpen> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(CallPermit::new(self, false)),
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure_at
                    .map_or(self.reset_timeout, |at| now.saturating_duration_since(at));
                if elapsed >= self.reset_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    tracing::info!(service = %self.name, "Circuit half-open, admitting probe");
                    metrics::record_circuit_state(&self.name, CircuitState::HalfOpen);
                    Ok(CallPermit::new(self, true))
                } else {
                    Err(CircuitOpen {
                        retry_after: self.reset_timeout - elapsed,
                    })
                }
            }
            CircuitState::HalfOpen if inner.probe_in_flight => {
                tracing::debug!(service = %self.name, "Probe in flight, rejecting call");
                Err(CircuitOpen {
                    retry_after: Duration::ZERO,
                })
            }
            CircuitState::HalfOpen => {
                inner.probe_in_flight = true;
                Ok(CallPermit::new(self, true))
            }
        }
    }

    /// Reset failures and close the circuit.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        let previous = inner.state;
        inner.failure_count = 0;
        inner.probe_in_flight = false;
        inner.state = CircuitState::Closed;

        if previous != CircuitState::Closed {
            tracing::info!(service = %self.name, "Circuit breaker closed");
            metrics::record_circuit_state(&self.name, CircuitState::Closed);
        }
    }

    /// Count one failed call; opens the circuit at the threshold.
    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    fn record_failure_at(&self, now: Instant) {
        let mut inner = self.inner.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure_at = Some(now);
        inner.probe_in_flight = false;

        let open = match inner.state {
            CircuitState::Closed => inner.failure_count >= self.failure_threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };
        if open {
            inner.state = CircuitState::Open;
            tracing::warn!(
                service = %self.name,
                failures = inner.failure_count,
                threshold = self.failure_threshold,
                "Circuit breaker opened"
            );
            metrics::record_circuit_state(&self.name, CircuitState::Open);
        } else {
            tracing::debug!(
                service = %self.name,
                failures = inner.failure_count,
                threshold = self.failure_threshold,
                "Downstream failure recorded"
            );
        }
    }

    fn release_probe(&self) {
        self.inner.lock().probe_in_flight = false;
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            service: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            probe_in_flight: inner.probe_in_flight,
        }
    }
}

/// Permission for one call through a breaker.
#[derive(Debug)]
#[must_use = "a permit must be settled with success() or failure()"]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl<'a> CallPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, probe: bool) -> Self {
        Self {
            breaker,
            probe,
            settled: false,
        }
    }

    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.record_failure();
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.probe {
            tracing::debug!(service = %self.breaker.name, "Probe abandoned, releasing slot");
            self.breaker.release_probe();
        }
    }
}

/// One breaker per downstream service, fixed at startup.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    breakers: HashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new<'a>(services: impl IntoIterator<Item = &'a str>, config: &CircuitBreakerConfig) -> Self {
        let breakers = services
            .into_iter()
            .map(|name| {
                metrics::record_circuit_state(name, CircuitState::Closed);
                (name.to_string(), Arc::new(CircuitBreaker::from_config(name, config)))
            })
            .collect();
        Self { breakers }
    }

    pub fn get(&self, service: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(service).cloned()
    }

    /// Snapshots sorted by service name.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<_> = self.breakers.values().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.service.cmp(&b.service));
        snapshots
    }
}
