//! Retry executor.
//!
//! # Responsibilities
//! - Consult the service's circuit breaker before any network call
//! - Execute the call with bounded exponential-backoff retries
//! - Report the final outcome (not every attempt) back to the breaker
//! - Translate the final failure into a gateway error
//!
//! # Design Decisions
//! - Retry only 5xx responses and connect/timeout transport errors
//! - 4xx answers propagate on first occurrence and never count as failures
//! - The request body is buffered once and replayed for every attempt
//! - Dropping the future (client went away) cancels the pending attempt or delay
//! - The overall request budget is enforced here; expiry counts as a breaker
//!   failure

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Request, Response, StatusCode, Uri};

use crate::config::{RetryConfig, TimeoutConfig};
use crate::error::GatewayError;
use crate::observability::metrics;
use crate::resilience::backoff::retry_delay;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerRegistry, CircuitState};
use crate::resilience::timeouts::call_with_timeout;
use crate::upstream::{DownstreamClient, ServiceEndpoint, TransportError};

/// Largest downstream error body kept for passthrough.
const MAX_ERROR_BODY: usize = 64 * 1024;

/// Bounded retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Overall deadline for all attempts and delays of one request.
    pub budget: Duration,
}

impl RetryPolicy {
    pub fn new(retries: &RetryConfig, timeouts: &TimeoutConfig) -> Self {
        Self {
            max_attempts: retries.max_attempts.max(1),
            initial_delay: Duration::from_millis(retries.initial_delay_ms),
            max_delay: Duration::from_millis(retries.max_delay_ms),
            budget: Duration::from_secs(timeouts.request_secs),
        }
    }

    /// Delay after failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        retry_delay(attempt, self.initial_delay, self.max_delay)
    }

    /// Longest a full attempt sequence can take with `attempt_timeout` per
    /// call, ignoring the budget.
    pub fn worst_case(&self, attempt_timeout: Duration) -> Duration {
        (1..self.max_attempts).fold(
            attempt_timeout.saturating_mul(self.max_attempts),
            |total, attempt| total.saturating_add(self.delay_for(attempt)),
        )
    }
}

/// A fully built downstream request that can be replayed.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl OutboundRequest {
    fn to_http(&self) -> Request<Body> {
        let mut request = Request::new(Body::from(self.body.clone()));
        *request.method_mut() = self.method.clone();
        *request.uri_mut() = self.uri.clone();
        *request.headers_mut() = self.headers.clone();
        request
    }
}

/// Runs downstream calls through breaker + retry loop.
#[derive(Clone)]
pub struct RetryExecutor {
    client: Arc<dyn DownstreamClient>,
    breakers: Arc<CircuitBreakerRegistry>,
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(
        client: Arc<dyn DownstreamClient>,
        breakers: Arc<CircuitBreakerRegistry>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            client,
            breakers,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// Forward `request` to `service`.
    ///
    /// Returns the downstream response for 1xx-3xx answers. Every other outcome
    /// is a [`GatewayError`]; a 4xx/5xx answer keeps its status and body. The
    /// whole attempt sequence, retry delays included, is bounded by the policy
    /// budget; running out of it settles the call as a breaker failure.
    pub async fn execute(
        &self,
        service: &ServiceEndpoint,
        request: OutboundRequest,
    ) -> Result<Response<Body>, GatewayError> {
        let breaker = self.breakers.get(&service.name).ok_or_else(|| {
            GatewayError::Internal(format!("no circuit breaker for service '{}'", service.name))
        })?;

        let permit = match breaker.try_acquire() {
            Ok(permit) => permit,
            Err(open) => {
                tracing::warn!(service = %service.name, "Circuit open, failing fast");
                metrics::record_circuit_rejection(&service.name);
                return Err(GatewayError::CircuitOpen {
                    service: service.name.clone(),
                    retry_after_secs: ceil_secs(open.retry_after).max(1),
                });
            }
        };

        let (outcome, attempts) =
            match tokio::time::timeout(self.policy.budget, self.attempt(service, &request)).await {
                Ok(finished) => finished,
                Err(_) => {
                    permit.failure();
                    tracing::error!(
                        service = %service.name,
                        budget_ms = self.policy.budget.as_millis() as u64,
                        "Request budget exhausted"
                    );
                    return Err(GatewayError::DownstreamTimeout {
                        service: service.name.clone(),
                        retry_after_secs: self.retry_hint(&breaker),
                    });
                }
            };

        match outcome {
            Ok(response) if response.status().is_server_error() => {
                permit.failure();
                tracing::error!(
                    service = %service.name,
                    attempts,
                    status = %response.status(),
                    "Downstream failed after retries"
                );
                let hint = matches!(
                    response.status(),
                    StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
                )
                .then(|| self.retry_hint(&breaker));
                Err(downstream_error(service, response, hint).await)
            }
            Ok(response) if response.status().is_client_error() => {
                permit.success();
                Err(downstream_error(service, response, None).await)
            }
            Ok(response) => {
                permit.success();
                Ok(response)
            }
            Err(e) => {
                permit.failure();
                tracing::error!(
                    service = %service.name,
                    attempts,
                    error = %e,
                    "Downstream call failed"
                );
                Err(transport_error(service, e, self.retry_hint(&breaker)))
            }
        }
    }

    /// Run attempts until one is final or retries run out. Returns the last
    /// outcome and the number of attempts made.
    async fn attempt(
        &self,
        service: &ServiceEndpoint,
        request: &OutboundRequest,
    ) -> (Result<Response<Body>, TransportError>, u32) {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome =
                call_with_timeout(service.timeout, self.client.send(request.to_http())).await;

            let retryable = match &outcome {
                Ok(response) => response.status().is_server_error(),
                Err(e) => e.is_transient(),
            };
            if !retryable || attempt >= self.policy.max_attempts {
                return (outcome, attempt);
            }

            let delay = self.policy.delay_for(attempt);
            match &outcome {
                Ok(response) => tracing::info!(
                    service = %service.name,
                    attempt,
                    status = %response.status(),
                    delay_ms = delay.as_millis() as u64,
                    "Retrying downstream call"
                ),
                Err(e) => tracing::info!(
                    service = %service.name,
                    attempt,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying downstream call"
                ),
            }
            metrics::record_retry(&service.name);
            drop(outcome);
            tokio::time::sleep(delay).await;
        }
    }

    /// Seconds a client should wait after a failed call: the breaker's reset
    /// timeout once it is open, the longest backoff delay otherwise.
    fn retry_hint(&self, breaker: &CircuitBreaker) -> u64 {
        let hint = if breaker.state() == CircuitState::Open {
            breaker.reset_timeout()
        } else {
            self.policy.max_delay
        };
        ceil_secs(hint).max(1)
    }
}

async fn downstream_error(
    service: &ServiceEndpoint,
    response: Response<Body>,
    retry_after_secs: Option<u64>,
) -> GatewayError {
    let status = response.status();
    let body = match axum::body::to_bytes(response.into_body(), MAX_ERROR_BODY).await {
        Ok(body) => body,
        Err(e) => {
            tracing::debug!(service = %service.name, error = %e, "Dropping unreadable error body");
            Bytes::new()
        }
    };
    GatewayError::DownstreamError {
        service: service.name.clone(),
        status,
        body,
        retry_after_secs,
    }
}

fn transport_error(service: &ServiceEndpoint, error: TransportError, retry_after_secs: u64) -> GatewayError {
    let service = service.name.clone();
    match error {
        TransportError::Timeout(_) => GatewayError::DownstreamTimeout {
            service,
            retry_after_secs,
        },
        TransportError::Connect(_) => GatewayError::DownstreamUnreachable {
            service,
            retry_after_secs,
        },
        TransportError::Other(message) => GatewayError::BadGateway { service, message },
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}
