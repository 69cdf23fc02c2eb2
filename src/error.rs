//! Error taxonomy for the gateway request path.

use axum::body::Bytes;
use axum::http::StatusCode;

use crate::security::rate_limit::RateLimited;

/// Result type alias for the dispatch path.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Every way a gateway request can fail.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// No route matches path and method.
    #[error("No route for {method} {path}")]
    RouteNotFound { method: String, path: String },

    /// Target service is feature-flagged off.
    #[error("Service '{0}' is not available")]
    ServiceDisabled(String),

    /// Credentials rejected, or missing on a protected route.
    #[error("{0}")]
    Unauthorized(String),

    /// Request body over the configured limit.
    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// Malformed inbound request.
    #[error("{0}")]
    BadRequest(String),

    /// A rate-limit window is exhausted.
    #[error("Too many requests, retry after {}s", .0.retry_after_secs)]
    RateLimited(#[from] RateLimited),

    /// Breaker rejected the call; no network attempt was made.
    #[error("Service '{service}' is temporarily unavailable")]
    CircuitOpen { service: String, retry_after_secs: u64 },

    /// Every attempt timed out.
    #[error("Service '{service}' timed out")]
    DownstreamTimeout { service: String, retry_after_secs: u64 },

    /// Every attempt failed to connect.
    #[error("Service '{service}' is unreachable")]
    DownstreamUnreachable { service: String, retry_after_secs: u64 },

    /// Non-transient transport failure (e.g. connection reset mid-response).
    #[error("Service '{service}' returned an invalid response")]
    BadGateway { service: String, message: String },

    /// Downstream answered with an error status; `body` is relayed when it is
    /// already an error envelope. Retry-exhausted 503/504 answers carry a hint.
    #[error("Service '{service}' answered {status}")]
    DownstreamError {
        service: String,
        status: StatusCode,
        body: Bytes,
        retry_after_secs: Option<u64>,
    },

    /// Catch-all. The message is only shown in development.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RouteNotFound { .. } | Self::ServiceDisabled(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::CircuitOpen { .. } | Self::DownstreamUnreachable { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::DownstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            Self::DownstreamError { status, .. } => *status,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code for the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ServiceDisabled(_) => "SERVICE_DISABLED",
            other => code_for_status(other.status()),
        }
    }

    /// Timing hint for `details.retryAfter`; also `Retry-After` on 429.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited(limited) => Some(limited.retry_after_secs),
            Self::DownstreamError { retry_after_secs, .. } => *retry_after_secs,
            Self::CircuitOpen { retry_after_secs, .. }
            | Self::DownstreamTimeout { retry_after_secs, .. }
            | Self::DownstreamUnreachable { retry_after_secs, .. } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// Downstream service involved, if any.
    pub fn service(&self) -> Option<&str> {
        match self {
            Self::ServiceDisabled(service)
            | Self::CircuitOpen { service, .. }
            | Self::DownstreamTimeout { service, .. }
            | Self::DownstreamUnreachable { service, .. }
            | Self::BadGateway { service, .. }
            | Self::DownstreamError { service, .. } => Some(service),
            _ => None,
        }
    }
}

/// Default status → code mapping.
pub fn code_for_status(status: StatusCode) -> &'static str {
    match status.as_u16() {
        400 => "BAD_REQUEST",
        401 => "UNAUTHORIZED",
        403 => "FORBIDDEN",
        404 => "NOT_FOUND",
        409 => "CONFLICT",
        413 => "PAYLOAD_TOO_LARGE",
        429 => "RATE_LIMITED",
        500 => "INTERNAL_ERROR",
        502 => "BAD_GATEWAY",
        503 => "SERVICE_UNAVAILABLE",
        504 => "GATEWAY_TIMEOUT",
        400..=499 => "BAD_REQUEST",
        _ => "INTERNAL_ERROR",
    }
}
