//! Client-facing responses.
//!
//! # Responsibilities
//! - Render every failure as the JSON error envelope
//! - Relay downstream error envelopes verbatim when shape-compatible
//! - Attach timing hints: `details.retryAfter`, plus `Retry-After` on 429
//! - Attach `X-Rate-Limit-*` headers
//!
//! # Design Decisions
//! - Internal error details are only rendered in development
//! - A downstream error body that is not an envelope is replaced by one built
//!   from its status

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Response, StatusCode};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{code_for_status, GatewayError};
use crate::security::headers::{X_RATE_LIMIT_LIMIT, X_RATE_LIMIT_REMAINING, X_RATE_LIMIT_RESET};
use crate::security::RateLimitDecision;

/// `{ "success": false, "error": { ... } }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorEnvelope {
    pub fn new(code: impl Into<String>, message: impl Into<String>, details: Option<Value>) -> Self {
        Self {
            success: false,
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
                details,
            },
        }
    }
}

/// Whether `body` already has the error envelope shape.
pub fn is_error_envelope(body: &[u8]) -> bool {
    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        return false;
    };
    let error = &value["error"];
    value["success"] == Value::Bool(false)
        && error["code"].is_string()
        && error["message"].is_string()
}

/// Render `err` for the client.
pub fn error_response(err: &GatewayError, development: bool) -> Response<Body> {
    let status = err.status();

    if let GatewayError::DownstreamError { body, .. } = err {
        if is_error_envelope(body) {
            let mut response = Response::new(Body::from(body.clone()));
            *response.status_mut() = status;
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            return response;
        }
    }

    let envelope = ErrorEnvelope::new(err.code(), client_message(err, development), details(err, development));
    let body = match serde_json::to_vec(&envelope) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize error envelope");
            br#"{"success":false,"error":{"code":"INTERNAL_ERROR","message":"Internal server error"}}"#
                .to_vec()
        }
    };

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let GatewayError::RateLimited(limited) = err {
        headers.insert(header::RETRY_AFTER, HeaderValue::from(limited.retry_after_secs));
    }
    response
}

fn client_message(err: &GatewayError, development: bool) -> String {
    match err {
        GatewayError::Internal(_) if !development => "Internal server error".to_string(),
        GatewayError::DownstreamError { status, .. } => status
            .canonical_reason()
            .unwrap_or("Downstream error")
            .to_string(),
        other => other.to_string(),
    }
}

fn details(err: &GatewayError, development: bool) -> Option<Value> {
    if let Some(secs) = err.retry_after_secs() {
        return Some(serde_json::json!({ "retryAfter": secs }));
    }
    if !development {
        return None;
    }
    match err {
        GatewayError::Internal(message) => Some(serde_json::json!({ "internal": message })),
        GatewayError::BadGateway { message, .. } => Some(serde_json::json!({ "transport": message })),
        _ => None,
    }
}

/// Set the `X-Rate-Limit-*` headers from `decision`.
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(X_RATE_LIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATE_LIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(X_RATE_LIMIT_RESET, HeaderValue::from(decision.reset_at));
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        error_response(&self, false)
    }
}

/// Envelope for a bare status, used where no [`GatewayError`] exists.
pub fn status_envelope(status: StatusCode, message: &str) -> Response<Body> {
    let envelope = ErrorEnvelope::new(code_for_status(status), message, None);
    let mut response = axum::Json(envelope).into_response();
    *response.status_mut() = status;
    response
}
