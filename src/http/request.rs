//! Inbound request helpers.
//!
//! # Responsibilities
//! - Read the request ID assigned by the request-id layer
//! - Build the per-request tracing span
//! - Recover the socket peer recorded by `ConnectInfo`
//!
//! # Design Decisions
//! - Request ID added as early as possible (outermost layer) for tracing
//! - An inbound `X-Request-Id` is kept, not replaced

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, HeaderValue, Request};
use tracing::Span;
use uuid::Uuid;

use crate::security::headers::X_REQUEST_ID;

/// Request ID header value, or `"unknown"`.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Assign a UUID v4 request ID when none is present.
pub fn ensure_request_id(headers: &mut HeaderMap) {
    if headers.contains_key(X_REQUEST_ID) {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(&Uuid::new_v4().to_string()) {
        headers.insert(X_REQUEST_ID, value);
    }
}

/// Span wrapping one request; every dispatch event inherits its fields.
pub fn make_span(request: &Request<Body>) -> Span {
    tracing::info_span!(
        "request",
        request_id = %request_id(request.headers()),
        method = %request.method(),
        path = %request.uri().path(),
    )
}

/// Socket peer, when the server was started with connect info.
pub fn peer_addr(request: &Request<Body>) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}
