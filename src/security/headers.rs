//! Header policy at the gateway boundary.
//!
//! # Responsibilities
//! - Resolve the client IP (first `X-Forwarded-For` entry, else socket peer)
//! - Build the curated header set forwarded downstream
//! - Strip hop-by-hop headers from downstream responses
//!
//! # Design Decisions
//! - Allow-list, not deny-list: only named headers are forwarded
//! - Identity headers are set from the verified identity only; inbound copies
//!   are dropped
//! - `Authorization` never leaves the gateway

use std::net::SocketAddr;

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};

use crate::security::identity::Identity;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
pub const X_DEVICE_ID: HeaderName = HeaderName::from_static("x-device-id");
pub const X_PLATFORM: HeaderName = HeaderName::from_static("x-platform");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_USER_ID: HeaderName = HeaderName::from_static("x-user-id");
pub const X_RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-rate-limit-limit");
pub const X_RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-rate-limit-remaining");
pub const X_RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-rate-limit-reset");

/// Inbound headers copied verbatim to the downstream request.
const PASSTHROUGH: [HeaderName; 5] = [
    header::CONTENT_TYPE,
    header::ACCEPT_LANGUAGE,
    X_REQUEST_ID,
    X_DEVICE_ID,
    X_PLATFORM,
];

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Client IP as seen by rate limiting and logs.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get(&X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_owned)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Curated header set for the outbound request.
pub fn forward_headers(inbound: &HeaderMap, identity: Option<&Identity>) -> HeaderMap {
    let mut outbound = HeaderMap::new();
    for name in &PASSTHROUGH {
        for value in inbound.get_all(name) {
            outbound.append(name.clone(), value.clone());
        }
    }
    if let Some(identity) = identity {
        match HeaderValue::from_str(&identity.user_id) {
            Ok(value) => {
                outbound.insert(X_USER_ID, value);
            }
            Err(_) => {
                tracing::warn!(user_id = %identity.user_id, "User id is not a valid header value");
            }
        }
    }
    outbound
}

/// Remove connection-scoped headers before relaying a response.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}
