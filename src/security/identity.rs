//! Caller identity resolution.
//!
//! Token verification itself lives outside the gateway core. The dispatcher
//! only consumes the outcome: an opaque user id, anonymous, or a rejection.

use std::collections::HashMap;

use axum::http::{header, HeaderMap};

/// A verified caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
}

/// Credentials were presented but are not acceptable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct AuthRejection(pub String);

/// Seam for the external auth collaborator.
pub trait IdentityVerifier: Send + Sync {
    /// `Ok(None)` means the caller is anonymous.
    fn verify(&self, headers: &HeaderMap) -> Result<Option<Identity>, AuthRejection>;
}

/// Treats every caller as anonymous.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnonymousVerifier;

impl IdentityVerifier for AnonymousVerifier {
    fn verify(&self, _headers: &HeaderMap) -> Result<Option<Identity>, AuthRejection> {
        Ok(None)
    }
}

/// Accepts bearer tokens from a fixed table (token -> user id).
#[derive(Debug, Default, Clone)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, String>,
}

impl StaticTokenVerifier {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }
}

impl IdentityVerifier for StaticTokenVerifier {
    fn verify(&self, headers: &HeaderMap) -> Result<Option<Identity>, AuthRejection> {
        let Some(value) = headers.get(header::AUTHORIZATION) else {
            return Ok(None);
        };
        let value = value
            .to_str()
            .map_err(|_| AuthRejection("Malformed Authorization header".into()))?;
        let token = value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthRejection("Expected a Bearer token".into()))?;

        self.tokens
            .get(token)
            .map(|user_id| {
                Some(Identity {
                    user_id: user_id.clone(),
                })
            })
            .ok_or_else(|| AuthRejection("Invalid or expired token".into()))
    }
}
