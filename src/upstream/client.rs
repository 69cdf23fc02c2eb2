//! HTTP client used to reach downstream services.

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

/// Transport-level failure of a single downstream call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// TCP connect failed or was refused.
    #[error("connect failed: {0}")]
    Connect(String),
    /// Per-call deadline elapsed.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// Anything else (reset mid-response, protocol error).
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Connect and timeout failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Connect(_) | TransportError::Timeout(_))
    }
}

/// Performs one downstream HTTP call.
#[async_trait]
pub trait DownstreamClient: Send + Sync {
    async fn send(&self, request: Request<Body>) -> Result<Response<Body>, TransportError>;
}

/// hyper-util legacy client with a pooled HTTP connector.
#[derive(Clone)]
pub struct HyperClient {
    inner: Client<HttpConnector, Body>,
}

impl HyperClient {
    pub fn new(connect_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);

        let inner = Client::builder(TokioExecutor::new()).build(connector);
        Self { inner }
    }
}

#[async_trait]
impl DownstreamClient for HyperClient {
    async fn send(&self, request: Request<Body>) -> Result<Response<Body>, TransportError> {
        match self.inner.request(request).await {
            Ok(response) => Ok(response.map(Body::new)),
            Err(e) if e.is_connect() => Err(TransportError::Connect(e.to_string())),
            Err(e) => Err(TransportError::Other(e.to_string())),
        }
    }
}
