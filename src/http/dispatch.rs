//! Request dispatch.
//!
//! # Responsibilities
//! - Resolve identity and match the route
//! - Enforce route, IP and user rate limits before any downstream I/O
//! - Build the outbound request (rewritten path, curated headers, buffered body)
//! - Run it through the retry executor and relay the answer
//!
//! # Design Decisions
//! - Limits are checked right after matching so a route-specific limit can
//!   apply; IP and user limits apply even when nothing matched
//! - The most restrictive applied limit drives the `X-Rate-Limit-*` headers
//! - The handler future owns every downstream call, so a client disconnect
//!   cancels in-flight attempts and retry sleeps

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{header, Request, Response};

use crate::config::{Environment, RateLimitConfig};
use crate::error::{GatewayError, Result};
use crate::http::request;
use crate::http::response::{apply_rate_limit_headers, error_response};
use crate::observability::metrics;
use crate::resilience::{OutboundRequest, RetryExecutor};
use crate::routing::RouteTable;
use crate::security::headers;
use crate::security::{Identity, IdentityVerifier, LimitKey, RateLimitDecision, RateLimiter};
use crate::upstream::ServiceRegistry;

/// Everything one request needs, shared across all requests.
pub struct Dispatcher {
    routes: Arc<RouteTable>,
    services: Arc<ServiceRegistry>,
    limiter: Arc<RateLimiter>,
    limits: RateLimitConfig,
    verifier: Arc<dyn IdentityVerifier>,
    executor: RetryExecutor,
    max_body_size: usize,
    environment: Environment,
}

/// Limits applied so far; keeps the tightest for response headers.
#[derive(Debug, Default)]
struct AppliedLimits {
    tightest: Option<RateLimitDecision>,
}

impl AppliedLimits {
    fn record(&mut self, decision: RateLimitDecision) {
        let tighter = match &self.tightest {
            Some(current) => decision.remaining < current.remaining,
            None => true,
        };
        if tighter {
            self.tightest = Some(decision);
        }
    }
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        routes: Arc<RouteTable>,
        services: Arc<ServiceRegistry>,
        limiter: Arc<RateLimiter>,
        limits: RateLimitConfig,
        verifier: Arc<dyn IdentityVerifier>,
        executor: RetryExecutor,
        max_body_size: usize,
        environment: Environment,
    ) -> Self {
        Self {
            routes,
            services,
            limiter,
            limits,
            verifier,
            executor,
            max_body_size,
            environment,
        }
    }

    /// Handle one inbound request end to end. Never fails: errors are
    /// rendered as envelopes.
    pub async fn dispatch(&self, mut request: Request<Body>, peer: Option<SocketAddr>) -> Response<Body> {
        let start = Instant::now();
        request::ensure_request_id(request.headers_mut());
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let request_id = request::request_id(request.headers()).to_string();

        let mut applied = AppliedLimits::default();
        let mut service = String::from("none");

        let mut response = match self
            .forward(request, peer, &mut applied, &mut service)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                match &err {
                    GatewayError::Internal(message) => tracing::error!(
                        request_id = %request_id,
                        method = %method,
                        path = %path,
                        error = %message,
                        "Dispatch failed"
                    ),
                    GatewayError::RateLimited(limited) => {
                        applied.tightest = Some(limited.decision);
                        tracing::info!(
                            request_id = %request_id,
                            path = %path,
                            retry_after = limited.retry_after_secs,
                            "Rate limited"
                        );
                    }
                    other => tracing::info!(
                        request_id = %request_id,
                        method = %method,
                        path = %path,
                        status = other.status().as_u16(),
                        error = %other,
                        "Request failed"
                    ),
                }
                error_response(&err, self.environment.is_development())
            }
        };

        if let Some(decision) = &applied.tightest {
            apply_rate_limit_headers(response.headers_mut(), decision);
        }

        let status = response.status().as_u16();
        tracing::debug!(
            request_id = %request_id,
            method = %method,
            path = %path,
            service = %service,
            status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        );
        metrics::record_request(method.as_str(), status, &service, start);
        response
    }

    async fn forward(
        &self,
        request: Request<Body>,
        peer: Option<SocketAddr>,
        applied: &mut AppliedLimits,
        service_label: &mut String,
    ) -> Result<Response<Body>> {
        let (parts, body) = request.into_parts();
        let path = parts.uri.path();

        let identity = self.verifier.verify(&parts.headers);
        let caller = identity.as_ref().ok().and_then(Option::as_ref);
        let client_ip = headers::client_ip(&parts.headers, peer);
        let route = self.routes.find(path, &parts.method);

        if self.limits.enabled {
            let window = Duration::from_millis(self.limits.window_ms);

            if let Some(limit) = route.and_then(|r| r.rate_limit.as_ref().map(|l| (r, l))) {
                let (route, limit) = limit;
                let identifier = caller.map_or(client_ip.as_str(), |c| c.user_id.as_str());
                self.check_limit(
                    &LimitKey::endpoint(identifier, &route.pattern),
                    limit.limit,
                    Duration::from_millis(limit.window_ms),
                    applied,
                )?;
            }

            let ip_limit = if caller.is_some() {
                self.limits.authenticated_ip_limit
            } else {
                self.limits.anonymous_ip_limit
            };
            self.check_limit(&LimitKey::ip(&client_ip), ip_limit, window, applied)?;

            if let Some(Identity { user_id }) = caller {
                self.check_limit(&LimitKey::user(user_id), self.limits.user_limit, window, applied)?;
            }
        }

        let route = route.ok_or_else(|| GatewayError::RouteNotFound {
            method: parts.method.to_string(),
            path: path.to_string(),
        })?;

        let identity = identity.map_err(|rejection| GatewayError::Unauthorized(rejection.0))?;
        if route.requires_auth && identity.is_none() {
            return Err(GatewayError::Unauthorized("Authentication required".into()));
        }

        let service = self.services.get(&route.service).ok_or_else(|| {
            GatewayError::Internal(format!(
                "route '{}' targets unknown service '{}'",
                route.pattern, route.service
            ))
        })?;
        *service_label = service.name.clone();
        if !service.enabled {
            return Err(GatewayError::ServiceDisabled(service.name.clone()));
        }

        let declared_len = parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared_len.is_some_and(|len| len > self.max_body_size) {
            return Err(GatewayError::PayloadTooLarge {
                limit: self.max_body_size,
            });
        }
        let body = axum::body::to_bytes(body, self.max_body_size)
            .await
            .map_err(|e| {
                tracing::debug!(error = %e, "Failed to buffer request body");
                GatewayError::PayloadTooLarge {
                    limit: self.max_body_size,
                }
            })?;

        let params = route.extract_params(path);
        let downstream_path = route.rewrite_path(path, &params);
        let uri = service
            .uri_for(&downstream_path, parts.uri.query())
            .map_err(|e| GatewayError::BadRequest(format!("Invalid request path: {e}")))?;

        tracing::debug!(
            service = %service.name,
            route = %route.pattern,
            downstream = %uri,
            "Forwarding request"
        );

        let outbound = OutboundRequest {
            method: parts.method.clone(),
            uri,
            headers: headers::forward_headers(&parts.headers, identity.as_ref()),
            body,
        };

        let mut response = self.executor.execute(service, outbound).await?;
        headers::strip_hop_by_hop(response.headers_mut());
        Ok(response)
    }

    fn check_limit(
        &self,
        key: &LimitKey,
        limit: u32,
        window: Duration,
        applied: &mut AppliedLimits,
    ) -> Result<()> {
        match self.limiter.check_and_increment(key, limit, window) {
            Ok(decision) => {
                applied.record(decision);
                Ok(())
            }
            Err(limited) => {
                metrics::record_rate_limited(key.scope().as_str());
                Err(limited.into())
            }
        }
    }

    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn executor(&self) -> &RetryExecutor {
        &self.executor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use async_trait::async_trait;
    use axum::http::{HeaderMap, Method, StatusCode};
    use parking_lot::Mutex;

    use crate::config::{parse_config, GatewayConfig};
    use crate::resilience::{CircuitBreakerRegistry, RetryPolicy};
    use crate::security::headers::{X_RATE_LIMIT_LIMIT, X_RATE_LIMIT_REMAINING, X_USER_ID};
    use crate::security::StaticTokenVerifier;
    use crate::upstream::{DownstreamClient, TransportError};

    /// Records outbound requests and answers 200 with the request path.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(Method, String, HeaderMap)>>,
    }

    #[async_trait]
    impl DownstreamClient for Recorder {
        async fn send(&self, request: Request<Body>) -> std::result::Result<Response<Body>, TransportError> {
            let uri = request.uri().to_string();
            self.seen
                .lock()
                .push((request.method().clone(), uri.clone(), request.headers().clone()));
            Ok(Response::new(Body::from(uri)))
        }
    }

    const CONFIG: &str = r#"
        [[services]]
        name = "auth"
        base_url = "http://auth.internal:3001"

        [[services]]
        name = "feed"
        base_url = "http://feed.internal:4000"

        [[services]]
        name = "media"
        base_url = "http://media.internal:5000"
        enabled = false

        [[routes]]
        pattern = "/v1/auth/login"
        service = "auth"
        methods = ["POST"]
        rate_limit = { limit = 2, window_ms = 60000 }

        [[routes]]
        pattern = "/v1/feed/*"
        service = "feed"
        strip_prefix = "/v1"

        [[routes]]
        pattern = "/v1/me"
        service = "auth"
        requires_auth = true

        [[routes]]
        pattern = "/v1/media/*"
        service = "media"

        [auth.tokens]
        "tok-1" = "user-1"
    "#;

    fn dispatcher(config: &GatewayConfig, client: Arc<Recorder>) -> Dispatcher {
        let services = Arc::new(ServiceRegistry::from_config(&config.services).unwrap());
        let breakers = Arc::new(CircuitBreakerRegistry::new(
            services.names(),
            &config.circuit_breaker,
        ));
        Dispatcher::new(
            Arc::new(RouteTable::from_config(config.routes.clone()).unwrap()),
            services,
            Arc::new(RateLimiter::new()),
            config.rate_limit.clone(),
            Arc::new(StaticTokenVerifier::new(config.auth.tokens.clone())),
            RetryExecutor::new(
                client,
                breakers,
                RetryPolicy::new(&config.retries, &config.timeouts),
            ),
            config.security.max_body_size,
            config.environment,
        )
    }

    fn setup() -> (Dispatcher, Arc<Recorder>) {
        let config = parse_config(CONFIG).unwrap();
        let client = Arc::new(Recorder::default());
        (dispatcher(&config, client.clone()), client)
    }

    fn request(method: Method, uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn peer() -> Option<SocketAddr> {
        Some("203.0.113.9:51000".parse().unwrap())
    }

    async fn body_json(response: Response<Body>) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn forwards_with_rewrite_query_and_curated_headers() {
        let (dispatcher, client) = setup();
        let response = dispatcher
            .dispatch(
                request(
                    Method::GET,
                    "/v1/feed/posts/7?page=2",
                    &[
                        ("authorization", "Bearer tok-1"),
                        ("x-user-id", "spoofed"),
                        ("x-device-id", "dev-9"),
                        ("cookie", "secret=1"),
                    ],
                ),
                peer(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(X_RATE_LIMIT_LIMIT));

        let seen = client.seen.lock();
        let (method, uri, headers) = &seen[0];
        assert_eq!(*method, Method::GET);
        assert_eq!(uri, "http://feed.internal:4000/feed/posts/7?page=2");
        assert_eq!(headers[X_USER_ID], "user-1");
        assert_eq!(headers["x-device-id"], "dev-9");
        assert!(headers.contains_key("x-request-id"));
        assert!(!headers.contains_key(header::AUTHORIZATION));
        assert!(!headers.contains_key(header::COOKIE));
    }

    #[tokio::test]
    async fn unmatched_path_is_404_without_downstream_call() {
        let (dispatcher, client) = setup();
        let response = dispatcher
            .dispatch(request(Method::GET, "/v1/unknown", &[]), peer())
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"]["code"], "NOT_FOUND");
        assert!(client.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn method_mismatch_is_404() {
        let (dispatcher, _) = setup();
        let response = dispatcher
            .dispatch(request(Method::GET, "/v1/auth/login", &[]), peer())
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn route_limit_rejects_with_retry_after() {
        let (dispatcher, client) = setup();
        for _ in 0..2 {
            let response = dispatcher
                .dispatch(request(Method::POST, "/v1/auth/login", &[]), peer())
                .await;
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = dispatcher
            .dispatch(request(Method::POST, "/v1/auth/login", &[]), peer())
            .await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = response.headers()[header::RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!((59..=60).contains(&retry_after));
        assert_eq!(response.headers()[X_RATE_LIMIT_REMAINING], "0");
        assert_eq!(body_json(response).await["error"]["code"], "RATE_LIMITED");
        assert_eq!(client.seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn tightest_limit_drives_headers() {
        let (dispatcher, _) = setup();
        let response = dispatcher
            .dispatch(request(Method::POST, "/v1/auth/login", &[]), peer())
            .await;
        assert_eq!(response.headers()[X_RATE_LIMIT_LIMIT], "2");
        assert_eq!(response.headers()[X_RATE_LIMIT_REMAINING], "1");
    }

    #[tokio::test]
    async fn ip_limit_uses_forwarded_for_and_anonymous_ceiling() {
        let mut config = parse_config(CONFIG).unwrap();
        config.rate_limit.anonymous_ip_limit = 1;
        let dispatcher = dispatcher(&config, Arc::new(Recorder::default()));

        let xff = [("x-forwarded-for", "198.51.100.4, 10.0.0.1")];
        let first = dispatcher.dispatch(request(Method::GET, "/v1/feed/a", &xff), peer()).await;
        assert_eq!(first.status(), StatusCode::OK);
        let second = dispatcher.dispatch(request(Method::GET, "/v1/feed/a", &xff), peer()).await;
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

        // Different client IP, separate window.
        let other = dispatcher.dispatch(request(Method::GET, "/v1/feed/a", &[]), peer()).await;
        assert_eq!(other.status(), StatusCode::OK);

        // Authenticated callers get the higher ceiling.
        let auth = [("x-forwarded-for", "198.51.100.4"), ("authorization", "Bearer tok-1")];
        let third = dispatcher.dispatch(request(Method::GET, "/v1/feed/a", &auth), peer()).await;
        assert_eq!(third.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn auth_rules() {
        let (dispatcher, client) = setup();

        let anonymous = dispatcher.dispatch(request(Method::GET, "/v1/me", &[]), peer()).await;
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let bad = dispatcher
            .dispatch(request(Method::GET, "/v1/feed/a", &[("authorization", "Bearer nope")]), peer())
            .await;
        assert_eq!(bad.status(), StatusCode::UNAUTHORIZED);

        let ok = dispatcher
            .dispatch(request(Method::GET, "/v1/me", &[("authorization", "Bearer tok-1")]), peer())
            .await;
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(client.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn disabled_service_is_404_service_disabled() {
        let (dispatcher, client) = setup();
        let response = dispatcher
            .dispatch(request(Method::GET, "/v1/media/x.png", &[]), peer())
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"]["code"], "SERVICE_DISABLED");
        assert!(client.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn oversized_body_is_413() {
        let mut config = parse_config(CONFIG).unwrap();
        config.security.max_body_size = 8;
        let client = Arc::new(Recorder::default());
        let dispatcher = dispatcher(&config, client.clone());

        let request = Request::builder()
            .method(Method::POST)
            .uri("/v1/feed/posts")
            .body(Body::from("0123456789abcdef"))
            .unwrap();
        let response = dispatcher.dispatch(request, peer()).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(client.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn limits_disabled_skips_headers() {
        let mut config = parse_config(CONFIG).unwrap();
        config.rate_limit.enabled = false;
        config.auth.tokens = HashMap::new();
        let dispatcher = dispatcher(&config, Arc::new(Recorder::default()));
        let response = dispatcher.dispatch(request(Method::GET, "/v1/feed/a", &[]), peer()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key(X_RATE_LIMIT_LIMIT));
    }
}
