//! Startup orchestration.
//!
//! # Responsibilities
//! - Build every shared subsystem from a validated configuration
//! - Fail fast on anything the validator could not catch
//!
//! # Design Decisions
//! - Subsystems initialize in dependency order, not concurrently
//! - The downstream client is injected so tests can script it

use std::sync::Arc;
use std::time::Instant;

use crate::config::GatewayConfig;
use crate::health::HealthTable;
use crate::http::dispatch::Dispatcher;
use crate::http::server::AppState;
use crate::resilience::{CircuitBreakerRegistry, RetryExecutor, RetryPolicy};
use crate::routing::{RouteError, RouteTable};
use crate::security::{AnonymousVerifier, IdentityVerifier, RateLimiter, StaticTokenVerifier};
use crate::upstream::{DownstreamClient, RegistryError, ServiceRegistry};

/// Fatal error while bringing the gateway up.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("service registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("route table: {0}")]
    Routes(#[from] RouteError),

    #[error("route '{pattern}' targets unknown service '{service}'")]
    UnknownService { pattern: String, service: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wire the dispatch core and its shared state.
pub fn build_state(
    config: &GatewayConfig,
    client: Arc<dyn DownstreamClient>,
) -> Result<AppState, StartupError> {
    let services = Arc::new(ServiceRegistry::from_config(&config.services)?);
    let routes = Arc::new(RouteTable::from_config(config.routes.clone())?);

    if let Some(route) = routes.routes().iter().find(|r| services.get(&r.service).is_none()) {
        return Err(StartupError::UnknownService {
            pattern: route.pattern.clone(),
            service: route.service.clone(),
        });
    }

    let breakers = Arc::new(CircuitBreakerRegistry::new(
        services.names(),
        &config.circuit_breaker,
    ));
    let policy = RetryPolicy::new(&config.retries, &config.timeouts);
    for service in services.iter() {
        let worst_case = policy.worst_case(service.timeout);
        if worst_case > policy.budget {
            tracing::warn!(
                service = %service.name,
                worst_case_ms = worst_case.as_millis() as u64,
                budget_ms = policy.budget.as_millis() as u64,
                "Retries can outlast the request timeout; late attempts will be cut short"
            );
        }
    }
    let executor = RetryExecutor::new(client.clone(), breakers, policy);

    let verifier: Arc<dyn IdentityVerifier> = if config.auth.tokens.is_empty() {
        Arc::new(AnonymousVerifier)
    } else {
        Arc::new(StaticTokenVerifier::new(config.auth.tokens.clone()))
    };

    let dispatcher = Dispatcher::new(
        routes,
        services,
        Arc::new(RateLimiter::new()),
        config.rate_limit.clone(),
        verifier,
        executor,
        config.security.max_body_size,
        config.environment,
    );

    tracing::info!(
        services = dispatcher.services().len(),
        routes = dispatcher.routes().len(),
        environment = ?config.environment,
        "Dispatch core initialized"
    );

    Ok(AppState {
        dispatcher: Arc::new(dispatcher),
        client,
        health: Arc::new(HealthTable::new()),
        config: Arc::new(config.clone()),
        started_at: Instant::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use std::time::Duration;

    use crate::upstream::HyperClient;

    #[tokio::test]
    async fn builds_from_minimal_config() {
        let config = parse_config(
            r#"
            [[services]]
            name = "auth"
            base_url = "http://127.0.0.1:3001"

            [[routes]]
            pattern = "/v1/auth/*"
            service = "auth"
            "#,
        )
        .unwrap();
        let state = build_state(&config, Arc::new(HyperClient::new(Duration::from_secs(1)))).unwrap();
        assert_eq!(state.dispatcher.routes().len(), 1);
        assert!(state.dispatcher.executor().breakers().get("auth").is_some());
    }

    #[tokio::test]
    async fn unvalidated_dangling_service_is_fatal() {
        let mut config = GatewayConfig::default();
        config.routes.push(crate::config::RouteConfig {
            pattern: "/v1/x".into(),
            service: "ghost".into(),
            methods: None,
            strip_prefix: None,
            rewrite: None,
            requires_auth: false,
            rate_limit: None,
        });
        let err = build_state(&config, Arc::new(HyperClient::new(Duration::from_secs(1)))).err().unwrap();
        assert!(matches!(err, StartupError::UnknownService { .. }));
    }
}
