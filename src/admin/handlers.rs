use axum::{extract::State, Json};
use serde::Serialize;

use crate::config::{Environment, RouteRateLimit};
use crate::health::ServiceHealth;
use crate::http::server::AppState;
use crate::resilience::BreakerSnapshot;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub environment: Environment,
    pub uptime_secs: u64,
    pub services: usize,
    pub routes: usize,
}

#[derive(Serialize)]
pub struct RouteView {
    pub pattern: String,
    pub service: String,
    /// `None` means every method.
    pub methods: Option<Vec<String>>,
    pub requires_auth: bool,
    pub rate_limit: Option<RouteRateLimit>,
    pub service_enabled: bool,
}

#[derive(Serialize)]
pub struct RateLimitSummary {
    pub enabled: bool,
    pub tracked_keys: usize,
    pub window_ms: u64,
    pub anonymous_ip_limit: u32,
    pub authenticated_ip_limit: u32,
    pub user_limit: u32,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        environment: state.config.environment,
        uptime_secs: state.started_at.elapsed().as_secs(),
        services: state.dispatcher.services().len(),
        routes: state.dispatcher.routes().len(),
    })
}

pub async fn get_routes(State(state): State<AppState>) -> Json<Vec<RouteView>> {
    let services = state.dispatcher.services();
    let routes = state
        .dispatcher
        .routes()
        .routes()
        .iter()
        .map(|route| RouteView {
            pattern: route.pattern.clone(),
            service: route.service.clone(),
            methods: route
                .methods
                .methods()
                .map(|m| m.iter().map(ToString::to_string).collect()),
            requires_auth: route.requires_auth,
            rate_limit: route.rate_limit,
            service_enabled: services.get(&route.service).is_some_and(|s| s.enabled),
        })
        .collect();
    Json(routes)
}

pub async fn get_circuits(State(state): State<AppState>) -> Json<Vec<BreakerSnapshot>> {
    Json(state.dispatcher.executor().breakers().snapshots())
}

pub async fn get_rate_limits(State(state): State<AppState>) -> Json<RateLimitSummary> {
    let config = &state.config.rate_limit;
    Json(RateLimitSummary {
        enabled: config.enabled,
        tracked_keys: state.dispatcher.limiter().len(),
        window_ms: config.window_ms,
        anonymous_ip_limit: config.anonymous_ip_limit,
        authenticated_ip_limit: config.authenticated_ip_limit,
        user_limit: config.user_limit,
    })
}

pub async fn get_health(State(state): State<AppState>) -> Json<Vec<ServiceHealth>> {
    Json(state.health.snapshot())
}
