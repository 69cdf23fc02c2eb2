//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router: `/health` liveness plus a catch-all dispatcher
//! - Wire up middleware (request ID, tracing)
//! - Start background tasks (rate-limit sweeper, health monitor, admin API)
//! - Serve until the shutdown broadcast fires, then drain

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::admin;
use crate::config::GatewayConfig;
use crate::health::{HealthMonitor, HealthTable};
use crate::http::dispatch::Dispatcher;
use crate::http::request;
use crate::lifecycle::{build_state, Shutdown, StartupError};
use crate::security::RateLimitSweeper;
use crate::upstream::{DownstreamClient, HyperClient};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub client: Arc<dyn DownstreamClient>,
    pub health: Arc<HealthTable>,
    pub config: Arc<GatewayConfig>,
    pub started_at: Instant,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Build the server with the pooled hyper client.
    pub fn new(config: GatewayConfig) -> Result<Self, StartupError> {
        let client = HyperClient::new(Duration::from_millis(config.timeouts.connect_ms));
        Self::with_client(config, Arc::new(client))
    }

    /// Build the server around a caller-provided downstream client.
    pub fn with_client(
        config: GatewayConfig,
        client: Arc<dyn DownstreamClient>,
    ) -> Result<Self, StartupError> {
        let state = build_state(&config, client)?;
        let router = Self::build_router(state.clone());
        Ok(Self { router, state })
    }

    /// Build the Axum router with all middleware layers. The overall request
    /// timeout lives in the retry executor.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/health", get(liveness))
            .fallback(dispatch_handler)
            .with_state(state)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(request::make_span))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the server on `listener` until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let config = self.state.config.clone();
        tracing::info!(address = %addr, "HTTP server starting");

        if config.rate_limit.enabled {
            let sweeper = RateLimitSweeper::new(
                self.state.dispatcher.limiter().clone(),
                Duration::from_secs(config.rate_limit.sweep_interval_secs),
            );
            tokio::spawn(sweeper.run(shutdown.subscribe()));
        }

        if config.health_check.enabled {
            let monitor = HealthMonitor::new(
                self.state.dispatcher.services().clone(),
                self.state.client.clone(),
                self.state.health.clone(),
                Duration::from_secs(config.health_check.interval_secs),
            );
            tokio::spawn(monitor.run(shutdown.subscribe()));
        }

        if config.admin.enabled {
            let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
            tokio::spawn(admin::serve(admin_listener, self.state.clone(), shutdown.clone()));
        }

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let mut stop = shutdown.subscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn liveness() -> impl IntoResponse {
    Json(serde_json::json!({ "success": true, "data": { "status": "ok" } }))
}

/// Catch-all handler; every non-liveness request goes through the dispatcher.
async fn dispatch_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let peer = request::peer_addr(&request);
    state.dispatcher.dispatch(request, peer).await
}
