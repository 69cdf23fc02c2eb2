//! Operator API on its own listener.
//!
//! Read-only views over the live dispatch state, guarded by a bearer API key.

pub mod auth;
pub mod handlers;

use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;
use crate::lifecycle::Shutdown;

pub fn setup_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/routes", get(get_routes))
        .route("/admin/circuits", get(get_circuits))
        .route("/admin/rate-limits", get(get_rate_limits))
        .route("/admin/health", get(get_health))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

/// Serve the admin API until `shutdown` fires.
pub async fn serve(listener: TcpListener, state: AppState, shutdown: Shutdown) {
    let addr = listener.local_addr().ok();
    if state.config.admin.api_key == crate::config::AdminConfig::default().api_key {
        tracing::warn!("Admin API is using the default api_key");
    }
    tracing::info!(address = ?addr, "Admin API starting");

    let mut stop = shutdown.subscribe();
    let result = axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = stop.recv().await;
        })
        .await;

    if let Err(e) = result {
        tracing::error!(error = %e, "Admin API failed");
    }
}
