//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every enabled service's health path
//! - Record outcomes in the status table and the health gauge

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request};
use tokio::sync::broadcast;
use tokio::time;

use crate::health::state::HealthTable;
use crate::observability::metrics;
use crate::resilience::timeouts::call_with_timeout;
use crate::upstream::{DownstreamClient, ServiceEndpoint, ServiceRegistry};

pub struct HealthMonitor {
    services: Arc<ServiceRegistry>,
    client: Arc<dyn DownstreamClient>,
    table: Arc<HealthTable>,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(
        services: Arc<ServiceRegistry>,
        client: Arc<dyn DownstreamClient>,
        table: Arc<HealthTable>,
        interval: Duration,
    ) -> Self {
        Self {
            services,
            client,
            table,
            interval,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            services = self.services.len(),
            "Health monitor starting"
        );

        let mut ticker = time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every enabled service once.
    pub async fn check_all(&self) {
        for service in self.services.iter().filter(|s| s.enabled) {
            self.check(service).await;
        }
    }

    async fn check(&self, service: &ServiceEndpoint) {
        let uri = match service.health_uri() {
            Ok(uri) => uri,
            Err(e) => {
                tracing::error!(service = %service.name, error = %e, "Invalid health check URI");
                return;
            }
        };

        let request = match Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header(header::USER_AGENT, "edge-gateway-health-check")
            .body(Body::empty())
        {
            Ok(request) => request,
            Err(e) => {
                tracing::error!(service = %service.name, error = %e, "Failed to build health check request");
                return;
            }
        };

        let (status, error) =
            match call_with_timeout(service.timeout, self.client.send(request)).await {
                Ok(response) => (Some(response.status().as_u16()), None),
                Err(e) => (None, Some(e.to_string())),
            };

        let changed = self.table.record(&service.name, status, error.clone());
        let healthy = self
            .table
            .get(&service.name)
            .is_some_and(|h| h.healthy);

        if changed && healthy {
            tracing::info!(service = %service.name, "Service is healthy again");
        } else if !healthy {
            tracing::warn!(
                service = %service.name,
                status = ?status,
                error = ?error,
                "Health check failed"
            );
        }

        metrics::record_service_health(&service.name, healthy);
    }
}
