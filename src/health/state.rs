//! Per-service probe outcomes.

use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::Serialize;

/// Latest known health of one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceHealth {
    pub service: String,
    pub healthy: bool,
    /// HTTP status of the last probe, if it got an answer.
    pub last_status: Option<u16>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    /// Unix seconds.
    pub checked_at: u64,
}

/// Concurrent status table keyed by service name.
#[derive(Debug, Default)]
pub struct HealthTable {
    entries: DashMap<String, ServiceHealth>,
}

impl HealthTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a probe result. Returns true when health flipped.
    pub fn record(&self, service: &str, status: Option<u16>, error: Option<String>) -> bool {
        let healthy = error.is_none() && status.is_some_and(|s| (200..300).contains(&s));
        let checked_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        let mut entry = self
            .entries
            .entry(service.to_string())
            .or_insert_with(|| ServiceHealth {
                service: service.to_string(),
                healthy,
                last_status: None,
                last_error: None,
                consecutive_failures: 0,
                checked_at,
            });

        let changed = entry.healthy != healthy;
        entry.healthy = healthy;
        entry.last_status = status;
        entry.last_error = error;
        entry.checked_at = checked_at;
        entry.consecutive_failures = if healthy {
            0
        } else {
            entry.consecutive_failures.saturating_add(1)
        };
        changed
    }

    pub fn get(&self, service: &str) -> Option<ServiceHealth> {
        self.entries.get(service).map(|e| e.clone())
    }

    /// Snapshot sorted by service name.
    pub fn snapshot(&self) -> Vec<ServiceHealth> {
        let mut all: Vec<_> = self.entries.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.service.cmp(&b.service));
        all
    }
}
