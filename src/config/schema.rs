//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the edge gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Deployment environment. Controls how much error detail leaks to clients.
    pub environment: Environment,

    /// Downstream services reachable through the gateway.
    pub services: Vec<ServiceConfig>,

    /// Ordered route definitions. First structural match wins.
    pub routes: Vec<RouteConfig>,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Circuit breaker configuration (shared by every service).
    pub circuit_breaker: CircuitBreakerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request hardening.
    pub security: SecurityConfig,

    /// Bundled identity verifier settings.
    pub auth: AuthConfig,

    /// Active health probing of downstream services.
    pub health_check: HealthCheckConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl Environment {
    pub fn is_development(self) -> bool {
        self == Environment::Development
    }
}

/// A downstream service entry in the service registry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Logical service name referenced by routes.
    pub name: String,

    /// Base URL (e.g., "http://127.0.0.1:3001"). A path component is kept as a prefix.
    pub base_url: String,

    /// Per-attempt timeout in milliseconds.
    #[serde(default = "default_service_timeout_ms")]
    pub timeout_ms: u64,

    /// Path probed by the active health monitor.
    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Feature flag. Disabled services answer 404 without a network call.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_service_timeout_ms() -> u64 {
    5_000
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_enabled() -> bool {
    true
}

/// Route definition mapping a path pattern to a downstream service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Path pattern: literal segments, `:name` params or a trailing `/*`.
    pub pattern: String,

    /// Logical name of the target service.
    pub service: String,

    /// Allowed methods. Absent means every method matches.
    #[serde(default)]
    pub methods: Option<Vec<String>>,

    /// Literal prefix removed from the path before forwarding.
    #[serde(default)]
    pub strip_prefix: Option<String>,

    /// Target path template (`:name` and trailing `*` are substituted).
    #[serde(default)]
    pub rewrite: Option<String>,

    /// Reject anonymous callers with 401.
    #[serde(default)]
    pub requires_auth: bool,

    /// Route specific limit, applied before the IP and user limits.
    #[serde(default)]
    pub rate_limit: Option<RouteRateLimit>,
}

/// Per-route rate limit override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RouteRateLimit {
    pub limit: u32,
    pub window_ms: u64,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Window length for the IP and user scoped limits.
    pub window_ms: u64,

    /// Requests per window per IP for anonymous callers.
    pub anonymous_ip_limit: u32,

    /// Requests per window per IP for authenticated callers.
    pub authenticated_ip_limit: u32,

    /// Requests per window per authenticated user.
    pub user_limit: u32,

    /// Interval of the expired-entry sweep.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_ms: 60_000,
            anonymous_ip_limit: 100,
            authenticated_ip_limit: 300,
            user_limit: 600,
            sweep_interval_secs: 60,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per forwarded call, including the first one.
    pub max_attempts: u32,

    /// Delay before the second attempt in milliseconds.
    pub initial_delay_ms: u64,

    /// Upper bound of the exponential delay in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failed calls that open the circuit.
    pub failure_threshold: u32,

    /// Cooldown before a probe call is admitted, in milliseconds.
    pub reset_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 30_000,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// TCP connect timeout towards downstream services in milliseconds.
    pub connect_ms: u64,

    /// Overall inbound request timeout in seconds (covers every retry).
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 2_000,
            request_secs: 30,
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum buffered request body in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Static bearer tokens accepted by the bundled identity verifier.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// token -> user id
    pub tokens: HashMap<String, String>,
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active health checks.
    pub enabled: bool,

    /// Health check interval in seconds.
    pub interval_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
