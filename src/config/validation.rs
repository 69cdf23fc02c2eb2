//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference existing services)
//! - Validate value ranges (limits > 0, delays ordered, per-call timeouts
//!   shorter than the overall request timeout)
//! - Check rewrite templates only reference parameters their route binds
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;

use axum::http::Method;
use url::Url;

use crate::config::schema::GatewayConfig;
use crate::routing::matcher::{split_segments, RoutePattern};

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted location of the offending field, e.g. `routes[2].service`.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut service_names = HashSet::new();
    for (i, service) in config.services.iter().enumerate() {
        if !service_names.insert(service.name.as_str()) {
            errors.push(ValidationError::new(
                format!("services[{i}].name"),
                format!("duplicate service '{}'", service.name),
            ));
        }
        match Url::parse(&service.base_url) {
            Ok(url) if url.scheme() == "http" && url.host().is_some() => {}
            Ok(_) => errors.push(ValidationError::new(
                format!("services[{i}].base_url"),
                "only absolute http:// URLs are supported",
            )),
            Err(e) => errors.push(ValidationError::new(
                format!("services[{i}].base_url"),
                e.to_string(),
            )),
        }
        if service.timeout_ms == 0 {
            errors.push(ValidationError::new(
                format!("services[{i}].timeout_ms"),
                "must be greater than 0",
            ));
        } else if config.timeouts.request_secs > 0
            && service.timeout_ms >= config.timeouts.request_secs.saturating_mul(1000)
        {
            errors.push(ValidationError::new(
                format!("services[{i}].timeout_ms"),
                "must be shorter than timeouts.request_secs",
            ));
        }
    }

    for (i, route) in config.routes.iter().enumerate() {
        let pattern = match RoutePattern::parse(&route.pattern) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                errors.push(ValidationError::new(format!("routes[{i}].pattern"), e.to_string()));
                None
            }
        };
        if !service_names.contains(route.service.as_str()) {
            errors.push(ValidationError::new(
                format!("routes[{i}].service"),
                format!("unknown service '{}'", route.service),
            ));
        }
        if let Some(methods) = &route.methods {
            if methods.is_empty() {
                errors.push(ValidationError::new(
                    format!("routes[{i}].methods"),
                    "empty list never matches; omit it to allow every method",
                ));
            }
            for method in methods {
                if Method::from_bytes(method.to_ascii_uppercase().as_bytes()).is_err() {
                    errors.push(ValidationError::new(
                        format!("routes[{i}].methods"),
                        format!("invalid method '{method}'"),
                    ));
                }
            }
        }
        if route.rewrite.is_some() && route.strip_prefix.is_some() {
            errors.push(ValidationError::new(
                format!("routes[{i}]"),
                "rewrite and strip_prefix are mutually exclusive",
            ));
        }
        if let Some(rewrite) = &route.rewrite {
            if !rewrite.starts_with('/') {
                errors.push(ValidationError::new(
                    format!("routes[{i}].rewrite"),
                    "must start with '/'",
                ));
            }
            if let Some(pattern) = &pattern {
                for name in split_segments(rewrite).filter_map(|seg| seg.strip_prefix(':')) {
                    if !pattern.param_names().any(|p| p == name) {
                        errors.push(ValidationError::new(
                            format!("routes[{i}].rewrite"),
                            format!("':{name}' is not a parameter of '{}'", route.pattern),
                        ));
                    }
                }
            }
        }
        if let Some(limit) = &route.rate_limit {
            if limit.limit == 0 || limit.window_ms == 0 {
                errors.push(ValidationError::new(
                    format!("routes[{i}].rate_limit"),
                    "limit and window_ms must be greater than 0",
                ));
            }
        }
    }

    let rl = &config.rate_limit;
    if rl.enabled {
        if rl.window_ms == 0 {
            errors.push(ValidationError::new("rate_limit.window_ms", "must be greater than 0"));
        }
        if rl.anonymous_ip_limit == 0 || rl.authenticated_ip_limit == 0 || rl.user_limit == 0 {
            errors.push(ValidationError::new("rate_limit", "limits must be greater than 0"));
        }
        if rl.sweep_interval_secs == 0 {
            errors.push(ValidationError::new(
                "rate_limit.sweep_interval_secs",
                "must be greater than 0",
            ));
        }
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }
    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be at least 1"));
    }
    if config.retries.initial_delay_ms > config.retries.max_delay_ms {
        errors.push(ValidationError::new(
            "retries.initial_delay_ms",
            "must not exceed max_delay_ms",
        ));
    }
    if config.circuit_breaker.failure_threshold == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.failure_threshold",
            "must be at least 1",
        ));
    }
    if config.health_check.enabled && config.health_check.interval_secs == 0 {
        errors.push(ValidationError::new(
            "health_check.interval_secs",
            "must be greater than 0",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
