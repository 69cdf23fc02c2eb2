//! Service registry: logical name → endpoint.

use std::collections::HashMap;
use std::time::Duration;

use axum::http::Uri;
use url::{Position, Url};

use crate::config::ServiceConfig;

/// Error raised while building the registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("service '{name}': invalid base_url: {source}")]
    InvalidBaseUrl {
        name: String,
        #[source]
        source: url::ParseError,
    },
    #[error("duplicate service '{0}'")]
    Duplicate(String),
}

/// A single downstream service.
#[derive(Debug, Clone)]
pub struct ServiceEndpoint {
    pub name: String,
    pub base_url: Url,
    /// Per-attempt timeout.
    pub timeout: Duration,
    pub health_path: String,
    pub enabled: bool,
}

impl ServiceEndpoint {
    pub fn from_config(config: &ServiceConfig) -> Result<Self, RegistryError> {
        let base_url =
            Url::parse(&config.base_url).map_err(|source| RegistryError::InvalidBaseUrl {
                name: config.name.clone(),
                source,
            })?;
        Ok(Self {
            name: config.name.clone(),
            base_url,
            timeout: Duration::from_millis(config.timeout_ms),
            health_path: config.health_path.clone(),
            enabled: config.enabled,
        })
    }

    /// Absolute downstream URI for `path` (already rewritten) plus the
    /// original query. A path on the base URL is kept as a prefix.
    pub fn uri_for(&self, path: &str, query: Option<&str>) -> Result<Uri, axum::http::uri::InvalidUri> {
        let origin = &self.base_url[..Position::BeforePath];
        let base_path = self.base_url.path().trim_end_matches('/');
        let uri = match query {
            Some(q) if !q.is_empty() => format!("{origin}{base_path}{path}?{q}"),
            _ => format!("{origin}{base_path}{path}"),
        };
        uri.parse()
    }

    pub fn health_uri(&self) -> Result<Uri, axum::http::uri::InvalidUri> {
        self.uri_for(&self.health_path, None)
    }
}

/// Fixed-size map of every configured service.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: HashMap<String, ServiceEndpoint>,
}

impl ServiceRegistry {
    pub fn from_config(configs: &[ServiceConfig]) -> Result<Self, RegistryError> {
        let mut services = HashMap::with_capacity(configs.len());
        for config in configs {
            let endpoint = ServiceEndpoint::from_config(config)?;
            if services.insert(endpoint.name.clone(), endpoint).is_some() {
                return Err(RegistryError::Duplicate(config.name.clone()));
            }
        }
        Ok(Self { services })
    }

    pub fn get(&self, name: &str) -> Option<&ServiceEndpoint> {
        self.services.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceEndpoint> {
        self.services.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
