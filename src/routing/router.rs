//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes in configuration order
//! - Look up the first route matching a path and method
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) ordered scan; first structural, method-compatible match wins
//! - No backtracking across ties: definitions are ordered most-specific-first

use axum::http::Method;

use crate::config::{RouteConfig, RouteRateLimit};
use crate::routing::matcher::{MethodFilter, Params, PatternError, RoutePattern};
use crate::routing::rewrite::PathRewrite;

/// Error raised while compiling the route table.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("route '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: PatternError,
    },
    #[error("route '{pattern}': invalid method '{method}'")]
    Method { pattern: String, method: String },
}

/// A compiled route definition.
#[derive(Debug, Clone)]
pub struct Route {
    /// Pattern as written in configuration.
    pub pattern: String,
    pub compiled: RoutePattern,
    pub service: String,
    pub methods: MethodFilter,
    pub rewrite: PathRewrite,
    /// Anonymous callers are rejected with 401.
    pub requires_auth: bool,
    pub rate_limit: Option<RouteRateLimit>,
}

impl Route {
    pub fn from_config(config: RouteConfig) -> Result<Self, RouteError> {
        let compiled = RoutePattern::parse(&config.pattern).map_err(|source| RouteError::Pattern {
            pattern: config.pattern.clone(),
            source,
        })?;

        let methods = match config.methods {
            None => MethodFilter::any(),
            Some(names) => {
                let mut methods = Vec::with_capacity(names.len());
                for name in names {
                    let method = Method::from_bytes(name.to_ascii_uppercase().as_bytes())
                        .map_err(|_| RouteError::Method {
                            pattern: config.pattern.clone(),
                            method: name.clone(),
                        })?;
                    methods.push(method);
                }
                MethodFilter::only(methods)
            }
        };

        Ok(Self {
            rewrite: PathRewrite::from_parts(config.strip_prefix, config.rewrite),
            pattern: config.pattern,
            compiled,
            service: config.service,
            methods,
            requires_auth: config.requires_auth,
            rate_limit: config.rate_limit,
        })
    }

    /// Structural and method match.
    pub fn matches(&self, path: &str, method: &Method) -> bool {
        self.methods.allows(method) && self.compiled.matches(path)
    }

    pub fn extract_params(&self, path: &str) -> Params {
        self.compiled.extract_params(path)
    }

    /// Downstream path for a path this route matched.
    pub fn rewrite_path(&self, path: &str, params: &Params) -> String {
        self.rewrite.apply(path, &self.compiled, params)
    }
}

/// Ordered, immutable route table.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        let table = Self { routes };
        table.warn_shadowed();
        table
    }

    pub fn from_config(configs: Vec<RouteConfig>) -> Result<Self, RouteError> {
        let routes = configs
            .into_iter()
            .map(Route::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(routes))
    }

    /// First route whose pattern and method set accept the request.
    pub fn find(&self, path: &str, method: &Method) -> Option<&Route> {
        self.routes.iter().find(|route| route.matches(path, method))
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Pairs of `(unreachable, covering)` routes: the later route can never
    /// match because an earlier one accepts all of its paths and methods.
    pub fn shadowed(&self) -> Vec<(&Route, &Route)> {
        self.routes
            .iter()
            .enumerate()
            .filter_map(|(i, later)| {
                self.routes[..i]
                    .iter()
                    .find(|earlier| {
                        earlier.compiled.covers(&later.compiled)
                            && later.methods.is_subset_of(&earlier.methods)
                    })
                    .map(|earlier| (later, earlier))
            })
            .collect()
    }

    fn warn_shadowed(&self) {
        for (later, earlier) in self.shadowed() {
            tracing::warn!(
                route = %later.pattern,
                shadowed_by = %earlier.pattern,
                "Route can never match; an earlier route covers it"
            );
        }
    }
}
