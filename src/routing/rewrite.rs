//! Path transformation applied after a route matched.

use crate::routing::matcher::{split_segments, Params, RoutePattern};

/// How the matched path is turned into the downstream path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathRewrite {
    /// Forward the inbound path unchanged.
    Keep,
    /// Remove a literal leading prefix.
    StripPrefix(String),
    /// Build the path from a template; `:name` takes a bound parameter and a
    /// trailing `*` takes the wildcard remainder.
    Template(String),
}

impl PathRewrite {
    pub fn from_parts(strip_prefix: Option<String>, rewrite: Option<String>) -> Self {
        match (rewrite, strip_prefix) {
            (Some(template), _) => PathRewrite::Template(template),
            (None, Some(prefix)) => PathRewrite::StripPrefix(prefix),
            (None, None) => PathRewrite::Keep,
        }
    }

    pub fn apply(&self, path: &str, pattern: &RoutePattern, params: &Params) -> String {
        match self {
            PathRewrite::Keep => path.to_string(),
            PathRewrite::StripPrefix(prefix) => strip_prefix(path, prefix),
            PathRewrite::Template(template) => {
                let tail = pattern.wildcard_tail(path).unwrap_or_default();
                render_template(template, params, &tail)
            }
        }
    }
}

fn strip_prefix(path: &str, prefix: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    match path.strip_prefix(prefix) {
        Some("") => "/".to_string(),
        Some(rest) if rest.starts_with('/') => rest.to_string(),
        // Not on a segment boundary, leave the path alone.
        _ => path.to_string(),
    }
}

fn render_template(template: &str, params: &Params, tail: &str) -> String {
    let mut out = String::with_capacity(template.len() + tail.len());
    for segment in split_segments(template) {
        let value = if segment == "*" {
            if tail.is_empty() {
                continue;
            }
            tail
        } else if let Some(value) = segment.strip_prefix(':').and_then(|name| params.get(name)) {
            value.as_str()
        } else {
            segment
        };
        out.push('/');
        out.push_str(value);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}
