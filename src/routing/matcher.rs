//! Route pattern matching logic.
//!
//! # Responsibilities
//! - Compile route patterns into segments
//! - Match request paths against compiled patterns
//! - Extract `:name` parameters for a known-matching path
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - Empty path segments are ignored (`/a//b/` is `/a/b`)
//! - A non-wildcard pattern only matches paths with the same segment count
//! - A trailing `/*` matches by literal prefix, on segment boundaries
//! - No regex, no backtracking: O(segments) per candidate

use std::collections::BTreeMap;

use axum::http::Method;

/// Parameters bound by `:name` segments.
pub type Params = BTreeMap<String, String>;

/// Error raised for malformed route patterns.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("pattern must start with '/'")]
    MissingLeadingSlash,
    #[error("'*' is only allowed as a trailing '/*' segment")]
    MisplacedWildcard,
    #[error("parameter segment without a name")]
    EmptyParamName,
    #[error("duplicate parameter ':{0}'")]
    DuplicateParam(String),
    #[error("wildcard patterns match by literal prefix and cannot contain parameters")]
    ParamInWildcard,
}

/// A single segment of a non-wildcard pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(String),
}

/// A compiled route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutePattern {
    /// Literal and `:name` segments; segment counts must be equal.
    Segments(Vec<Segment>),
    /// Trailing wildcard: literal prefix segments, any remainder.
    Prefix(Vec<String>),
}

/// Split a path into its non-empty segments.
pub fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

impl RoutePattern {
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        if !pattern.starts_with('/') {
            return Err(PatternError::MissingLeadingSlash);
        }

        let (body, wildcard) = match pattern.strip_suffix("/*") {
            Some(prefix) => (prefix, true),
            None => (pattern, false),
        };

        let mut segments = Vec::new();
        for raw in split_segments(body) {
            if raw.contains('*') {
                return Err(PatternError::MisplacedWildcard);
            }
            match raw.strip_prefix(':') {
                Some(_) if wildcard => return Err(PatternError::ParamInWildcard),
                Some("") => return Err(PatternError::EmptyParamName),
                Some(name) => {
                    if segments
                        .iter()
                        .any(|s| matches!(s, Segment::Param(n) if n == name))
                    {
                        return Err(PatternError::DuplicateParam(name.to_string()));
                    }
                    segments.push(Segment::Param(name.to_string()));
                }
                None => segments.push(Segment::Literal(raw.to_string())),
            }
        }

        if wildcard {
            let prefix = segments
                .into_iter()
                .map(|s| match s {
                    Segment::Literal(l) => l,
                    Segment::Param(p) => p,
                })
                .collect();
            Ok(RoutePattern::Prefix(prefix))
        } else {
            Ok(RoutePattern::Segments(segments))
        }
    }

    /// Structural match of `path` against this pattern.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            RoutePattern::Prefix(prefix) => {
                let mut parts = split_segments(path);
                prefix.iter().all(|p| parts.next() == Some(p.as_str()))
            }
            RoutePattern::Segments(segments) => {
                let mut parts = split_segments(path);
                for segment in segments {
                    let Some(part) = parts.next() else {
                        return false;
                    };
                    if let Segment::Literal(lit) = segment {
                        if lit != part {
                            return false;
                        }
                    }
                }
                parts.next().is_none()
            }
        }
    }

    /// Rebuild the `:name → value` map for a path this pattern matched.
    ///
    /// Only meaningful after [`RoutePattern::matches`] returned true; used for
    /// logging and rewriting, never for authorization decisions.
    pub fn extract_params(&self, path: &str) -> Params {
        let mut params = Params::new();
        if let RoutePattern::Segments(segments) = self {
            for (segment, part) in segments.iter().zip(split_segments(path)) {
                if let Segment::Param(name) = segment {
                    params.insert(name.clone(), part.to_string());
                }
            }
        }
        params
    }

    /// The part of `path` covered by a trailing wildcard, without leading slash.
    pub fn wildcard_tail(&self, path: &str) -> Option<String> {
        match self {
            RoutePattern::Prefix(prefix) => Some(
                split_segments(path)
                    .skip(prefix.len())
                    .collect::<Vec<_>>()
                    .join("/"),
            ),
            RoutePattern::Segments(_) => None,
        }
    }

    /// Names bound by `:name` segments, in pattern order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        let segments: &[Segment] = match self {
            RoutePattern::Segments(segments) => segments,
            RoutePattern::Prefix(_) => &[],
        };
        segments.iter().filter_map(|segment| match segment {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, RoutePattern::Prefix(_))
    }

    /// Segment patterns equal up to parameter names.
    fn same_shape(&self, other: &RoutePattern) -> bool {
        match (self, other) {
            (RoutePattern::Segments(mine), RoutePattern::Segments(theirs)) => {
                mine.len() == theirs.len()
                    && mine.iter().zip(theirs).all(|pair| match pair {
                        (Segment::Literal(a), Segment::Literal(b)) => a == b,
                        (Segment::Param(_), Segment::Param(_)) => true,
                        _ => false,
                    })
            }
            _ => false,
        }
    }

    /// True if every path matched by `other` is also matched by `self`.
    pub fn covers(&self, other: &RoutePattern) -> bool {
        let RoutePattern::Prefix(prefix) = self else {
            return self.same_shape(other);
        };
        let other_literals: Vec<Option<&str>> = match other {
            RoutePattern::Prefix(p) => p.iter().map(|s| Some(s.as_str())).collect(),
            RoutePattern::Segments(s) => s
                .iter()
                .map(|seg| match seg {
                    Segment::Literal(l) => Some(l.as_str()),
                    Segment::Param(_) => None,
                })
                .collect(),
        };
        other_literals.len() >= prefix.len()
            && prefix
                .iter()
                .zip(&other_literals)
                .all(|(p, o)| *o == Some(p.as_str()))
    }
}

/// Allowed-method filter for a route. `None` accepts every method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodFilter(Option<Vec<Method>>);

impl MethodFilter {
    pub fn any() -> Self {
        Self(None)
    }

    pub fn only(methods: Vec<Method>) -> Self {
        Self(Some(methods))
    }

    pub fn allows(&self, method: &Method) -> bool {
        self.0.as_ref().map_or(true, |m| m.contains(method))
    }

    /// True if every method this filter allows is also allowed by `other`.
    pub fn is_subset_of(&self, other: &MethodFilter) -> bool {
        match (&self.0, &other.0) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(mine), Some(theirs)) => mine.iter().all(|m| theirs.contains(m)),
        }
    }

    pub fn methods(&self) -> Option<&[Method]> {
        self.0.as_deref()
    }
}
