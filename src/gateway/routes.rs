//! HTTP route templates for RPC methods.
//!
//! # Responsibilities
//! - Parse templates like `/v1/users/{id}/books/{book_id}`
//! - Match a request path and capture its parameters
//! - Distinguish "no such path" from "path exists, wrong method"
//!
//! # Design Decisions
//! - No regex: segment-by-segment comparison
//! - Deterministic: the route with the most literal segments wins,
//!   ties go to the earliest registration
//! - Explicit NotFound / MethodNotAllowed rather than a silent default

use axum::http::Method;
use thiserror::Error;

use crate::rpc::service::{BodyRule, HttpRule};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template '{0}' must start with '/'")]
    NoLeadingSlash(String),
    #[error("template '{0}' has an empty segment")]
    EmptySegment(String),
    #[error("template '{template}' has an invalid parameter '{segment}'")]
    InvalidParam { template: String, segment: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A parsed route template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        let Some(rest) = template.strip_prefix('/') else {
            return Err(TemplateError::NoLeadingSlash(template.to_string()));
        };

        let mut segments = Vec::new();
        if !rest.is_empty() {
            for part in rest.split('/') {
                if part.is_empty() {
                    return Err(TemplateError::EmptySegment(template.to_string()));
                }
                segments.push(parse_segment(template, part)?);
            }
        }

        Ok(Self {
            raw: template.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    fn literal_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count()
    }

    /// Captured parameters if `path` matches.
    pub fn matches(&self, path: &str) -> Option<Vec<(String, String)>> {
        let rest = path.strip_prefix('/')?;
        let parts: Vec<&str> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split('/').collect()
        };
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = Vec::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(lit) if lit == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(_) if part.is_empty() => return None,
                Segment::Param(name) => params.push((name.clone(), percent_decode(part))),
            }
        }
        Some(params)
    }
}

fn parse_segment(template: &str, part: &str) -> Result<Segment, TemplateError> {
    let invalid = || TemplateError::InvalidParam {
        template: template.to_string(),
        segment: part.to_string(),
    };

    if let Some(inner) = part.strip_prefix('{') {
        let name = inner.strip_suffix('}').ok_or_else(invalid)?;
        let valid = !name.is_empty()
            && name
                .split('.')
                .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        if !valid {
            return Err(invalid());
        }
        return Ok(Segment::Param(name.to_string()));
    }
    if part.contains('{') || part.contains('}') {
        return Err(invalid());
    }
    Ok(Segment::Literal(part.to_string()))
}

/// Decode `%XX` escapes. Malformed escapes are kept as-is; invalid UTF-8 is
/// replaced lossily.
pub fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex(bytes[i + 1]), hex(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// One HTTP binding of an RPC method.
#[derive(Debug, Clone)]
pub struct Route {
    pub method: Method,
    pub template: PathTemplate,
    pub rpc_method: String,
    pub body: BodyRule,
}

/// Outcome of a lookup.
#[derive(Debug)]
pub enum RouteMatch<'a> {
    Found {
        route: &'a Route,
        params: Vec<(String, String)>,
    },
    MethodNotAllowed,
    NotFound,
}

/// All HTTP bindings known to the gateway.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    routes: Vec<Route>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, rpc_method: &str, rule: &HttpRule) -> Result<(), TemplateError> {
        let template = PathTemplate::parse(&rule.template)?;
        tracing::debug!(
            method = %rule.method,
            template = %rule.template,
            rpc_method,
            "Gateway route registered"
        );
        self.routes.push(Route {
            method: rule.method.clone(),
            template,
            rpc_method: rpc_method.to_string(),
            body: rule.body.clone(),
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn lookup(&self, method: &Method, path: &str) -> RouteMatch<'_> {
        let mut best: Option<(&Route, Vec<(String, String)>)> = None;
        let mut path_known = false;

        for route in &self.routes {
            let Some(params) = route.template.matches(path) else {
                continue;
            };
            path_known = true;
            if route.method != *method {
                continue;
            }
            let better = best
                .as_ref()
                .map_or(true, |(b, _)| route.template.literal_count() > b.template.literal_count());
            if better {
                best = Some((route, params));
            }
        }

        match best {
            Some((route, params)) => RouteMatch::Found { route, params },
            None if path_known => RouteMatch::MethodNotAllowed,
            None => RouteMatch::NotFound,
        }
    }
}
