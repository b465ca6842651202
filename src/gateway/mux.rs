//! The gateway proxy: HTTP request in, loopback RPC call, JSON envelope out.
//!
//! # Request Translation
//! ```text
//! body (per binding)  ─┐
//! query parameters    ─┼─▶ RPC message (JSON object)
//! path parameters     ─┘   later sources overwrite earlier ones
//! whitelisted headers ───▶ RPC metadata
//! ```

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request};
use axum::response::Response;
use serde_json::{Map, Value};
use tonic::Status;

use crate::config::GatewayConfig;
use crate::gateway::envelope::{error_response, success_response};
use crate::gateway::headers::HeaderMatcher;
use crate::gateway::routes::{percent_decode, RouteMatch, RoutingTable, TemplateError};
use crate::observability::metrics;
use crate::rpc::client::RpcClient;
use crate::rpc::service::{BodyRule, ServiceDefinition};
use crate::rpc::status::StatusExt;

pub const HEALTH_CHECK_METHOD: &str = "/grpc.health.v1.Health/Check";

pub struct GatewayMux {
    table: RoutingTable,
    client: RpcClient,
    headers: HeaderMatcher,
    healthz: bool,
    max_body_bytes: usize,
}

impl GatewayMux {
    pub fn new(client: RpcClient, config: &GatewayConfig, max_body_bytes: usize) -> Self {
        Self {
            table: RoutingTable::new(),
            client,
            headers: HeaderMatcher::from_config(config),
            healthz: config.healthz,
            max_body_bytes,
        }
    }

    /// Register the HTTP bindings of every method in a service.
    pub fn add_service(&mut self, service: &ServiceDefinition) -> Result<(), TemplateError> {
        for method in service.methods() {
            for rule in method.rules() {
                self.table.add(method.path(), rule)?;
            }
        }
        Ok(())
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.table
    }

    /// Serve a request whose path has already had the bridge prefix removed.
    pub async fn serve(&self, request: Request<Body>) -> Response {
        if self.healthz && request.uri().path() == "/healthz" && request.method() == Method::GET {
            return self.health().await;
        }

        let response = match self.table.lookup(request.method(), request.uri().path()) {
            RouteMatch::NotFound => error_response(&Status::not_found("Not Found")),
            RouteMatch::MethodNotAllowed => {
                error_response(&Status::unimplemented("Method Not Allowed"))
            }
            RouteMatch::Found { route, params } => {
                let rpc_method = route.rpc_method.clone();
                let body_rule = route.body.clone();
                self.forward(&rpc_method, &body_rule, params, request).await
            }
        };

        metrics::record_gateway_call(response.status().as_u16());
        response
    }

    async fn forward(
        &self,
        rpc_method: &str,
        body_rule: &BodyRule,
        params: Vec<(String, String)>,
        request: Request<Body>,
    ) -> Response {
        let query = request.uri().query().map(str::to_string);
        let metadata = self.headers.incoming(request.headers());

        let body = match axum::body::to_bytes(request.into_body(), self.max_body_bytes).await {
            Ok(body) => body,
            Err(e) => {
                return error_response(&Status::invalid_argument(format!(
                    "failed to read request body: {e}"
                )))
            }
        };

        let message = match build_message(body_rule, &body, &params, query.as_deref()) {
            Ok(message) => message,
            Err(status) => return error_response(&status),
        };

        match self.client.unary(rpc_method, &metadata, &message).await {
            Ok(reply) => {
                let outgoing = self.headers.outgoing(&reply.metadata().clone().into_headers());
                let mut response = success_response(reply.get_ref());
                response.headers_mut().extend(outgoing);
                response
            }
            Err(status) => {
                tracing::debug!(rpc_method, code = status.raw_code(), "Bridged call failed");
                error_response(&status)
            }
        }
    }

    async fn health(&self) -> Response {
        let request = serde_json::json!({ "service": "" });
        match self
            .client
            .unary(HEALTH_CHECK_METHOD, &HeaderMap::new(), &request)
            .await
        {
            Ok(reply) if reply.get_ref().get("status") == Some(&Value::from("SERVING")) => {
                success_response(reply.get_ref())
            }
            Ok(_) => error_response(&Status::unavailable("service not serving")),
            Err(status) => error_response(&status),
        }
    }
}

/// Assemble the RPC message from body, query and path parameters.
pub fn build_message(
    body_rule: &BodyRule,
    body: &[u8],
    params: &[(String, String)],
    query: Option<&str>,
) -> Result<Value, Status> {
    let mut message = Map::new();

    match body_rule {
        BodyRule::All if !body.is_empty() => match parse_body(body)? {
            Value::Object(object) => message = object,
            _ => {
                return Err(Status::invalid_argument(
                    "request body must be a JSON object",
                ))
            }
        },
        BodyRule::Field(field) if !body.is_empty() => {
            set_field(&mut message, field, parse_body(body)?);
        }
        _ => {}
    }

    // A whole-body binding takes every field from the body.
    if *body_rule != BodyRule::All {
        if let Some(query) = query {
            for (key, value) in parse_query(query) {
                append_field(&mut message, &key, Value::String(value));
            }
        }
    }

    for (name, value) in params {
        set_field(&mut message, name, Value::String(value.clone()));
    }

    Ok(Value::Object(message))
}

fn parse_body(body: &[u8]) -> Result<Value, Status> {
    serde_json::from_slice(body)
        .map_err(|e| Status::invalid_argument(format!("request body is not valid JSON: {e}")))
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(k), decode_component(v))
        })
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

fn decode_component(s: &str) -> String {
    percent_decode(&s.replace('+', " "))
}

/// Walk a dotted path, creating intermediate objects. `None` if a
/// non-object value is in the way.
fn parent_of<'a>(message: &'a mut Map<String, Value>, path: &'a str) -> Option<(&'a mut Map<String, Value>, &'a str)> {
    let mut parts: Vec<&str> = path.split('.').collect();
    let last = parts.pop()?;
    let mut current = message;
    for part in parts {
        let entry = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = entry.as_object_mut()?;
    }
    Some((current, last))
}

fn set_field(message: &mut Map<String, Value>, path: &str, value: Value) {
    if let Some((parent, key)) = parent_of(message, path) {
        parent.insert(key.to_string(), value);
    }
}

/// Like [`set_field`], but a repeated key turns into an array.
fn append_field(message: &mut Map<String, Value>, path: &str, value: Value) {
    let Some((parent, key)) = parent_of(message, path) else {
        return;
    };
    match parent.get_mut(key) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            parent.insert(key.to_string(), value);
        }
    }
}
