//! Service definitions: typed unary handlers plus their HTTP bindings.
//!
//! ```ignore
//! ServiceDefinition::new("ping.v1.PingService")
//!     .unary("Ping", |req: tonic::Request<PingRequest>| async move {
//!         Ok(tonic::Response::new(pong(req.into_inner())))
//!     })
//!     .http(HttpRule::post("/v1/ping").body("*"));
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::http::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tonic::{Request, Response, Status};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Type-erased unary handler over JSON messages.
pub type UnaryHandler =
    Arc<dyn Fn(Request<Value>) -> BoxFuture<Result<Response<Value>, Status>> + Send + Sync>;

/// Which part of the HTTP request becomes the RPC message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyRule {
    /// No body; the message comes from path and query only.
    None,
    /// The whole body is the message.
    All,
    /// The body fills one field of the message.
    Field(String),
}

/// An HTTP binding for an RPC method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRule {
    pub method: Method,
    pub template: String,
    pub body: BodyRule,
}

impl HttpRule {
    pub fn new(method: Method, template: impl Into<String>) -> Self {
        Self {
            method,
            template: template.into(),
            body: BodyRule::None,
        }
    }

    pub fn get(template: impl Into<String>) -> Self {
        Self::new(Method::GET, template)
    }

    pub fn post(template: impl Into<String>) -> Self {
        Self::new(Method::POST, template)
    }

    pub fn put(template: impl Into<String>) -> Self {
        Self::new(Method::PUT, template)
    }

    pub fn patch(template: impl Into<String>) -> Self {
        Self::new(Method::PATCH, template)
    }

    pub fn delete(template: impl Into<String>) -> Self {
        Self::new(Method::DELETE, template)
    }

    /// `"*"` maps the whole body; any other name maps the body into that field.
    pub fn body(mut self, body: &str) -> Self {
        self.body = match body {
            "" => BodyRule::None,
            "*" => BodyRule::All,
            field => BodyRule::Field(field.to_string()),
        };
        self
    }
}

/// One method of a service.
#[derive(Clone)]
pub struct MethodDefinition {
    pub(crate) name: String,
    pub(crate) path: String,
    pub(crate) handler: UnaryHandler,
    pub(crate) rules: Vec<HttpRule>,
}

impl MethodDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full method path, `/<service>/<method>`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn rules(&self) -> &[HttpRule] {
        &self.rules
    }
}

/// A named set of unary methods.
#[derive(Clone)]
pub struct ServiceDefinition {
    name: String,
    methods: Vec<MethodDefinition>,
}

impl ServiceDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn methods(&self) -> &[MethodDefinition] {
        &self.methods
    }

    /// Add a unary method with typed request and response messages.
    ///
    /// A request that does not decode as `Req` fails with `InvalidArgument`.
    pub fn unary<Req, Resp, F, Fut>(mut self, method: &str, handler: F) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(Request<Req>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response<Resp>, Status>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let erased: UnaryHandler = Arc::new(
            move |request: Request<Value>| -> BoxFuture<Result<Response<Value>, Status>> {
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    let (metadata, extensions, message) = request.into_parts();
                    let typed: Req = serde_json::from_value(message).map_err(|e| {
                        Status::invalid_argument(format!("invalid request message: {e}"))
                    })?;

                    let response = (*handler)(Request::from_parts(metadata, extensions, typed)).await?;

                    let (metadata, message, extensions) = response.into_parts();
                    let message = serde_json::to_value(&message).map_err(|e| {
                        Status::internal(format!("failed to encode response: {e}"))
                    })?;
                    Ok(Response::from_parts(metadata, message, extensions))
                })
            },
        );

        self.methods.push(MethodDefinition {
            name: method.to_string(),
            path: format!("/{}/{}", self.name, method),
            handler: erased,
            rules: Vec::new(),
        });
        self
    }

    /// Bind the most recently added method to an HTTP route.
    pub fn http(mut self, rule: HttpRule) -> Self {
        match self.methods.last_mut() {
            Some(method) => method.rules.push(rule),
            None => tracing::warn!(
                service = %self.name,
                template = %rule.template,
                "HTTP rule declared before any method, ignoring"
            ),
        }
        self
    }
}
