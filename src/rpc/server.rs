//! RPC server on tonic.
//!
//! # Responsibilities
//! - Keep the registry of unary methods, keyed by `/<service>/<method>`
//! - Serve connections handed over by the demux's RPC listener
//! - Log every call with its outcome (the logging interceptor)
//!
//! # Design Decisions
//! - A panicking handler becomes an `Internal` status; the connection survives
//! - Unknown methods answer `Unimplemented` from the router fallback
//! - On root cancellation tonic drains in-flight calls and closes connections

use std::collections::HashMap;
use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::Request as HttpRequest;
use axum::http::Uri;
use axum::response::Response as HttpResponse;
use axum::routing::post;
use futures_util::{stream, FutureExt};
use serde_json::Value;
use tonic::server::{Grpc, UnaryService};
use tonic::service::Routes;
use tonic::transport::Server;
use tonic::{Code, Request, Response, Status};

use crate::config::RpcConfig;
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::net::DerivedListener;
use crate::observability::metrics;
use crate::rpc::codec::JsonCodec;
use crate::rpc::service::{BoxFuture, ServiceDefinition, UnaryHandler};
use crate::rpc::status::StatusExt;

/// Registry of unary methods plus the serving loop.
#[derive(Clone)]
pub struct RpcServer {
    methods: HashMap<String, UnaryHandler>,
    config: RpcConfig,
}

impl RpcServer {
    pub fn new(config: &RpcConfig) -> Self {
        Self {
            methods: HashMap::new(),
            config: config.clone(),
        }
    }

    /// Register every method of a service. A method registered twice is replaced.
    pub fn register(&mut self, service: &ServiceDefinition) {
        for method in service.methods() {
            if self
                .methods
                .insert(method.path.clone(), method.handler.clone())
                .is_some()
            {
                tracing::warn!(method = %method.path, "RPC method registered twice, replacing");
            }
            tracing::debug!(method = %method.path, "RPC method registered");
        }
    }

    pub fn has_method(&self, path: &str) -> bool {
        self.methods.contains_key(path)
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    /// Invoke a method in-process, with panic recovery and call logging.
    pub async fn dispatch(
        &self,
        path: &str,
        request: Request<Value>,
    ) -> Result<Response<Value>, Status> {
        let Some(handler) = self.methods.get(path).cloned() else {
            tracing::debug!(method = path, "Unknown RPC method");
            metrics::record_rpc_call(path, Code::Unimplemented as i32);
            return Err(Status::unimplemented(format!("unknown method {path}")));
        };

        let start = Instant::now();
        let result = match AssertUnwindSafe(async move { handler(request).await })
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                tracing::error!(method = path, panic = %panic_message(&*panic), "RPC handler panicked");
                Err(Status::internal("internal error"))
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => {
                metrics::record_rpc_call(path, Code::Ok as i32);
                tracing::debug!(method = path, duration_ms, "RPC call finished");
            }
            Err(status) => {
                metrics::record_rpc_call(path, status.raw_code());
                tracing::info!(
                    method = path,
                    code = status.raw_code(),
                    message = status.message(),
                    duration_ms,
                    "RPC call failed"
                );
            }
        }
        result
    }

    /// One POST route per registered method; everything else is `Unimplemented`.
    pub fn routes(self) -> axum::Router {
        let server = Arc::new(self);
        let mut router = axum::Router::new();

        for path in server.methods.keys() {
            let call = MethodCall {
                server: Arc::clone(&server),
                path: Arc::from(path.as_str()),
            };
            router = router.route(
                path,
                post(move |request: HttpRequest| {
                    let call = call.clone();
                    async move { call.serve(request).await }
                }),
            );
        }

        router.fallback(unknown_method)
    }

    /// Serve routed connections until root cancellation.
    pub async fn serve(self, listener: DerivedListener, mut shutdown: ShutdownSignal) {
        tracing::info!(methods = self.method_count(), "RPC server starting");

        let mut builder = Server::builder();
        if let Some(limit) = self.config.max_concurrent_streams {
            builder = builder.max_concurrent_streams(Some(limit));
        }
        if let Some(secs) = self.config.keepalive_interval_secs {
            builder = builder.http2_keepalive_interval(Some(Duration::from_secs(secs)));
        }

        let incoming = Box::pin(stream::unfold(listener, |mut listener| async move {
            listener
                .next()
                .await
                .map(|conn| (Ok::<_, io::Error>(conn), listener))
        }));

        let result = builder
            .add_routes(Routes::from(self.routes()))
            .serve_with_incoming_shutdown(incoming, async move { shutdown.recv().await })
            .await;

        match result {
            Ok(()) => tracing::info!("RPC server stopped"),
            Err(e) => tracing::error!(error = %e, "RPC server failed"),
        }
    }
}

#[derive(Clone)]
struct MethodCall {
    server: Arc<RpcServer>,
    path: Arc<str>,
}

impl MethodCall {
    async fn serve(self, request: HttpRequest) -> HttpResponse {
        let max = self.server.config.max_message_bytes;
        let mut grpc = Grpc::new(JsonCodec).apply_max_message_size_config(Some(max), Some(max));
        grpc.unary(self, request).await.map(Body::new)
    }
}

impl UnaryService<Value> for MethodCall {
    type Response = Value;
    type Future = BoxFuture<Result<Response<Value>, Status>>;

    fn call(&mut self, request: Request<Value>) -> Self::Future {
        let server = Arc::clone(&self.server);
        let path = Arc::clone(&self.path);
        Box::pin(async move { server.dispatch(&path, request).await })
    }
}

async fn unknown_method(uri: Uri) -> HttpResponse {
    tracing::debug!(method = uri.path(), "Unknown RPC method");
    metrics::record_rpc_call(uri.path(), Code::Unimplemented as i32);
    Status::unimplemented(format!("unknown method {}", uri.path())).into_http()
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
