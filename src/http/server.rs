//! HTTP server setup.
//!
//! # Responsibilities
//! - Wrap the assembled router in the standard middleware stack
//! - Serve it on the plain-HTTP side of the demultiplexed socket
//! - Drain in-flight requests on shutdown, bounded by a deadline

use std::time::Duration;

use axum::{http::Method, middleware, Router};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::HttpConfig;
use crate::http::middleware::access_log;
use crate::net::{DerivedListener, PeerAddr};

#[derive(Debug, Error)]
pub enum HttpShutdownError {
    #[error("in-flight requests still running at the deadline")]
    Timeout,

    #[error("server task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The primary HTTP server, not yet running.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(router: Router, config: &HttpConfig) -> Self {
        Self {
            router: Self::apply_layers(router, config),
        }
    }

    /// Outermost layer last.
    #[allow(deprecated)]
    fn apply_layers(router: Router, config: &HttpConfig) -> Router {
        let router = router
            .layer(middleware::from_fn(access_log))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.request_timeout_secs,
            )))
            .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

        if config.cors {
            router.layer(
                CorsLayer::new()
                    .allow_origin(AllowOrigin::mirror_request())
                    .allow_credentials(true)
                    .allow_methods([
                        Method::GET,
                        Method::POST,
                        Method::PUT,
                        Method::DELETE,
                        Method::OPTIONS,
                    ]),
            )
        } else {
            router
        }
    }

    /// Start serving on the plain-HTTP listener.
    pub fn spawn(self, listener: DerivedListener) -> HttpServerHandle {
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let app = self
            .router
            .into_make_service_with_connect_info::<PeerAddr>();

        let task = tokio::spawn(async move {
            tracing::info!("HTTP server starting");
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = stop_rx.await;
                })
                .await;
            match &result {
                Ok(()) => tracing::info!("HTTP server stopped"),
                Err(e) => tracing::error!(error = %e, "HTTP server failed"),
            }
            result
        });

        HttpServerHandle { stop_tx, task }
    }
}

/// A running HTTP server.
pub struct HttpServerHandle {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

impl HttpServerHandle {
    /// Stop accepting and wait for in-flight requests until `deadline`.
    ///
    /// Connections still open at the deadline are dropped.
    pub async fn shutdown_until(self, deadline: Instant) -> Result<(), HttpShutdownError> {
        let Self { stop_tx, mut task } = self;
        let _ = stop_tx.send(());

        match tokio::time::timeout_at(deadline, &mut task).await {
            Ok(Ok(result)) => result.map_err(HttpShutdownError::from),
            Ok(Err(join)) => Err(HttpShutdownError::Task(join.to_string())),
            Err(_) => {
                task.abort();
                Err(HttpShutdownError::Timeout)
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
