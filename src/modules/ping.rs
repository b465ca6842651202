//! Liveness checks over every transport the kernel offers.
//!
//! - `GET /ping/v1` and `GET /ping/v1/err` on the primary router
//! - `ping.v1.PingService/Ping` (gateway `POST /v1/ping`)
//! - `ping.v1.PingService/PingErr` (gateway `GET /v1/ping/err`)
//! - `GET /ping/v1/stream`, a short event stream

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::extract::{Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::config::KernelConfig;
use crate::gateway::error_response;
use crate::kernel::{ConfigHook, Module, ModuleError, RuntimeContext};
use crate::lifecycle::ShutdownSignal;
use crate::rpc::{status_from_code, HttpRule, ServiceDefinition, Status};
use crate::stream::{self, SessionOptions};

pub const SERVICE: &str = "ping.v1.PingService";

/// Application code returned by `PingErr` when none is requested.
pub const PING_ERR_CODE: i32 = 10001;

const MAX_STREAM_EVENTS: u32 = 1000;

pub struct PingModule {
    debug: Arc<AtomicBool>,
}

impl PingModule {
    pub fn new() -> Self {
        Self {
            debug: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Default for PingModule {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for PingModule {
    fn name(&self) -> &str {
        "ping"
    }

    fn init(&mut self, ctx: &mut RuntimeContext) -> Result<(), ModuleError> {
        self.debug.store(ctx.config().is_debug(), Ordering::Relaxed);
        Ok(())
    }

    fn load(&mut self, ctx: &mut RuntimeContext) -> Result<(), ModuleError> {
        let state = PingState {
            config: ctx.live_config(),
            root: ctx.shutdown_signal(),
            debug: self.debug.clone(),
        };
        ctx.merge(
            Router::new()
                .route("/ping/v1", get(ping))
                .route("/ping/v1/err", get(ping_err))
                .route("/ping/v1/stream", get(ping_stream))
                .with_state(state),
        );
        ctx.register_service(ping_service())?;
        Ok(())
    }

    fn on_config_change(&self) -> Option<ConfigHook> {
        let debug = self.debug.clone();
        Some(Arc::new(move |config: &KernelConfig| {
            debug.store(config.is_debug(), Ordering::Relaxed);
            Ok(())
        }))
    }
}

#[derive(Clone)]
struct PingState {
    config: Arc<ArcSwap<KernelConfig>>,
    root: ShutdownSignal,
    debug: Arc<AtomicBool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pong {
    pub message: String,
    pub debug: bool,
}

async fn ping(State(state): State<PingState>) -> Json<Pong> {
    Json(Pong {
        message: "pong".into(),
        debug: state.debug.load(Ordering::Relaxed),
    })
}

async fn ping_err() -> Response {
    error_response(&status_from_code(PING_ERR_CODE, "ping failed"))
}

#[derive(Debug, Deserialize)]
struct StreamQuery {
    #[serde(default = "default_count")]
    count: u32,
    #[serde(default = "default_interval")]
    interval_ms: u64,
}

fn default_count() -> u32 {
    3
}

fn default_interval() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tick {
    pub seq: u32,
    pub message: String,
}

async fn ping_stream(State(state): State<PingState>, Query(query): Query<StreamQuery>) -> Response {
    let options =
        SessionOptions::from_config(&state.config.load().streaming).with_cancel(state.root.clone());
    let (publisher, response) = stream::open::<Tick>(options);

    let count = query.count.min(MAX_STREAM_EVENTS);
    let interval = Duration::from_millis(query.interval_ms.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        for seq in 0..count {
            ticker.tick().await;
            let tick = Tick {
                seq,
                message: "pong".into(),
            };
            if publisher.send(tick).await.is_err() {
                tracing::debug!(seq, "Ping stream ended by client");
                return;
            }
        }
    });

    response
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PingRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PingErrRequest {
    /// Status code to fail with; query values arrive as strings.
    pub code: String,
}

/// The RPC half of the module.
pub fn ping_service() -> ServiceDefinition {
    ServiceDefinition::new(SERVICE)
        .unary("Ping", |req: tonic::Request<PingRequest>| async move {
            let req = req.into_inner();
            let message = if req.message.is_empty() {
                "pong".to_string()
            } else {
                req.message
            };
            Ok::<_, Status>(tonic::Response::new(PingResponse { message }))
        })
        .http(HttpRule::post("/v1/ping").body("*"))
        .unary("PingErr", |req: tonic::Request<PingErrRequest>| async move {
            let code = req
                .into_inner()
                .code
                .parse::<i32>()
                .ok()
                .filter(|code| *code != 0)
                .unwrap_or(PING_ERR_CODE);
            Err::<tonic::Response<PingResponse>, _>(status_from_code(code, "ping failed"))
        })
        .http(HttpRule::get("/v1/ping/err"))
}
