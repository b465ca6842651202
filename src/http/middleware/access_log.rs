//! Access log middleware.
//! Emits one structured record per HTTP request.

use std::time::Instant;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Request},
    middleware::Next,
    response::Response,
};

use crate::net::PeerAddr;
use crate::observability::metrics;

pub async fn access_log(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let ip = req
        .extensions()
        .get::<ConnectInfo<PeerAddr>>()
        .map(|ConnectInfo(PeerAddr(addr))| addr.ip().to_string())
        .unwrap_or_default();
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let response = next.run(req).await;

    let status = response.status().as_u16();
    metrics::record_http_request(method.as_str(), status, start);
    tracing::info!(
        %path,
        method = %method,
        %ip,
        status,
        duration_ms = start.elapsed().as_millis() as u64,
        %user_agent,
        "HTTP request"
    );

    response
}
