//! Mounts the gateway under a path prefix of the primary HTTP router.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::Uri;
use axum::response::Response;
use axum::routing::any;
use axum::Router;
use tonic::Status;

use crate::gateway::envelope::error_response;
use crate::gateway::mux::GatewayMux;

#[derive(Clone)]
struct BridgeState {
    mux: Arc<GatewayMux>,
    prefix: Arc<str>,
}

/// Route every method on `<prefix>/**` to the gateway.
pub fn mount(router: Router, prefix: &str, mux: Arc<GatewayMux>) -> Router {
    let prefix = prefix.trim_end_matches('/');
    let state = BridgeState {
        mux,
        prefix: Arc::from(prefix),
    };
    let bridge = Router::new()
        .route(&format!("{prefix}/{{*path}}"), any(bridge))
        .with_state(state);

    tracing::info!(prefix, "Gateway bridge mounted");
    router.merge(bridge)
}

async fn bridge(State(state): State<BridgeState>, request: Request) -> Response {
    let (mut parts, body) = request.into_parts();
    match strip_prefix(&parts.uri, &state.prefix) {
        Some(uri) => {
            parts.uri = uri;
            state.mux.serve(Request::from_parts(parts, body)).await
        }
        None => error_response(&Status::not_found("Not Found")),
    }
}

/// Remove `prefix` from the path, keeping the query string.
pub fn strip_prefix(uri: &Uri, prefix: &str) -> Option<Uri> {
    let rest = uri.path().strip_prefix(prefix)?;
    let path = if rest.starts_with('/') {
        rest.to_string()
    } else if rest.is_empty() {
        "/".to_string()
    } else {
        // "/grpcx/..." does not belong to "/grpc".
        return None;
    };

    let path_and_query = match uri.query() {
        Some(q) => format!("{path}?{q}"),
        None => path,
    };
    Uri::try_from(path_and_query).ok()
}
