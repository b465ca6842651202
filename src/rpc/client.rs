//! Loopback RPC client.
//!
//! The gateway reaches the RPC server through the shared socket, exactly as an
//! external caller would. The channel is built lazily on first call, so the
//! client can be created before the socket is bound and re-pointed once the
//! real address is known.

use std::error::Error as _;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::{ArcSwap, ArcSwapOption};
use axum::http::uri::PathAndQuery;
use axum::http::{HeaderMap, HeaderName};
use serde_json::Value;
use tonic::client::Grpc;
use tonic::metadata::MetadataMap;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Request, Response, Status};

use crate::rpc::codec::JsonCodec;
use crate::rpc::status::APP_CODE_KEY;

/// Headers owned by the transport; never copied from call metadata.
const RESERVED_METADATA: &[&str] = &[
    "content-type",
    "content-length",
    "te",
    "host",
    "connection",
    "transfer-encoding",
    "keep-alive",
    "upgrade",
    "grpc-timeout",
    "grpc-encoding",
    "grpc-accept-encoding",
];

#[derive(Clone)]
pub struct RpcClient {
    target: Arc<ArcSwap<SocketAddr>>,
    channel: Arc<ArcSwapOption<(SocketAddr, Channel)>>,
    max_message_bytes: usize,
}

impl RpcClient {
    pub fn new(target: SocketAddr, max_message_bytes: usize) -> Self {
        Self {
            target: Arc::new(ArcSwap::from_pointee(loopback(target))),
            channel: Arc::new(ArcSwapOption::empty()),
            max_message_bytes,
        }
    }

    /// Point future calls at `addr`. Wildcard addresses become loopback.
    pub fn retarget(&self, addr: SocketAddr) {
        self.target.store(Arc::new(loopback(addr)));
    }

    pub fn target(&self) -> SocketAddr {
        **self.target.load()
    }

    fn channel(&self) -> Result<Channel, Status> {
        let target = self.target();
        if let Some(cached) = self.channel.load_full() {
            if cached.0 == target {
                return Ok(cached.1.clone());
            }
        }

        let channel = Endpoint::from_shared(format!("http://{target}"))
            .map_err(|e| Status::internal(format!("invalid RPC target {target}: {e}")))?
            .connect_timeout(Duration::from_secs(5))
            .tcp_nodelay(true)
            .connect_lazy();
        self.channel.store(Some(Arc::new((target, channel.clone()))));
        tracing::debug!(%target, "RPC channel created");
        Ok(channel)
    }

    /// Make one unary call.
    ///
    /// Transport failures surface as `Unavailable`.
    pub async fn unary(
        &self,
        method: &str,
        metadata: &HeaderMap,
        message: &Value,
    ) -> Result<Response<Value>, Status> {
        let path = PathAndQuery::try_from(method)
            .map_err(|e| Status::internal(format!("invalid method path: {e}")))?;

        let mut headers = HeaderMap::new();
        for (name, value) in metadata {
            if !is_reserved(name) {
                headers.append(name.clone(), value.clone());
            }
        }
        let mut request = Request::new(message.clone());
        *request.metadata_mut() = MetadataMap::from_headers(headers);

        let mut grpc = Grpc::new(self.channel()?)
            .max_decoding_message_size(self.max_message_bytes)
            .max_encoding_message_size(self.max_message_bytes);
        grpc.ready()
            .await
            .map_err(|e| Status::unavailable(format!("connection error: {e}")))?;

        grpc.unary(request, path, JsonCodec)
            .await
            .map_err(local_failure_is_unavailable)
    }
}

/// A status raised locally by the transport (not decoded from the peer)
/// carries its cause as a source.
fn local_failure_is_unavailable(status: Status) -> Status {
    let local = status.code() == Code::Unknown
        && status.source().is_some()
        && status.metadata().get(APP_CODE_KEY).is_none();
    if local {
        Status::unavailable(format!("connection error: {}", status.message()))
    } else {
        status
    }
}

fn is_reserved(name: &HeaderName) -> bool {
    RESERVED_METADATA.contains(&name.as_str())
}

/// Replace a wildcard bind address with the loopback of the same family.
fn loopback(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => SocketAddr::new(Ipv4Addr::LOCALHOST.into(), addr.port()),
        IpAddr::V6(ip) if ip.is_unspecified() => SocketAddr::new(Ipv6Addr::LOCALHOST.into(), addr.port()),
        _ => addr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_addresses_become_loopback() {
        assert_eq!(
            loopback("0.0.0.0:8080".parse().unwrap()),
            "127.0.0.1:8080".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            loopback("[::]:9000".parse().unwrap()),
            "[::1]:9000".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            loopback("10.1.2.3:80".parse().unwrap()),
            "10.1.2.3:80".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn retarget_changes_destination() {
        let client = RpcClient::new("0.0.0.0:0".parse().unwrap(), 1024);
        assert_eq!(client.target(), "127.0.0.1:0".parse::<SocketAddr>().unwrap());

        let clone = client.clone();
        client.retarget("0.0.0.0:4242".parse().unwrap());
        assert_eq!(clone.target().port(), 4242);
    }

    #[tokio::test]
    async fn channel_is_rebuilt_after_retarget() {
        let client = RpcClient::new("127.0.0.1:4000".parse().unwrap(), 1024);
        client.channel().unwrap();
        assert_eq!(client.channel.load_full().unwrap().0.port(), 4000);

        client.retarget("127.0.0.1:4001".parse().unwrap());
        client.channel().unwrap();
        assert_eq!(client.channel.load_full().unwrap().0.port(), 4001);
    }

    #[tokio::test]
    async fn unreachable_target_is_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = RpcClient::new(addr, 1024);
        let status = client
            .unary("/x.v1.X/Y", &HeaderMap::new(), &serde_json::json!({}))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::Unavailable);
    }

    #[test]
    fn remote_unknown_status_is_kept() {
        let remote = Status::unknown("boom");
        assert_eq!(local_failure_is_unavailable(remote).code(), Code::Unknown);

        let app = crate::rpc::status::status_from_code(40_001, "app");
        assert_eq!(local_failure_is_unavailable(app).code(), Code::Unknown);
    }
}
