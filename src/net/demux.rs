//! Listener demultiplexer.
//!
//! Splits one bound socket into two derived listeners. The accept-and-route
//! loop classifies every connection from its opening bytes and hands the raw
//! stream, prefix included, to exactly one of them.
//!
//! ```text
//!                    ┌──────────────┐   RpcFramed   ┌─────────────────┐
//!   TCP accept ────▶ │ sniff (task) │ ────────────▶ │ rpc listener    │
//!                    │              │   PlainHttp   ├─────────────────┤
//!                    │              │ ────────────▶ │ http listener   │
//!                    └──────┬───────┘               └─────────────────┘
//!                           │ rejected / timeout
//!                           ▼
//!                         close
//! ```

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::connect_info::Connected;
use axum::serve::IncomingStream;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::config::ListenerConfig;
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::net::connection::ConnectionClass;
use crate::net::listener::{ConnectionPermit, Listener, ListenerError};
use crate::net::sniff::{classify, strip_settings_ack, Sniff, HTTP2_PREFACE, SERVER_SETTINGS};
use crate::net::stream::SniffedStream;
use crate::observability::metrics;

/// Routed connections waiting for a downstream server to accept them.
const ROUTE_BACKLOG: usize = 128;

/// The accept-and-route loop over the shared socket.
pub struct Demux {
    listener: Listener,
    routes: Routes,
}

#[derive(Clone)]
struct Routes {
    rpc: mpsc::Sender<SniffedStream>,
    http: mpsc::Sender<SniffedStream>,
    sniff_timeout: Duration,
    max_sniff_bytes: usize,
}

impl Demux {
    /// Split a bound listener into the routing loop and its two derived listeners.
    pub fn split(
        listener: Listener,
        config: &ListenerConfig,
    ) -> io::Result<(Demux, DerivedListener, DerivedListener)> {
        let local_addr = listener.local_addr()?;
        let (rpc_tx, rpc_rx) = mpsc::channel(ROUTE_BACKLOG);
        let (http_tx, http_rx) = mpsc::channel(ROUTE_BACKLOG);

        let demux = Demux {
            listener,
            routes: Routes {
                rpc: rpc_tx,
                http: http_tx,
                sniff_timeout: Duration::from_millis(config.sniff_timeout_ms),
                max_sniff_bytes: config.max_sniff_bytes,
            },
        };

        let rpc = DerivedListener {
            rx: rpc_rx,
            local_addr,
            class: ConnectionClass::RpcFramed,
        };
        let http = DerivedListener {
            rx: http_rx,
            local_addr,
            class: ConnectionClass::PlainHttp,
        };

        Ok((demux, rpc, http))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the accept-and-route loop until shutdown.
    ///
    /// Returns an error only when the socket itself became unusable.
    pub async fn serve(self, mut shutdown: ShutdownSignal) -> Result<(), ListenerError> {
        tracing::info!(address = ?self.listener.local_addr().ok(), "Mux listen starting");

        loop {
            let accepted = tokio::select! {
                res = self.listener.accept() => res,
                _ = shutdown.recv() => {
                    tracing::info!("Mux accept loop stopping");
                    return Ok(());
                }
            };

            match accepted {
                Ok((stream, peer, permit)) => {
                    let routes = self.routes.clone();
                    tokio::spawn(route(stream, peer, permit, routes));
                }
                Err(ListenerError::Accept(e)) if is_transient(&e) => {
                    tracing::warn!(error = %e, "Transient accept error");
                    if is_resource_exhaustion(&e) {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Mux accept loop failed");
                    return Err(e);
                }
            }
        }
    }
}

async fn route(mut stream: TcpStream, peer: SocketAddr, permit: ConnectionPermit, routes: Routes) {
    let mut buf = BytesMut::with_capacity(1024);
    let outcome = tokio::time::timeout(
        routes.sniff_timeout,
        sniff(&mut stream, &mut buf, routes.max_sniff_bytes),
    )
    .await;

    let class = match outcome {
        Ok(Ok(class)) => class,
        Ok(Err(reason)) => {
            tracing::debug!(peer_addr = %peer, reason, "Closing unroutable connection");
            metrics::record_connection("rejected");
            return;
        }
        Err(_) => {
            tracing::debug!(peer_addr = %peer, "Closing connection: classification timed out");
            metrics::record_connection("rejected");
            return;
        }
    };

    metrics::record_connection(class.as_str());
    let conn = SniffedStream::new(stream, buf.freeze(), peer, class, Some(permit));
    tracing::trace!(connection_id = %conn.id(), peer_addr = %peer, class = %class, "Connection routed");

    let tx = match class {
        ConnectionClass::RpcFramed => &routes.rpc,
        ConnectionClass::PlainHttp => &routes.http,
    };
    if tx.send(conn).await.is_err() {
        tracing::debug!(peer_addr = %peer, class = %class, "Downstream listener gone, dropping connection");
    }
}

/// Read until the opening bytes classify the connection.
///
/// An HTTP/2 client that stops after its preface is sent an empty SETTINGS
/// frame. Its acknowledgement is removed from the replayed bytes.
async fn sniff(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
    max_bytes: usize,
) -> Result<ConnectionClass, &'static str> {
    let mut settings_sent = false;
    loop {
        match classify(buf) {
            Sniff::Matched(class) => {
                if settings_sent {
                    while !strip_settings_ack(buf) {
                        read_more(stream, buf, max_bytes).await?;
                    }
                }
                return Ok(class);
            }
            Sniff::Reject(reason) => return Err(reason),
            Sniff::NeedMore => {}
        }

        if !settings_sent && buf.starts_with(HTTP2_PREFACE) {
            stream
                .write_all(&SERVER_SETTINGS)
                .await
                .map_err(|_| "write error")?;
            settings_sent = true;
        }
        read_more(stream, buf, max_bytes).await?;
    }
}

async fn read_more(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
    max_bytes: usize,
) -> Result<(), &'static str> {
    if buf.len() >= max_bytes {
        return Err("sniff limit exceeded");
    }
    buf.reserve(1024);
    let n = stream.read_buf(buf).await.map_err(|_| "read error")?;
    if n == 0 {
        return Err("closed before classification");
    }
    Ok(())
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::TimedOut
            | io::ErrorKind::WouldBlock
    ) || is_resource_exhaustion(e)
}

/// EMFILE / ENFILE: the process or system is out of descriptors.
fn is_resource_exhaustion(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(23) | Some(24))
}

/// Remote address of a routed connection, as seen by axum handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddr(pub SocketAddr);

impl Connected<IncomingStream<'_, DerivedListener>> for PeerAddr {
    fn connect_info(stream: IncomingStream<'_, DerivedListener>) -> Self {
        PeerAddr(*stream.remote_addr())
    }
}

/// One side of a demultiplexed socket.
pub struct DerivedListener {
    rx: mpsc::Receiver<SniffedStream>,
    local_addr: SocketAddr,
    class: ConnectionClass,
}

impl DerivedListener {
    /// Next routed connection, or `None` once the routing loop is gone.
    pub async fn next(&mut self) -> Option<SniffedStream> {
        self.rx.recv().await
    }

    pub fn class(&self) -> ConnectionClass {
        self.class
    }
}

impl axum::serve::Listener for DerivedListener {
    type Io = SniffedStream;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        match self.rx.recv().await {
            Some(stream) => {
                let peer = stream.peer_addr();
                (stream, peer)
            }
            // The routing loop has stopped; nothing will ever arrive again.
            None => std::future::pending().await,
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        Ok(self.local_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::shutdown::Shutdown;

    async fn start() -> (SocketAddr, DerivedListener, DerivedListener, Shutdown) {
        let config = ListenerConfig {
            bind_address: "127.0.0.1:0".into(),
            sniff_timeout_ms: 500,
            ..ListenerConfig::default()
        };
        let listener = Listener::bind(&config).await.unwrap();
        let (demux, rpc, http) = Demux::split(listener, &config).unwrap();
        let addr = demux.local_addr().unwrap();
        let shutdown = Shutdown::new();
        tokio::spawn(demux.serve(shutdown.subscribe()));
        (addr, rpc, http, shutdown)
    }

    #[tokio::test]
    async fn http1_connection_reaches_http_listener_with_prefix() {
        let (addr, _rpc, mut http, _shutdown) = start().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        let request = b"GET /x HTTP/1.1\r\nHost: a\r\n\r\n";
        client.write_all(request).await.unwrap();

        let mut conn = http.next().await.unwrap();
        assert_eq!(conn.class(), ConnectionClass::PlainHttp);

        let mut received = vec![0u8; request.len()];
        conn.read_exact(&mut received).await.unwrap();
        assert_eq!(&received[..], &request[..]);
    }

    #[tokio::test]
    async fn waiting_h2_client_gets_settings_and_ack_is_not_replayed() {
        let (addr, mut rpc, _http, _shutdown) = start().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut opening = HTTP2_PREFACE.to_vec();
        opening.extend_from_slice(&[0, 0, 0, 4, 0, 0, 0, 0, 0]);
        client.write_all(&opening).await.unwrap();

        let mut settings = [0u8; 9];
        tokio::time::timeout(Duration::from_secs(2), client.read_exact(&mut settings))
            .await
            .expect("no SETTINGS from server")
            .unwrap();
        assert_eq!(settings, SERVER_SETTINGS);

        let mut encoder = hpack::Encoder::new();
        let block = encoder.encode(vec![
            (&b":method"[..], &b"POST"[..]),
            (&b":path"[..], &b"/x.v1.X/Y"[..]),
            (&b"content-type"[..], &b"application/grpc"[..]),
        ]);
        let mut rest = vec![0, 0, 0, 4, 1, 0, 0, 0, 0];
        let len = block.len();
        rest.extend_from_slice(&[(len >> 16) as u8, (len >> 8) as u8, len as u8, 1, 4, 0, 0, 0, 1]);
        rest.extend_from_slice(&block);
        client.write_all(&rest).await.unwrap();

        let mut conn = rpc.next().await.unwrap();
        assert_eq!(conn.class(), ConnectionClass::RpcFramed);

        let mut expected = opening.clone();
        expected.extend_from_slice(&rest[9..]);
        let mut received = vec![0u8; expected.len()];
        conn.read_exact(&mut received).await.unwrap();
        assert_eq!(received, expected);
    }

    #[tokio::test]
    async fn junk_connection_is_closed() {
        let (addr, _rpc, _http, _shutdown) = start().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"\x00\x01garbage\r\n").await.unwrap();

        let mut buf = [0u8; 8];
        let n = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0, "server must close without a response");
    }

    #[tokio::test]
    async fn silent_connection_times_out() {
        let (addr, _rpc, _http, _shutdown) = start().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 8];
        let n = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn shutdown_stops_accept_loop() {
        let config = ListenerConfig {
            bind_address: "127.0.0.1:0".into(),
            ..ListenerConfig::default()
        };
        let listener = Listener::bind(&config).await.unwrap();
        let (demux, _rpc, _http) = Demux::split(listener, &config).unwrap();
        let shutdown = Shutdown::new();
        let task = tokio::spawn(demux.serve(shutdown.subscribe()));

        shutdown.trigger();
        let result = tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert!(result.is_ok());
    }
}
