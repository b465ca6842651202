//! A routed connection that replays its sniffed prefix.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tonic::transport::server::{Connected, TcpConnectInfo};

use crate::net::connection::{ConnectionClass, ConnectionId};
use crate::net::listener::ConnectionPermit;

/// A classified connection.
///
/// Bytes consumed while sniffing are returned by the first reads, so the
/// downstream server sees the connection exactly as the client wrote it.
#[derive(Debug)]
pub struct SniffedStream {
    prefix: Bytes,
    inner: TcpStream,
    peer_addr: SocketAddr,
    id: ConnectionId,
    class: ConnectionClass,
    _permit: Option<ConnectionPermit>,
}

impl SniffedStream {
    pub fn new(
        inner: TcpStream,
        prefix: Bytes,
        peer_addr: SocketAddr,
        class: ConnectionClass,
        permit: Option<ConnectionPermit>,
    ) -> Self {
        Self {
            prefix,
            inner,
            peer_addr,
            id: ConnectionId::new(),
            class,
            _permit: permit,
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn class(&self) -> ConnectionClass {
        self.class
    }
}

impl Connected for SniffedStream {
    type ConnectInfo = TcpConnectInfo;

    fn connect_info(&self) -> Self::ConnectInfo {
        TcpConnectInfo {
            local_addr: self.inner.local_addr().ok(),
            remote_addr: Some(self.peer_addr),
        }
    }
}

impl AsyncRead for SniffedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if !self.prefix.is_empty() {
            let n = self.prefix.len().min(buf.remaining());
            buf.put_slice(&self.prefix[..n]);
            self.prefix.advance(n);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for SniffedStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn prefix_is_replayed_before_socket_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        let (server, peer) = listener.accept().await.unwrap();
        client.write_all(b" world").await.unwrap();
        client.shutdown().await.unwrap();

        let mut stream = SniffedStream::new(
            server,
            Bytes::from_static(b"hello"),
            peer,
            ConnectionClass::PlainHttp,
            None,
        );
        let mut out = String::new();
        stream.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "hello world");
        assert_eq!(stream.class(), ConnectionClass::PlainHttp);

        let info = stream.connect_info();
        assert_eq!(info.remote_addr, Some(peer));
        assert_eq!(info.local_addr, Some(addr));
    }
}
