//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use service_kernel::config::{KernelConfig, ListenerConfig};
use service_kernel::kernel::{Kernel, Module};
use service_kernel::net::Listener;

/// Config bound to an ephemeral loopback port with short timeouts.
pub fn test_config() -> KernelConfig {
    let mut config = KernelConfig::default();
    config.listener = ListenerConfig {
        bind_address: "127.0.0.1:0".into(),
        sniff_timeout_ms: 500,
        ..ListenerConfig::default()
    };
    config.shutdown.timeout_secs = 1;
    config
}

/// Start a kernel with `modules` and serve it on a fresh socket.
pub async fn start_kernel(
    config: KernelConfig,
    modules: Vec<Box<dyn Module>>,
) -> (Kernel, SocketAddr) {
    let mut kernel = Kernel::new(config.clone());
    for module in modules {
        kernel.register(module);
    }
    kernel.start().expect("startup");

    let listener = Listener::bind(&config.listener).await.expect("bind");
    let addr = kernel.serve(listener).expect("serve");
    (kernel, addr)
}

/// Send raw bytes and read until the server closes the connection.
pub async fn raw_exchange(addr: SocketAddr, bytes: &[u8]) -> Vec<u8> {
    let mut conn = TcpStream::connect(addr).await.unwrap();
    conn.write_all(bytes).await.unwrap();
    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), conn.read_to_end(&mut out))
        .await
        .expect("server did not close the connection")
        .unwrap();
    out
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}
