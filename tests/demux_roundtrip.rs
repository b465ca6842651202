//! One socket, two protocols.

use axum::http::HeaderMap;
use serde_json::json;

use service_kernel::modules::ping::PingModule;
use service_kernel::rpc::{Code, RpcClient};

mod common;

#[tokio::test]
async fn http_and_rpc_share_one_port() {
    let (kernel, addr) =
        common::start_kernel(common::test_config(), vec![Box::new(PingModule::new())]).await;

    let res = common::http_client()
        .get(format!("http://{addr}/ping/v1"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body, json!({"message": "pong", "debug": false}));

    let client = RpcClient::new(addr, 1024 * 1024);
    let reply = client
        .unary(
            "/ping.v1.PingService/Ping",
            &HeaderMap::new(),
            &json!({"message": "over rpc"}),
        )
        .await
        .unwrap();
    assert_eq!(reply.into_inner(), json!({"message": "over rpc"}));

    kernel.shutdown().await;
}

#[tokio::test]
async fn unknown_rpc_method_is_unimplemented() {
    let (kernel, addr) = common::start_kernel(common::test_config(), vec![]).await;

    let client = RpcClient::new(addr, 1024 * 1024);
    let status = client
        .unary("/nope.v1.Nope/Nothing", &HeaderMap::new(), &json!({}))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unimplemented);

    kernel.shutdown().await;
}

#[tokio::test]
async fn junk_connection_is_closed_without_response() {
    let (kernel, addr) = common::start_kernel(common::test_config(), vec![]).await;

    let out = common::raw_exchange(addr, b"\x16\x03\x01\x02\x00garbage that is not http\r\n\r\n").await;
    assert!(out.is_empty());

    // The socket still serves well-formed clients afterwards.
    let res = common::http_client()
        .get(format!("http://{addr}/healthz"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    kernel.shutdown().await;
}

#[tokio::test]
async fn request_line_longer_than_sniff_limit_reaches_http() {
    let (kernel, addr) = common::start_kernel(common::test_config(), vec![]).await;

    let path = format!("/{}", "a".repeat(20 * 1024));
    let request = format!("GET {path} HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n");
    let out = common::raw_exchange(addr, request.as_bytes()).await;
    assert!(String::from_utf8_lossy(&out).starts_with("HTTP/1.1 404"));

    kernel.shutdown().await;
}

#[tokio::test]
async fn healthz_flips_on_shutdown() {
    let (kernel, addr) = common::start_kernel(common::test_config(), vec![]).await;
    let readiness = kernel.context().readiness();

    let res = common::http_client()
        .get(format!("http://{addr}/healthz"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let report = kernel.shutdown().await;
    assert!(!readiness.is_ready());
    assert!(report.http_graceful);
}
