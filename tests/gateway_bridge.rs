//! HTTP requests under the gateway prefix, through the full stack.

use serde_json::{json, Value};

use service_kernel::gateway::ErrorEnvelope;
use service_kernel::modules::ping::{PingModule, PING_ERR_CODE};

mod common;

#[tokio::test]
async fn bridged_call_returns_data_envelope() {
    let (kernel, addr) =
        common::start_kernel(common::test_config(), vec![Box::new(PingModule::new())]).await;

    let res = common::http_client()
        .post(format!("http://{addr}/grpc/v1/ping"))
        .json(&json!({"message": "hello"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(
        res.headers()["content-type"].to_str().unwrap(),
        "application/json"
    );
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({"data": {"message": "hello"}}));

    kernel.shutdown().await;
}

#[tokio::test]
async fn not_found_status_maps_to_404_envelope() {
    let (kernel, addr) =
        common::start_kernel(common::test_config(), vec![Box::new(PingModule::new())]).await;

    let res = common::http_client()
        .get(format!("http://{addr}/grpc/v1/ping/err?code=5"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
    let body: ErrorEnvelope = res.json().await.unwrap();
    assert_eq!(body.code, 5);
    assert_eq!(body.message, "ping failed");
    assert!(body.error.is_empty());

    kernel.shutdown().await;
}

#[tokio::test]
async fn unrecognized_code_maps_to_500() {
    let (kernel, addr) =
        common::start_kernel(common::test_config(), vec![Box::new(PingModule::new())]).await;

    let res = common::http_client()
        .get(format!("http://{addr}/grpc/v1/ping/err"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 500);
    let body: ErrorEnvelope = res.json().await.unwrap();
    assert_eq!(body.code, PING_ERR_CODE);

    kernel.shutdown().await;
}

#[tokio::test]
async fn unmatched_paths_get_404_and_wrong_method_405() {
    let (kernel, addr) =
        common::start_kernel(common::test_config(), vec![Box::new(PingModule::new())]).await;
    let client = common::http_client();

    let res = client
        .get(format!("http://{addr}/grpc/v2/nothing"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
    let body: ErrorEnvelope = res.json().await.unwrap();
    assert_eq!(body.code, 5);

    let res = client
        .delete(format!("http://{addr}/grpc/v1/ping"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 501);
    let body: ErrorEnvelope = res.json().await.unwrap();
    assert_eq!(body.code, 12);
    assert_eq!(body.message, "Method Not Allowed");

    kernel.shutdown().await;
}

#[tokio::test]
async fn gateway_healthz_goes_through_rpc() {
    let (kernel, addr) = common::start_kernel(common::test_config(), vec![]).await;

    let res = common::http_client()
        .get(format!("http://{addr}/grpc/healthz"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({"data": {"status": "SERVING"}}));

    kernel.shutdown().await;
}
