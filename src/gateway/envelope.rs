//! JSON envelopes for bridged responses.
//!
//! ```text
//! success: {"data": <response message>}
//! error:   {"code": <rpc code>, "message": "...", "error": [<details>]}
//! ```

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tonic::Status;

use crate::rpc::status::StatusExt;

#[derive(Debug, Serialize)]
pub struct SuccessEnvelope<'a, T: Serialize> {
    pub data: &'a T,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: i32,
    pub message: String,
    pub error: Vec<Value>,
}

impl From<&Status> for ErrorEnvelope {
    fn from(status: &Status) -> Self {
        Self {
            code: status.raw_code(),
            message: status.message().to_string(),
            error: status.json_details(),
        }
    }
}

/// 200 with `{"data": ...}`.
///
/// If the message cannot be serialized the failure is logged and the
/// response goes out with an empty body.
pub fn success_response<T: Serialize>(data: &T) -> Response {
    let body = match serde_json::to_vec(&SuccessEnvelope { data }) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize gateway response");
            Vec::new()
        }
    };
    json_response(StatusCode::OK, body)
}

/// Error envelope with the HTTP status mapped from the RPC code.
pub fn error_response(status: &Status) -> Response {
    let body = match serde_json::to_vec(&ErrorEnvelope::from(status)) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize gateway error");
            Vec::new()
        }
    };
    json_response(status.http_status(), body)
}

fn json_response(status: StatusCode, body: Vec<u8>) -> Response {
    let mut response = (status, body).into_response();
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::status::{status_from_code, status_with_details};
    use tonic::Code;
    use http_body_util::BodyExt;
    use serde_json::json;
    use std::collections::HashMap;

    async fn body_of(response: Response) -> Vec<u8> {
        response.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    #[tokio::test]
    async fn success_wraps_data() {
        let response = success_response(&json!({"value": "pong"}));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        let body: Value = serde_json::from_slice(&body_of(response).await).unwrap();
        assert_eq!(body, json!({"data": {"value": "pong"}}));
    }

    #[tokio::test]
    async fn unserializable_success_has_empty_body() {
        let mut bad: HashMap<(i32, i32), i32> = HashMap::new();
        bad.insert((1, 2), 3);
        let response = success_response(&bad);
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_of(response).await.is_empty());
    }

    #[tokio::test]
    async fn error_envelope_shape() {
        let status = status_with_details(Code::NotFound, "book not found", &[json!({"id": 7})]);
        let response = error_response(&status);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: ErrorEnvelope = serde_json::from_slice(&body_of(response).await).unwrap();
        assert_eq!(
            body,
            ErrorEnvelope {
                code: 5,
                message: "book not found".into(),
                error: vec![json!({"id": 7})],
            }
        );
    }

    #[tokio::test]
    async fn custom_code_is_500_with_raw_code() {
        let response = error_response(&status_from_code(40_401, "custom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = serde_json::from_slice(&body_of(response).await).unwrap();
        assert_eq!(body["code"], 40_401);
        assert_eq!(body["error"], json!([]));
    }
}
