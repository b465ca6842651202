//! Status helpers on top of [`tonic::Status`].
//!
//! Application codes outside the standard range cannot be expressed as a
//! [`Code`]; they travel as `Unknown` with the raw value in the
//! [`APP_CODE_KEY`] metadata entry, which survives the wire.

use axum::http::StatusCode;
use bytes::Bytes;
use serde_json::Value;
use tonic::metadata::{MetadataMap, MetadataValue};
use tonic::{Code, Status};

/// Metadata key carrying a non-standard status code.
pub const APP_CODE_KEY: &str = "x-app-code";

fn is_standard(code: i32) -> bool {
    (0..=16).contains(&code)
}

/// The HTTP status a bridged call with this code is answered with.
pub fn http_status(code: Code) -> StatusCode {
    match code {
        Code::Ok => StatusCode::OK,
        Code::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
        Code::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        Code::InvalidArgument => StatusCode::BAD_REQUEST,
        Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::AlreadyExists => StatusCode::CONFLICT,
        Code::PermissionDenied => StatusCode::FORBIDDEN,
        Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        Code::FailedPrecondition => StatusCode::BAD_REQUEST,
        Code::Aborted => StatusCode::CONFLICT,
        Code::OutOfRange => StatusCode::BAD_REQUEST,
        Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
        Code::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        Code::DataLoss => StatusCode::INTERNAL_SERVER_ERROR,
        Code::Unauthenticated => StatusCode::UNAUTHORIZED,
    }
}

/// Map a raw status code to HTTP. Codes outside the standard set map to 500.
pub fn http_status_from_code(code: i32) -> StatusCode {
    if is_standard(code) {
        http_status(Code::from_i32(code))
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// Build a status from any integer code.
pub fn status_from_code(code: i32, message: impl Into<String>) -> Status {
    if is_standard(code) {
        return Status::new(Code::from_i32(code), message);
    }
    let mut metadata = MetadataMap::new();
    metadata.insert(APP_CODE_KEY, MetadataValue::from(code));
    Status::with_metadata(Code::Unknown, message, metadata)
}

/// A status whose details are a list of JSON values.
pub fn status_with_details(code: Code, message: impl Into<String>, details: &[Value]) -> Status {
    let json = Value::Array(details.to_vec()).to_string();
    Status::with_details(code, message, Bytes::from(json))
}

pub trait StatusExt {
    /// The code as sent by the service, including application codes.
    fn raw_code(&self) -> i32;

    /// Details decoded as JSON. Anything undecodable yields no details.
    fn json_details(&self) -> Vec<Value>;

    fn http_status(&self) -> StatusCode {
        http_status_from_code(self.raw_code())
    }
}

impl StatusExt for Status {
    fn raw_code(&self) -> i32 {
        if self.code() == Code::Unknown {
            let app_code = self
                .metadata()
                .get(APP_CODE_KEY)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<i32>().ok());
            if let Some(code) = app_code {
                return code;
            }
        }
        self.code() as i32
    }

    fn json_details(&self) -> Vec<Value> {
        if self.details().is_empty() {
            return Vec::new();
        }
        match serde_json::from_slice(self.details()) {
            Ok(Value::Array(details)) => details,
            Ok(other) => vec![other],
            Err(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn standard_codes_map_to_http() {
        assert_eq!(http_status_from_code(0), StatusCode::OK);
        assert_eq!(http_status_from_code(3), StatusCode::BAD_REQUEST);
        assert_eq!(http_status_from_code(5), StatusCode::NOT_FOUND);
        assert_eq!(http_status_from_code(7), StatusCode::FORBIDDEN);
        assert_eq!(http_status_from_code(12), StatusCode::NOT_IMPLEMENTED);
        assert_eq!(http_status_from_code(14), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(http_status_from_code(16), StatusCode::UNAUTHORIZED);
        assert_eq!(http_status_from_code(1).as_u16(), 499);
    }

    #[test]
    fn custom_codes_map_to_500() {
        assert_eq!(http_status_from_code(17), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(http_status_from_code(404_000), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(http_status_from_code(-1), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn application_code_survives_header_round_trip() {
        let status = status_from_code(40_001, "name: café 100%");
        assert_eq!(status.code(), Code::Unknown);
        assert_eq!(status.raw_code(), 40_001);

        let response = status.into_http::<()>();
        let decoded = Status::from_header_map(response.headers()).unwrap();
        assert_eq!(decoded.raw_code(), 40_001);
        assert_eq!(decoded.message(), "name: café 100%");
        assert_eq!(decoded.http_status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn standard_code_ignores_app_code_path() {
        let status = status_from_code(5, "missing");
        assert_eq!(status.code(), Code::NotFound);
        assert_eq!(status.raw_code(), 5);
        assert!(status.metadata().get(APP_CODE_KEY).is_none());
    }

    #[test]
    fn json_details() {
        let status = status_with_details(Code::InvalidArgument, "bad", &[json!({"field": "name"})]);
        assert_eq!(status.json_details(), vec![json!({"field": "name"})]);

        let plain = Status::with_details(Code::Internal, "x", Bytes::from_static(b"\x08\x01"));
        assert!(plain.json_details().is_empty());
        assert!(Status::internal("x").json_details().is_empty());
    }
}
