//! Response helpers for the console's JSON API.
//!
//! Every body is JSON. Errors share one shape:
//! `{"error": "<snake_code>", "message": "<human text>"}`.

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use http_body_util::Full;
use hyper::Response;
use serde::Serialize;
use serde_json::json;

use crate::{Error, Operation};

pub type Resp = Response<Full<Bytes>>;

/// JSON response with the given status code.
pub fn json(status: StatusCode, body: impl Into<String>) -> Resp {
    let mut response = Response::new(Full::new(Bytes::from(body.into())));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// 200 with `value` serialized as the body.
pub fn ok<T: Serialize>(value: &T) -> Resp {
    match serde_json::to_string(value) {
        Ok(body) => json(StatusCode::OK, body),
        Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, "serialization_error", &e.to_string()),
    }
}

/// Error body with an explicit status and code.
pub fn error(status: StatusCode, code: &str, message: &str) -> Resp {
    json(status, json!({ "error": code, "message": message }).to_string())
}

/// Error body for a domain error raised by an operation of the given kind.
pub fn from_error(err: &Error, operation: Operation) -> Resp {
    let status = err.status(operation);
    if status.is_server_error() {
        log::error!("{} ({})", err, err.code());
    }
    error(status, err.code(), &err.to_string())
}

pub fn not_found() -> Resp {
    error(StatusCode::NOT_FOUND, "not_found", "No such endpoint")
}

pub fn method_not_allowed() -> Resp {
    error(StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed", "Method not allowed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_shape() {
        let resp = from_error(&Error::Forbidden("Object not permitted for this role".into()), Operation::Read);
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(resp.headers()[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_ok_serializes() {
        let resp = ok(&json!({"status": "ok"}));
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
