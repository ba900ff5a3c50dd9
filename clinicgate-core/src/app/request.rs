//! Request decoding: query strings, caller identity, JSON bodies

use std::collections::HashMap;

use bytes::Bytes;
use http::{HeaderMap, Method};
use serde_json::Value;

use crate::rbac::{AccessContext, RoleSpec};
use crate::sql::JsonRow;
use crate::{Error, Result};

/// Header carrying the audit username when the query string has none
pub const USERNAME_HEADER: &str = "x-username";

/// A fully buffered API request
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiRequest {
    pub fn new(method: Method, path: &str, query: Option<&str>, headers: HeaderMap, body: Bytes) -> Self {
        Self { method, path: path.to_string(), query: parse_query(query), headers, body }
    }

    /// Decoded path segments without empty parts: `/api/objects/patient` -> `["api", "objects", "patient"]`
    pub fn segments(&self) -> Vec<String> {
        self.path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| urlencoding::decode(s).map(|d| d.into_owned()).unwrap_or_else(|_| s.to_string()))
            .collect()
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// Positive integer query parameter; anything else falls back to `default`
    pub fn positive(&self, key: &str, default: u32) -> u32 {
        self.param(key).and_then(|v| v.trim().parse::<u32>().ok()).filter(|v| *v > 0).unwrap_or(default)
    }

    /// Role from `?role=`, username from `?username=` or the `X-Username` header
    pub fn access_context(&self, roles: &RoleSpec) -> AccessContext {
        let username = self
            .param("username")
            .or_else(|| self.headers.get(USERNAME_HEADER).and_then(|v| v.to_str().ok()));
        AccessContext::new(roles, self.param("role"), username)
    }

    /// Body as a JSON object; an empty body is an empty object
    pub fn json_body(&self) -> Result<JsonRow> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(JsonRow::new());
        }
        match serde_json::from_slice::<Value>(&self.body)? {
            Value::Object(map) => Ok(map),
            _ => Err(Error::InvalidInput("Request body must be a JSON object".to_string())),
        }
    }
}

/// Member of a JSON body that must be an object when present
pub fn object_member(body: &JsonRow, key: &str) -> Result<JsonRow> {
    match body.get(key) {
        None | Some(Value::Null) => Ok(JsonRow::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(Error::InvalidInput(format!("Field '{}' must be an object", key))),
    }
}

/// Decode `a=1&b=x%20y`; later duplicates win, undecodable pairs are dropped
pub fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let Some(query) = query else {
        return params;
    };
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = urlencoding::decode(&key.replace('+', " ")).map(|k| k.into_owned());
        let value = urlencoding::decode(&value.replace('+', " ")).map(|v| v.into_owned());
        if let (Ok(key), Ok(value)) = (key, value) {
            params.insert(key, value);
        }
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(query: &str, body: &str) -> ApiRequest {
        ApiRequest::new(Method::GET, "/api/objects/patient/", Some(query), HeaderMap::new(), Bytes::from(body.to_string()))
    }

    #[test]
    fn test_parse_query_decodes() {
        let params = parse_query(Some("role=role_doctor&username=%E7%8E%8B+wu&flag"));
        assert_eq!(params["role"], "role_doctor");
        assert_eq!(params["username"], "王 wu");
        assert_eq!(params["flag"], "");
        assert!(parse_query(None).is_empty());
    }

    #[test]
    fn test_segments_and_paging() {
        let req = request("page=0&pageSize=abc", "");
        assert_eq!(req.segments(), vec!["api", "objects", "patient"]);
        let encoded = ApiRequest::new(Method::GET, "/api/objects/a%3Bb", None, HeaderMap::new(), Bytes::new());
        assert_eq!(encoded.segments()[2], "a;b");
        assert_eq!(req.positive("page", 1), 1);
        assert_eq!(req.positive("pageSize", 20), 20);
        assert_eq!(request("page=3", "").positive("page", 1), 3);
    }

    #[test]
    fn test_username_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert(USERNAME_HEADER, "li".parse().unwrap());
        let req = ApiRequest::new(Method::GET, "/api/menu", Some("role=role_nurse"), headers, Bytes::new());
        let ctx = req.access_context(&RoleSpec::default());
        assert_eq!(ctx.role, "role_nurse");
        assert_eq!(ctx.username(), Some("li"));
    }

    #[test]
    fn test_json_body_shapes() {
        assert!(request("", "  ").json_body().unwrap().is_empty());
        assert!(matches!(request("", "[1]").json_body(), Err(Error::InvalidInput(_))));
        assert!(matches!(request("", "{oops").json_body(), Err(Error::Json(_))));

        let body = request("", r#"{"data": {"a": 1}, "where": 5}"#).json_body().unwrap();
        assert_eq!(object_member(&body, "data").unwrap().len(), 1);
        assert!(object_member(&body, "missing").unwrap().is_empty());
        assert!(object_member(&body, "where").is_err());
    }
}
