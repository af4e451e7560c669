//! Success envelopes
//!
//! - single: `{ "status": "success", "data": { "data": <record> } }`
//! - list: `{ "status": "success", "results": n, "data": { "<key>": [...] } }`
//! - named: `{ "status": "success", "data": { "<key>": <value> } }`
//! - no content: `204` with an empty body

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    Single { status: StatusCode, record: Value },
    List { key: String, records: Vec<Value> },
    Named { key: String, value: Value },
    NoContent,
}

impl ApiResponse {
    pub fn ok(record: Value) -> Self {
        ApiResponse::Single {
            status: StatusCode::OK,
            record,
        }
    }

    pub fn created(record: Value) -> Self {
        ApiResponse::Single {
            status: StatusCode::CREATED,
            record,
        }
    }

    pub fn list(key: impl Into<String>, records: Vec<Value>) -> Self {
        ApiResponse::List {
            key: key.into(),
            records,
        }
    }

    pub fn named(key: impl Into<String>, value: Value) -> Self {
        ApiResponse::Named {
            key: key.into(),
            value,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiResponse::Single { status, .. } => *status,
            ApiResponse::List { .. } | ApiResponse::Named { .. } => StatusCode::OK,
            ApiResponse::NoContent => StatusCode::NO_CONTENT,
        }
    }

    /// JSON body, `None` for 204
    pub fn body(&self) -> Option<Value> {
        match self {
            ApiResponse::Single { record, .. } => Some(envelope("data", record.clone())),
            ApiResponse::List { key, records } => {
                let mut body = envelope(key, Value::Array(records.clone()));
                body["results"] = json!(records.len());
                Some(body)
            }
            ApiResponse::Named { key, value } => Some(envelope(key, value.clone())),
            ApiResponse::NoContent => None,
        }
    }
}

fn envelope(key: &str, value: Value) -> Value {
    let mut data = Map::new();
    data.insert(key.to_string(), value);
    json!({ "status": "success", "data": data })
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self.body() {
            Some(body) => (status, Json(body)).into_response(),
            None => status.into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_envelope() {
        let response = ApiResponse::list("tours", vec![json!({"id": "1"}), json!({"id": "2"})]);
        assert_eq!(
            response.body().unwrap(),
            json!({
                "status": "success",
                "results": 2,
                "data": { "tours": [{"id": "1"}, {"id": "2"}] }
            })
        );
    }

    #[test]
    fn test_single_envelopes() {
        let created = ApiResponse::created(json!({"id": "1"}));
        assert_eq!(created.status_code(), StatusCode::CREATED);
        assert_eq!(created.body().unwrap()["data"]["data"]["id"], "1");
        assert_eq!(ApiResponse::ok(Value::Null).status_code(), StatusCode::OK);
    }

    #[test]
    fn test_no_content_has_no_body() {
        assert_eq!(ApiResponse::NoContent.status_code(), StatusCode::NO_CONTENT);
        assert!(ApiResponse::NoContent.body().is_none());
    }
}
