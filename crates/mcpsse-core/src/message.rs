//! JSON-RPC 2.0 message envelope.
//!
//! An envelope is exactly one of request, response or notification. Shape is
//! checked when parsing; method names and parameter schemas are not.
//!
//! `null` is treated as absent for every optional member except `result`,
//! where `"result": null` is a valid successful response, and `id` on an
//! error response, which the server sends when it could not read the
//! request's id.

use crate::error::ParseError;
use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

pub const JSONRPC_VERSION: &str = "2.0";

/// Request identifier: a JSON string or integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        RequestId::Number(id)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        RequestId::String(id.to_string())
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        RequestId::String(id)
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub method: String,
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: String,
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// `None` only for error responses to requests whose id was unreadable.
    pub id: Option<RequestId>,
    pub outcome: Outcome,
}

/// The `result` / `error` half of a response.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Result(Value),
    Error(JsonRpcError),
}

/// Which of the three shapes an envelope has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    Response,
    Notification,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Request => write!(f, "request"),
            MessageKind::Response => write!(f, "response"),
            MessageKind::Notification => write!(f, "notification"),
        }
    }
}

/// One JSON-RPC 2.0 message.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonRpcMessage {
    Request(Request),
    Response(Response),
    Notification(Notification),
}

impl JsonRpcMessage {
    pub fn request(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        JsonRpcMessage::Request(Request {
            id: id.into(),
            method: method.into(),
            params,
        })
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        JsonRpcMessage::Notification(Notification {
            method: method.into(),
            params,
        })
    }

    pub fn success(id: impl Into<RequestId>, result: Value) -> Self {
        JsonRpcMessage::Response(Response {
            id: Some(id.into()),
            outcome: Outcome::Result(result),
        })
    }

    pub fn failure(id: impl Into<RequestId>, error: JsonRpcError) -> Self {
        JsonRpcMessage::Response(Response {
            id: Some(id.into()),
            outcome: Outcome::Error(error),
        })
    }

    /// Error response with `"id": null`.
    pub fn failure_without_id(error: JsonRpcError) -> Self {
        JsonRpcMessage::Response(Response {
            id: None,
            outcome: Outcome::Error(error),
        })
    }

    /// Parse raw JSON text into an envelope.
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::parse_value(value)
    }

    /// Check the shape of an already-decoded JSON value.
    pub fn parse_value(value: Value) -> Result<Self, ParseError> {
        let Value::Object(mut map) = value else {
            return Err(ParseError::NotAnObject);
        };

        match take_present(&mut map, "jsonrpc") {
            None => {}
            Some(Value::String(version)) if version == JSONRPC_VERSION => {}
            Some(other) => {
                return Err(ParseError::InvalidField {
                    field: "jsonrpc",
                    message: format!("expected \"{}\", got {}", JSONRPC_VERSION, other),
                })
            }
        }

        let null_id = matches!(map.get("id"), Some(Value::Null));
        let id = take_present(&mut map, "id").map(parse_id).transpose()?;
        let method = take_present(&mut map, "method")
            .map(|value| match value {
                Value::String(method) => Ok(method),
                other => Err(ParseError::InvalidField {
                    field: "method",
                    message: format!("expected a string, got {}", other),
                }),
            })
            .transpose()?;
        let params = take_present(&mut map, "params");
        // `"result": null` is a real result, so presence is what counts here.
        let result = map.remove("result");
        let error = take_present(&mut map, "error").map(parse_error).transpose()?;

        match (method, id) {
            (Some(method), id) => {
                if result.is_some() {
                    return Err(ParseError::ConflictingFields("method", "result"));
                }
                if error.is_some() {
                    return Err(ParseError::ConflictingFields("method", "error"));
                }
                Ok(match id {
                    Some(id) => JsonRpcMessage::Request(Request { id, method, params }),
                    None => JsonRpcMessage::Notification(Notification { method, params }),
                })
            }
            (None, Some(id)) => {
                if params.is_some() {
                    return Err(ParseError::MissingField("method"));
                }
                let outcome = match (result, error) {
                    (Some(result), None) => Outcome::Result(result),
                    (None, Some(error)) => Outcome::Error(error),
                    (Some(_), Some(_)) => {
                        return Err(ParseError::ConflictingFields("result", "error"))
                    }
                    (None, None) => return Err(ParseError::MissingField("result")),
                };
                Ok(JsonRpcMessage::Response(Response {
                    id: Some(id),
                    outcome,
                }))
            }
            (None, None) if null_id && params.is_none() && result.is_none() => match error {
                Some(error) => Ok(JsonRpcMessage::Response(Response {
                    id: None,
                    outcome: Outcome::Error(error),
                })),
                None => Err(ParseError::MissingField("method")),
            },
            (None, None) => {
                if result.is_some() || error.is_some() {
                    Err(ParseError::MissingField("id"))
                } else {
                    Err(ParseError::MissingField("method"))
                }
            }
        }
    }

    /// Serialize to compact JSON text. Absent members are omitted.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            JsonRpcMessage::Request(_) => MessageKind::Request,
            JsonRpcMessage::Response(_) => MessageKind::Response,
            JsonRpcMessage::Notification(_) => MessageKind::Notification,
        }
    }

    pub fn id(&self) -> Option<&RequestId> {
        match self {
            JsonRpcMessage::Request(req) => Some(&req.id),
            JsonRpcMessage::Response(resp) => resp.id.as_ref(),
            JsonRpcMessage::Notification(_) => None,
        }
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            JsonRpcMessage::Request(req) => Some(&req.method),
            JsonRpcMessage::Notification(notif) => Some(&notif.method),
            JsonRpcMessage::Response(_) => None,
        }
    }

    /// Short label for log lines, e.g. `request ping#3`.
    pub fn describe(&self) -> String {
        match (self.method(), self.id()) {
            (Some(method), Some(id)) => format!("{} {}#{}", self.kind(), method, id),
            (Some(method), None) => format!("{} {}", self.kind(), method),
            (None, Some(id)) => format!("{} #{}", self.kind(), id),
            (None, None) => self.kind().to_string(),
        }
    }
}

fn take_present(map: &mut Map<String, Value>, key: &str) -> Option<Value> {
    map.remove(key).filter(|value| !value.is_null())
}

fn parse_id(value: Value) -> Result<RequestId, ParseError> {
    match value {
        Value::String(id) => Ok(RequestId::String(id)),
        Value::Number(n) => n.as_i64()
            .map(RequestId::Number)
            .ok_or_else(|| ParseError::InvalidField {
                field: "id",
                message: format!("expected an integer, got {}", n),
            }),
        other => Err(ParseError::InvalidField {
            field: "id",
            message: format!("expected a string or integer, got {}", other),
        }),
    }
}

fn parse_error(value: Value) -> Result<JsonRpcError, ParseError> {
    serde_json::from_value(value).map_err(|e| ParseError::InvalidField {
        field: "error",
        message: e.to_string(),
    })
}

impl FromStr for JsonRpcMessage {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for JsonRpcMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("jsonrpc", JSONRPC_VERSION)?;
        match self {
            JsonRpcMessage::Request(req) => {
                map.serialize_entry("id", &req.id)?;
                map.serialize_entry("method", &req.method)?;
                if let Some(params) = &req.params {
                    map.serialize_entry("params", params)?;
                }
            }
            JsonRpcMessage::Notification(notif) => {
                map.serialize_entry("method", &notif.method)?;
                if let Some(params) = &notif.params {
                    map.serialize_entry("params", params)?;
                }
            }
            JsonRpcMessage::Response(resp) => {
                map.serialize_entry("id", &resp.id)?;
                match &resp.outcome {
                    Outcome::Result(result) => map.serialize_entry("result", result)?,
                    Outcome::Error(error) => map.serialize_entry("error", error)?,
                }
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for JsonRpcMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::parse_value(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn roundtrip(value: Value) -> Value {
        let message = JsonRpcMessage::parse(&value.to_string()).expect("should parse");
        serde_json::from_str(&message.to_json().unwrap()).unwrap()
    }

    #[test]
    fn test_roundtrip_preserves_valid_messages() {
        let samples = [
            json!({"jsonrpc": "2.0", "id": 1, "method": "ping", "params": {}}),
            json!({"jsonrpc": "2.0", "id": "abc", "method": "tools/list"}),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            json!({"jsonrpc": "2.0", "method": "log", "params": ["a", 1]}),
            json!({"jsonrpc": "2.0", "id": 7, "result": {"tools": []}}),
            json!({"jsonrpc": "2.0", "id": 8, "result": null}),
            json!({"jsonrpc": "2.0", "id": 9, "error": {"code": -32601, "message": "nope"}}),
            json!({"jsonrpc": "2.0", "id": 10, "error": {"code": 1, "message": "x", "data": [1]}}),
            json!({"jsonrpc": "2.0", "id": null, "error": {"code": -32700, "message": "Parse error"}}),
        ];
        for sample in samples {
            assert_eq!(roundtrip(sample.clone()), sample);
        }
    }

    #[test]
    fn test_roundtrip_omits_null_members() {
        let out = roundtrip(json!({"jsonrpc": "2.0", "id": 1, "method": "ping", "params": null}));
        assert_eq!(out, json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}));

        let out = roundtrip(json!({"jsonrpc": "2.0", "id": 2, "result": 5, "error": null}));
        assert_eq!(out, json!({"jsonrpc": "2.0", "id": 2, "result": 5}));
    }

    #[test]
    fn test_missing_jsonrpc_defaults_to_2_0() {
        let out = roundtrip(json!({"method": "ping"}));
        assert_eq!(out, json!({"jsonrpc": "2.0", "method": "ping"}));
    }

    #[test]
    fn test_shapes() {
        let msg = JsonRpcMessage::parse(r#"{"jsonrpc":"2.0","id":1,"method":"ping","params":{}}"#)
            .unwrap();
        assert_eq!(msg.kind(), MessageKind::Request);
        assert_eq!(msg.id(), Some(&RequestId::Number(1)));
        assert_eq!(msg.method(), Some("ping"));

        let msg = JsonRpcMessage::parse(r#"{"jsonrpc":"2.0","method":"note"}"#).unwrap();
        assert_eq!(msg.kind(), MessageKind::Notification);
        assert_eq!(msg.id(), None);

        let msg = JsonRpcMessage::parse(r#"{"jsonrpc":"2.0","id":"x","result":true}"#).unwrap();
        assert_eq!(msg.kind(), MessageKind::Response);
        assert_eq!(msg.method(), None);
        assert_eq!(msg, JsonRpcMessage::success("x", json!(true)));
    }

    #[test]
    fn test_error_response_with_null_id() {
        let msg = JsonRpcMessage::parse(
            r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"Parse error"}}"#,
        )
        .unwrap();
        assert_eq!(msg.kind(), MessageKind::Response);
        assert_eq!(msg.id(), None);
        assert_eq!(
            msg,
            JsonRpcMessage::failure_without_id(JsonRpcError::new(-32700, "Parse error"))
        );
        assert_eq!(msg.describe(), "response");

        // Only error responses may carry a null id.
        assert_eq!(
            JsonRpcMessage::parse(r#"{"jsonrpc":"2.0","id":null,"result":1}"#).unwrap_err(),
            ParseError::MissingField("id")
        );
        assert_eq!(
            JsonRpcMessage::parse(r#"{"jsonrpc":"2.0","id":null,"method":"m"}"#).unwrap(),
            JsonRpcMessage::notification("m", None)
        );
    }

    #[test]
    fn test_invalid_json() {
        let err = JsonRpcMessage::parse("{not json").unwrap_err();
        assert!(matches!(err, ParseError::InvalidJson(_)));
    }

    #[test]
    fn test_not_an_object() {
        assert_eq!(JsonRpcMessage::parse("[1,2]").unwrap_err(), ParseError::NotAnObject);
        assert_eq!(JsonRpcMessage::parse("42").unwrap_err(), ParseError::NotAnObject);
    }

    #[test]
    fn test_missing_fields() {
        assert_eq!(
            JsonRpcMessage::parse(r#"{"jsonrpc":"2.0"}"#).unwrap_err(),
            ParseError::MissingField("method")
        );
        assert_eq!(
            JsonRpcMessage::parse(r#"{"jsonrpc":"2.0","id":3}"#).unwrap_err(),
            ParseError::MissingField("result")
        );
        assert_eq!(
            JsonRpcMessage::parse(r#"{"jsonrpc":"2.0","result":{}}"#).unwrap_err(),
            ParseError::MissingField("id")
        );
        assert_eq!(
            JsonRpcMessage::parse(r#"{"jsonrpc":"2.0","id":3,"params":{}}"#).unwrap_err(),
            ParseError::MissingField("method")
        );
    }

    #[test]
    fn test_conflicting_fields() {
        assert_eq!(
            JsonRpcMessage::parse(r#"{"jsonrpc":"2.0","id":1,"result":1,"error":{"code":1,"message":"m"}}"#)
                .unwrap_err(),
            ParseError::ConflictingFields("result", "error")
        );
        assert_eq!(
            JsonRpcMessage::parse(r#"{"jsonrpc":"2.0","id":1,"method":"m","result":1}"#)
                .unwrap_err(),
            ParseError::ConflictingFields("method", "result")
        );
    }

    #[test]
    fn test_invalid_fields() {
        let err = JsonRpcMessage::parse(r#"{"jsonrpc":"1.0","method":"m"}"#).unwrap_err();
        assert_eq!(err.field(), Some("jsonrpc"));

        let err = JsonRpcMessage::parse(r#"{"jsonrpc":"2.0","id":1.5,"method":"m"}"#).unwrap_err();
        assert_eq!(err.field(), Some("id"));

        let err = JsonRpcMessage::parse(r#"{"jsonrpc":"2.0","id":{},"method":"m"}"#).unwrap_err();
        assert_eq!(err.field(), Some("id"));

        let err = JsonRpcMessage::parse(r#"{"jsonrpc":"2.0","method":7}"#).unwrap_err();
        assert_eq!(err.field(), Some("method"));

        let err = JsonRpcMessage::parse(r#"{"jsonrpc":"2.0","id":1,"error":"bad"}"#).unwrap_err();
        assert_eq!(err.field(), Some("error"));
    }

    #[test]
    fn test_serde_deserialize_uses_shape_check() {
        let msg: JsonRpcMessage =
            serde_json::from_value(json!({"jsonrpc": "2.0", "method": "x"})).unwrap();
        assert_eq!(msg, JsonRpcMessage::notification("x", None));

        let err = serde_json::from_value::<JsonRpcMessage>(json!({"jsonrpc": "2.0"})).unwrap_err();
        assert!(err.to_string().contains("Missing field: method"));
    }

    #[test]
    fn test_describe() {
        assert_eq!(
            JsonRpcMessage::request(3, "ping", None).describe(),
            "request ping#3"
        );
        assert_eq!(
            JsonRpcMessage::notification("note", None).describe(),
            "notification note"
        );
        assert_eq!(
            JsonRpcMessage::failure("a", JsonRpcError::new(-1, "x")).describe(),
            "response #a"
        );
    }
}
