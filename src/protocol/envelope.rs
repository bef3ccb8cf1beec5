//! Wire envelope decoding.
//!
//! Every frame is a JSON object with a string `type` tag, an optional `id`,
//! an optional `timestamp`, and tag-specific fields. Many runners nest the
//! tag-specific fields under a `content` object; [`Envelope::lookup`] checks
//! both places.

use crate::error::ProcessError;
use serde_json::{Map, Value};

/// An inbound payload before decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    Text(String),
    Json(Value),
}

impl From<&str> for RawPayload {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RawPayload {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Value> for RawPayload {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl RawPayload {
    /// True for text payloads with nothing but whitespace.
    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Text(text) if text.trim().is_empty())
    }
}

/// A decoded, immutable envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    kind: String,
    id: Option<String>,
    timestamp: Option<String>,
    body: Map<String, Value>,
}

impl Envelope {
    /// Decode a raw payload.
    ///
    /// Text is parsed as JSON; a JSON string holding an encoded object (a
    /// double-encoded frame) is unwrapped once.
    pub fn decode(raw: impl Into<RawPayload>) -> Result<Self, ProcessError> {
        let value = match raw.into() {
            RawPayload::Text(text) => parse_json(&text)?,
            RawPayload::Json(Value::String(text)) => parse_json(&text)?,
            RawPayload::Json(value) => value,
        };
        let value = match value {
            Value::String(inner) => parse_json(&inner)?,
            other => other,
        };
        Self::from_value(value)
    }

    /// Build an envelope from an already-decoded JSON value.
    pub fn from_value(value: Value) -> Result<Self, ProcessError> {
        let Value::Object(body) = value else {
            return Err(ProcessError::Decode(format!(
                "expected a JSON object, got {}",
                value_kind(&value)
            )));
        };
        let kind = match body.get("type") {
            Some(Value::String(kind)) if !kind.trim().is_empty() => kind.trim().to_string(),
            _ => return Err(ProcessError::MissingType),
        };
        let id = body.get("id").and_then(scalar_to_string);
        let timestamp = body.get("timestamp").and_then(scalar_to_string);
        Ok(Self {
            kind,
            id,
            timestamp,
            body,
        })
    }

    /// Start an outbound envelope.
    pub fn outbound(kind: &str) -> Self {
        let mut body = Map::new();
        body.insert("type".to_string(), Value::String(kind.to_string()));
        Self {
            kind: kind.to_string(),
            id: None,
            timestamp: None,
            body,
        }
    }

    /// Add a field to an outbound envelope.
    ///
    /// `type` is fixed at construction and cannot be overwritten here.
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        if key == "type" {
            return self;
        }
        let value = value.into();
        match key {
            "id" => self.id = scalar_to_string(&value),
            "timestamp" => self.timestamp = scalar_to_string(&value),
            _ => {}
        }
        self.body.insert(key.to_string(), value);
        self
    }

    /// The `type` tag.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }

    /// Identifier used to correlate a response with a request: `id`, then
    /// `request_id`.
    pub fn correlation_id(&self) -> Option<String> {
        self.id
            .clone()
            .or_else(|| self.body.get("request_id").and_then(scalar_to_string))
    }

    /// Top-level field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    /// Field at top level, else under a nested `content` object.
    pub fn lookup(&self, key: &str) -> Option<&Value> {
        if let Some(value) = self.body.get(key) {
            if !value.is_null() {
                return Some(value);
            }
        }
        self.nested_content()?.get(key).filter(|v| !v.is_null())
    }

    /// String field via [`Envelope::lookup`].
    pub fn lookup_str(&self, key: &str) -> Option<&str> {
        self.lookup(key).and_then(Value::as_str)
    }

    /// The nested `content` object, when `content` is an object.
    pub fn nested_content(&self) -> Option<&Map<String, Value>> {
        self.body.get("content").and_then(Value::as_object)
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.body.clone())
    }

    /// Serialize to a text frame.
    pub fn to_frame(&self) -> String {
        Value::Object(self.body.clone()).to_string()
    }
}

fn parse_json(text: &str) -> Result<Value, ProcessError> {
    serde_json::from_str(text.trim()).map_err(|err| ProcessError::Decode(err.to_string()))
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_reads_type_id_and_timestamp() {
        let env = Envelope::decode(r#"{"type":"print","id":7,"timestamp":"t0","data":"hi"}"#)
            .expect("decode");
        assert_eq!(env.kind(), "print");
        assert_eq!(env.id(), Some("7"));
        assert_eq!(env.timestamp(), Some("t0"));
        assert_eq!(env.lookup_str("data"), Some("hi"));
    }

    #[test]
    fn decode_unwraps_double_encoded_frames() {
        let inner = json!({"type": "print", "data": "x"}).to_string();
        let outer = serde_json::to_string(&inner).expect("encode");
        assert_eq!(Envelope::decode(outer).expect("decode").kind(), "print");
        assert_eq!(Envelope::decode(Value::String(inner)).expect("decode").kind(), "print");
    }

    #[test]
    fn decode_rejects_malformed_and_non_object_payloads() {
        assert!(matches!(
            Envelope::decode("{not json"),
            Err(ProcessError::Decode(_))
        ));
        let err = Envelope::decode("[1,2]").unwrap_err();
        assert_eq!(
            err,
            ProcessError::Decode("expected a JSON object, got an array".into())
        );
    }

    #[test]
    fn missing_or_blank_type_is_reported_distinctly() {
        assert_eq!(
            Envelope::decode(r#"{"data":"x"}"#),
            Err(ProcessError::MissingType)
        );
        assert_eq!(
            Envelope::decode(r#"{"type":"  "}"#),
            Err(ProcessError::MissingType)
        );
        assert_eq!(
            Envelope::decode(r#"{"type":3}"#),
            Err(ProcessError::MissingType)
        );
    }

    #[test]
    fn lookup_falls_back_to_nested_content() {
        let env = Envelope::decode(json!({
            "type": "text",
            "sender": null,
            "content": {"sender": "assistant", "content": "hello"}
        }))
        .expect("decode");
        assert_eq!(env.lookup_str("sender"), Some("assistant"));
        assert!(env.lookup("recipient").is_none());
    }

    #[test]
    fn correlation_id_prefers_id_then_request_id() {
        let env = Envelope::decode(json!({"type": "ack", "request_id": "r1"})).expect("decode");
        assert_eq!(env.correlation_id().as_deref(), Some("r1"));
        let env = Envelope::decode(json!({"type": "ack", "id": "a", "request_id": "r1"}))
            .expect("decode");
        assert_eq!(env.correlation_id().as_deref(), Some("a"));
    }

    #[test]
    fn outbound_builder_keeps_type_fixed() {
        let env = Envelope::outbound("debug_input_response")
            .with_field("request_id", "r1")
            .with_field("type", "spoofed")
            .with_field("data", "c");
        assert_eq!(env.kind(), "debug_input_response");
        let frame: Value = serde_json::from_str(&env.to_frame()).expect("frame");
        assert_eq!(
            frame,
            json!({"type": "debug_input_response", "request_id": "r1", "data": "c"})
        );
    }
}
