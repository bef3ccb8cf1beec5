//! Runner wire protocol: envelopes, handler dispatch, and the two message
//! families (conversation and step-debug).
//!
//! Each family has its own registry because tags and state fragments differ;
//! both share [`MessageProcessor`]'s dispatch algorithm.

pub mod chat;
pub mod envelope;
pub mod markers;
pub mod registry;
pub mod step;

pub use envelope::{Envelope, RawPayload};
pub use registry::{
    ControlAction, FallbackMessage, HandlerRegistry, MessageHandler, MessageProcessor,
    ProcessContext, ProcessingResult,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An outstanding prompt awaiting one response from the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveRequest {
    pub request_id: String,
    pub prompt: String,
    #[serde(default)]
    pub password: bool,
    /// Accepted media types for the answer, e.g. `image/*`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept: Option<String>,
}

impl ActiveRequest {
    pub fn new(request_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            prompt: prompt.into(),
            password: false,
            accept: None,
        }
    }

    /// Read `request_id`/`prompt`/`password`/`accept` from an envelope.
    ///
    /// `request_id` and `prompt` must be strings (empty is allowed).
    pub(crate) fn from_envelope(envelope: &Envelope) -> Option<Self> {
        let request_id = envelope.lookup_str("request_id")?;
        let prompt = envelope.lookup_str("prompt")?;
        Some(Self {
            request_id: request_id.to_string(),
            prompt: prompt.to_string(),
            password: envelope.lookup("password").is_some_and(truthy),
            accept: envelope.lookup_str("accept").map(str::to_string),
        })
    }
}

/// How a processed message changes the active request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RequestChange {
    Set(ActiveRequest),
    /// Clear only if the active request has this id.
    Resolve { request_id: String },
    Clear,
}

impl RequestChange {
    /// Apply to the current active request.
    pub fn apply(&self, current: Option<ActiveRequest>) -> Option<ActiveRequest> {
        match self {
            Self::Set(request) => Some(request.clone()),
            Self::Resolve { request_id } => {
                current.filter(|active| &active.request_id != request_id)
            }
            Self::Clear => None,
        }
    }
}

/// Loose boolean: `true`, `"true"`, `"1"`, non-zero numbers.
pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::String(text) => matches!(
            text.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes"
        ),
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    }
}

/// Render a JSON value as display text: strings verbatim, others as JSON.
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
