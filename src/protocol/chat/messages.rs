//! Conversation message model.

use crate::protocol::registry::FallbackMessage;
use crate::protocol::{value_text, ActiveRequest, Envelope};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Who authored a text message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Agent,
    System,
}

/// One part of a multi-part message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image { url: String },
    Other { raw: Value },
}

impl ContentPart {
    fn from_value(value: &Value) -> Self {
        if let Value::String(text) = value {
            return Self::Text { text: text.clone() };
        }
        match value.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(text) = value.get("text").and_then(Value::as_str) {
                    return Self::Text {
                        text: text.to_string(),
                    };
                }
            }
            Some("image_url") => {
                let url = match value.get("image_url") {
                    Some(Value::String(url)) => Some(url.as_str()),
                    Some(inner) => inner.get("url").and_then(Value::as_str),
                    None => None,
                };
                if let Some(url) = url {
                    return Self::Image {
                        url: url.to_string(),
                    };
                }
            }
            _ => {}
        }
        Self::Other { raw: value.clone() }
    }

    /// Wire representation.
    pub fn to_wire(&self) -> Value {
        match self {
            Self::Text { text } => json!({"type": "text", "text": text}),
            Self::Image { url } => json!({"type": "image_url", "image_url": {"url": url}}),
            Self::Other { raw } => raw.clone(),
        }
    }
}

/// Message body: plain text or a list of parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Strings and arrays decode; anything else is rejected.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(text) => Some(Self::Text(text.clone())),
            Value::Array(items) => Some(Self::Parts(
                items.iter().map(ContentPart::from_value).collect(),
            )),
            _ => None,
        }
    }

    /// Flattened display text; images render as `[image]`.
    pub fn plain_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => text.clone(),
                    ContentPart::Image { .. } => "[image]".to_string(),
                    ContentPart::Other { raw } => value_text(raw),
                })
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    /// Append an image, promoting plain text to parts.
    pub fn with_image(self, url: &str) -> Self {
        let image = ContentPart::Image {
            url: url.to_string(),
        };
        match self {
            Self::Text(text) if text.is_empty() => Self::Parts(vec![image]),
            Self::Text(text) => Self::Parts(vec![ContentPart::Text { text }, image]),
            Self::Parts(mut parts) => {
                parts.push(image);
                Self::Parts(parts)
            }
        }
    }

    pub fn to_wire(&self) -> Value {
        match self {
            Self::Text(text) => Value::String(text.clone()),
            Self::Parts(parts) => Value::Array(parts.iter().map(ContentPart::to_wire).collect()),
        }
    }
}

/// A single requested tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub arguments: String,
}

/// Output returned for one tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub content: String,
}

/// Closed set of conversation messages plus an unknown fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatMessage {
    Text {
        role: Role,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recipient: Option<String>,
        content: MessageContent,
    },
    ToolCall {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recipient: Option<String>,
        tool_calls: Vec<ToolCall>,
    },
    ToolResponse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recipient: Option<String>,
        responses: Vec<ToolResponse>,
    },
    CodeExecutionReply {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recipient: Option<String>,
        output: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i64>,
    },
    SelectSpeaker {
        agents: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selected: Option<String>,
    },
    Termination {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    InputRequest(ActiveRequest),
    InputResponse {
        request_id: String,
        content: MessageContent,
    },
    RunCompletion {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_speaker: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cost: Option<Value>,
    },
    Error {
        error: String,
    },
    Print {
        text: String,
    },
    Unknown {
        message_type: String,
        raw: Value,
    },
}

impl ChatMessage {
    /// Wire tag of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResponse { .. } => "tool_response",
            Self::CodeExecutionReply { .. } => "code_execution_reply",
            Self::SelectSpeaker { .. } => "select_speaker",
            Self::Termination { .. } => "termination",
            Self::InputRequest(_) => "input_request",
            Self::InputResponse { .. } => "input_response",
            Self::RunCompletion { .. } => "run_completion",
            Self::Error { .. } => "error",
            Self::Print { .. } => "print",
            Self::Unknown { .. } => "unknown",
        }
    }

    pub fn sender(&self) -> Option<&str> {
        match self {
            Self::Text { sender, .. }
            | Self::ToolCall { sender, .. }
            | Self::ToolResponse { sender, .. }
            | Self::CodeExecutionReply { sender, .. } => sender.as_deref(),
            _ => None,
        }
    }

    pub fn recipient(&self) -> Option<&str> {
        match self {
            Self::Text { recipient, .. }
            | Self::ToolCall { recipient, .. }
            | Self::ToolResponse { recipient, .. }
            | Self::CodeExecutionReply { recipient, .. } => recipient.as_deref(),
            _ => None,
        }
    }

    /// Human-readable body used for display and dedup signatures.
    pub fn summary_text(&self) -> String {
        match self {
            Self::Text { content, .. } | Self::InputResponse { content, .. } => {
                content.plain_text()
            }
            Self::ToolCall { tool_calls, .. } => tool_calls
                .iter()
                .map(|call| format!("{}({})", call.name, call.arguments))
                .collect::<Vec<_>>()
                .join("\n"),
            Self::ToolResponse { responses, .. } => responses
                .iter()
                .map(|response| response.content.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
            Self::CodeExecutionReply { output, .. } => output.clone(),
            Self::SelectSpeaker { agents, selected } => match selected {
                Some(selected) => format!("{selected} selected from {}", agents.join(", ")),
                None => agents.join(", "),
            },
            Self::Termination { reason } => reason.clone().unwrap_or_default(),
            Self::InputRequest(request) => request.prompt.clone(),
            Self::RunCompletion { summary, .. } => summary.clone().unwrap_or_default(),
            Self::Error { error } => error.clone(),
            Self::Print { text } => text.clone(),
            Self::Unknown { raw, .. } => raw.to_string(),
        }
    }
}

/// A conversation message with its envelope metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub message: ChatMessage,
}

impl ChatEntry {
    /// Wrap `message` with the envelope's id (or a fresh one) and timestamp.
    pub fn from_envelope(envelope: &Envelope, message: ChatMessage) -> Self {
        Self {
            id: entry_id(envelope),
            timestamp: envelope.timestamp().map(str::to_string),
            message,
        }
    }
}

impl FallbackMessage for ChatEntry {
    fn unknown(envelope: &Envelope) -> Self {
        Self::from_envelope(
            envelope,
            ChatMessage::Unknown {
                message_type: envelope.kind().to_string(),
                raw: envelope.to_value(),
            },
        )
    }
}

/// Envelope id, else nested `uuid`, else a fresh v4 uuid.
pub(crate) fn entry_id(envelope: &Envelope) -> String {
    envelope
        .id()
        .map(str::to_string)
        .or_else(|| envelope.lookup_str("uuid").map(str::to_string))
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}
