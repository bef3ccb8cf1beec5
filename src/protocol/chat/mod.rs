//! Conversation channel: message model, handlers, and outbound frames.

mod handlers;
mod messages;

pub use handlers::{
    CodeExecutionReplyHandler, ErrorHandler, InputRequestHandler, InputResponseHandler,
    PrintHandler, RunCompletionHandler, SelectSpeakerHandler, TerminationHandler, TextHandler,
    ToolCallHandler, ToolResponseHandler,
};
pub(crate) use messages::entry_id;
pub use messages::{
    ChatEntry, ChatMessage, ContentPart, MessageContent, Role, ToolCall, ToolResponse,
};

use super::registry::{HandlerRegistry, MessageProcessor};
use super::{Envelope, RequestChange};
use crate::dedup::signature_digest;
use crate::error::RegistryError;
use crate::textutil::collapse_whitespace;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Processor specialized for the conversation channel.
pub type ChatProcessor = MessageProcessor<ChatEntry, ChatUpdate>;

/// Legacy conversation tags and their current names.
pub const CHAT_TAG_ALIASES: &[(&str, &str)] = &[
    ("execute_code_reply", "code_execution_reply"),
    ("generate_code_execution_reply", "code_execution_reply"),
    ("speaker_selection", "select_speaker"),
    ("group_chat_run_chat", "select_speaker"),
    ("using_auto_reply", "text"),
];

/// Legacy agent-class values and their current names.
pub const AGENT_CLASS_ALIASES: &[(&str, &str)] = &[("rag_user", "rag_user_proxy"), ("user", "user_proxy")];

/// State fragment produced by a conversation handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_request: Option<RequestChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participants: Option<Vec<Participant>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline: Option<Timeline>,
}

impl ChatUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// An agent taking part in the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_class: Option<String>,
    /// True when the agent relays for a human.
    #[serde(default)]
    pub is_user: bool,
}

impl Participant {
    /// Read a participant object.
    ///
    /// Current field names win over legacy camelCase ones when both appear.
    pub fn from_value(value: &Value) -> Option<Self> {
        if let Some(name) = value.as_str() {
            return Some(Self {
                name: name.to_string(),
                agent_class: None,
                is_user: false,
            });
        }
        let name = value.get("name").and_then(Value::as_str)?;
        let agent_class = first_str(value, &["agent_class", "agent_type", "agentType"])
            .map(canonical_agent_class);
        let input_mode = first_str(value, &["human_input_mode", "humanInputMode"]);
        let is_user = input_mode.is_some_and(|mode| mode.eq_ignore_ascii_case("always"))
            || matches!(agent_class.as_deref(), Some("user_proxy" | "rag_user_proxy"));
        Some(Self {
            name: name.to_string(),
            agent_class,
            is_user,
        })
    }
}

/// Map a possibly-legacy agent class onto its current name.
pub fn canonical_agent_class(class: &str) -> String {
    AGENT_CLASS_ALIASES
        .iter()
        .find(|(legacy, _)| *legacy == class)
        .map_or(class, |(_, current)| *current)
        .to_string()
}

/// Post-run timeline report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    #[serde(default)]
    pub entries: Vec<Value>,
    #[serde(default)]
    pub cost_timeline: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Timeline {
    /// Read a `{"type":"timeline", ...}` object, fields optionally nested
    /// under `content`.
    pub fn from_value(value: &Value) -> Self {
        let body = value.get("content").filter(|c| c.is_object()).unwrap_or(value);
        let list = |key: &str| {
            body.get(key)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
        };
        Self {
            entries: list("timeline"),
            cost_timeline: list("cost_timeline"),
            summary: body.get("summary").cloned(),
            metadata: body.get("metadata").cloned(),
        }
    }
}

fn first_str<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| value.get(*key).and_then(Value::as_str))
}

/// Registry with every conversation handler, most specific first.
pub fn standard_registry() -> Result<HandlerRegistry<ChatEntry, ChatUpdate>, RegistryError> {
    let mut registry = HandlerRegistry::new();
    registry.register(InputRequestHandler)?;
    registry.register(InputResponseHandler)?;
    registry.register(RunCompletionHandler)?;
    registry.register(ErrorHandler)?;
    registry.register(TextHandler)?;
    registry.register(ToolCallHandler)?;
    registry.register(ToolResponseHandler)?;
    registry.register(CodeExecutionReplyHandler)?;
    registry.register(SelectSpeakerHandler)?;
    registry.register(TerminationHandler)?;
    registry.register(PrintHandler)?;
    Ok(registry)
}

/// Conversation processor with the standard registry and legacy aliases.
pub fn standard_processor() -> Result<ChatProcessor, RegistryError> {
    Ok(MessageProcessor::new(standard_registry()?).with_aliases(CHAT_TAG_ALIASES))
}

/// Dedup key: variant tag, sender, recipient, request id, and
/// whitespace-collapsed body.
///
/// Envelope ids and timestamps are excluded so redeliveries collide. The
/// request id is kept: a repeated prompt with a fresh id is a new question.
pub fn message_signature(entry: &ChatEntry) -> String {
    let message = &entry.message;
    let request_id = match message {
        ChatMessage::InputRequest(request) => request.request_id.as_str(),
        ChatMessage::InputResponse { request_id, .. } => request_id.as_str(),
        _ => "",
    };
    let body = collapse_whitespace(&message.summary_text());
    signature_digest(&[
        message.kind(),
        message.sender().unwrap_or_default(),
        message.recipient().unwrap_or_default(),
        request_id,
        &body,
    ])
}

/// Build the `input_response` frame answering `request_id`.
pub fn input_response_frame(request_id: &str, text: &str, image_url: Option<&str>) -> Envelope {
    let content = MessageContent::Text(text.to_string());
    let content = match image_url {
        Some(url) => content.with_image(url),
        None => content,
    };
    Envelope::outbound("input_response")
        .with_field("request_id", request_id)
        .with_field("data", content.to_wire())
}
