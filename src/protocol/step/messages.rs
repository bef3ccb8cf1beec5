//! Step-debug message model.

use crate::breakpoint::Breakpoint;
use crate::protocol::chat::entry_id;
use crate::protocol::registry::FallbackMessage;
use crate::protocol::{ActiveRequest, Envelope};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Snapshot reported by `debug_stats`.
///
/// Fields the debugger adds beyond the known ones are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugStats {
    #[serde(default)]
    pub events_processed: u64,
    #[serde(default)]
    pub total_events: u64,
    #[serde(default)]
    pub step_mode: bool,
    #[serde(default)]
    pub auto_continue: bool,
    #[serde(default)]
    pub breakpoints: Vec<Breakpoint>,
    #[serde(default)]
    pub event_history_count: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One command in the help catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelpCommand {
    pub command: String,
    #[serde(default)]
    pub description: String,
}

/// A titled group of commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelpGroup {
    pub title: String,
    #[serde(default)]
    pub commands: Vec<HelpCommand>,
}

/// Closed set of debug messages plus an unknown fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepMessage {
    Print {
        text: String,
    },
    InputRequest(ActiveRequest),
    InputResponse {
        request_id: String,
        data: String,
    },
    BreakpointAdded {
        breakpoint: Breakpoint,
    },
    BreakpointRemoved {
        breakpoint: Breakpoint,
    },
    BreakpointCleared {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    BreakpointsList {
        breakpoints: Vec<Breakpoint>,
    },
    /// A runtime event the debugger paused on or is describing.
    EventInfo {
        event: Value,
    },
    Stats {
        stats: DebugStats,
    },
    Help {
        help: Vec<HelpGroup>,
    },
    Error {
        error: String,
    },
    Unknown {
        message_type: String,
        raw: Value,
    },
}

impl StepMessage {
    /// Wire tag of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Print { .. } => "debug_print",
            Self::InputRequest(_) => "debug_input_request",
            Self::InputResponse { .. } => "debug_input_response",
            Self::BreakpointAdded { .. } => "debug_breakpoint_added",
            Self::BreakpointRemoved { .. } => "debug_breakpoint_removed",
            Self::BreakpointCleared { .. } => "debug_breakpoint_cleared",
            Self::BreakpointsList { .. } => "debug_breakpoints_list",
            Self::EventInfo { .. } => "debug_event_info",
            Self::Stats { .. } => "debug_stats",
            Self::Help { .. } => "debug_help",
            Self::Error { .. } => "debug_error",
            Self::Unknown { .. } => "unknown",
        }
    }

    /// One-line description for console output.
    pub fn summary_text(&self) -> String {
        match self {
            Self::Print { text } => text.clone(),
            Self::InputRequest(request) => request.prompt.clone(),
            Self::InputResponse { data, .. } => data.clone(),
            Self::BreakpointAdded { breakpoint } => {
                format!("breakpoint added: {}", breakpoint.display_name())
            }
            Self::BreakpointRemoved { breakpoint } => {
                format!("breakpoint removed: {}", breakpoint.display_name())
            }
            Self::BreakpointCleared { message } => message
                .clone()
                .unwrap_or_else(|| "breakpoints cleared".to_string()),
            Self::BreakpointsList { breakpoints } if breakpoints.is_empty() => {
                "no breakpoints".to_string()
            }
            Self::BreakpointsList { breakpoints } => breakpoints
                .iter()
                .map(Breakpoint::display_name)
                .collect::<Vec<_>>()
                .join(", "),
            Self::EventInfo { event } => match event.get("type").and_then(Value::as_str) {
                Some(kind) => format!("event: {kind}"),
                None => event.to_string(),
            },
            Self::Stats { stats } => format!(
                "{}/{} events, step mode {}",
                stats.events_processed,
                stats.total_events,
                if stats.step_mode { "on" } else { "off" }
            ),
            Self::Help { help } => help
                .iter()
                .map(|group| group.title.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            Self::Error { error } => error.clone(),
            Self::Unknown { raw, .. } => raw.to_string(),
        }
    }
}

/// A debug message with its envelope metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub message: StepMessage,
}

impl StepEntry {
    pub fn from_envelope(envelope: &Envelope, message: StepMessage) -> Self {
        Self {
            id: entry_id(envelope),
            timestamp: envelope.timestamp().map(str::to_string),
            message,
        }
    }
}

impl FallbackMessage for StepEntry {
    fn unknown(envelope: &Envelope) -> Self {
        Self::from_envelope(
            envelope,
            StepMessage::Unknown {
                message_type: envelope.kind().to_string(),
                raw: envelope.to_value(),
            },
        )
    }
}
