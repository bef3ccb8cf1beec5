use crate::protocol::chat::{ChatEntry, Participant, Timeline};
use crate::protocol::ActiveRequest;
use serde::{Deserialize, Serialize};

/// Conversation channel state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Append-only until cleared or reset.
    pub messages: Vec<ChatEntry>,
    pub active: bool,
    pub show: bool,
    pub error: Option<String>,
    pub active_request: Option<ActiveRequest>,
    pub participants: Vec<Participant>,
    pub timeline: Option<Timeline>,
}

/// Bulk patch for the non-history fields.
///
/// `Some` replaces the field; for nullable fields the inner option is the new
/// value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationPatch {
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub show: Option<bool>,
    #[serde(default)]
    pub error: Option<Option<String>>,
    #[serde(default)]
    pub active_request: Option<Option<ActiveRequest>>,
    #[serde(default)]
    pub participants: Option<Vec<Participant>>,
    #[serde(default)]
    pub timeline: Option<Option<Timeline>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatAction {
    /// Restore `initial`, or the default state.
    Reset {
        #[serde(default)]
        initial: Option<Box<ConversationState>>,
    },
    SetActive {
        active: bool,
    },
    SetShow {
        show: bool,
    },
    SetError {
        error: Option<String>,
    },
    /// Append a message; with `is_workflow_end` also marks the run inactive
    /// in the same transition.
    AddMessage {
        message: ChatEntry,
        #[serde(default)]
        is_workflow_end: bool,
    },
    RemoveMessage {
        id: String,
    },
    /// Drop history and transient fields, keep participants and flags.
    Clear,
    SetParticipants {
        participants: Vec<Participant>,
    },
    SetActiveRequest {
        request: Option<ActiveRequest>,
    },
    SetTimeline {
        timeline: Option<Timeline>,
    },
    SetState {
        patch: ConversationPatch,
    },
    /// Run finished normally. History stays for display.
    Done,
    #[serde(other)]
    Unknown,
}

pub fn reduce_conversation(state: ConversationState, action: ChatAction) -> ConversationState {
    match action {
        ChatAction::Reset { initial } => initial.map(|s| *s).unwrap_or_default(),
        ChatAction::SetActive { active } => ConversationState { active, ..state },
        ChatAction::SetShow { show } => ConversationState { show, ..state },
        ChatAction::SetError { error } => ConversationState { error, ..state },
        ChatAction::AddMessage {
            message,
            is_workflow_end,
        } => {
            let mut messages = state.messages;
            messages.push(message);
            ConversationState {
                messages,
                active: state.active && !is_workflow_end,
                active_request: if is_workflow_end {
                    None
                } else {
                    state.active_request
                },
                ..state
            }
        }
        ChatAction::RemoveMessage { id } => {
            let mut messages = state.messages;
            messages.retain(|entry| entry.id != id);
            ConversationState { messages, ..state }
        }
        ChatAction::Clear => ConversationState {
            messages: Vec::new(),
            error: None,
            active_request: None,
            timeline: None,
            ..state
        },
        ChatAction::SetParticipants { participants } => ConversationState {
            participants,
            ..state
        },
        ChatAction::SetActiveRequest { request } => ConversationState {
            active_request: request,
            ..state
        },
        ChatAction::SetTimeline { timeline } => ConversationState { timeline, ..state },
        ChatAction::SetState { patch } => ConversationState {
            active: patch.active.unwrap_or(state.active),
            show: patch.show.unwrap_or(state.show),
            error: patch.error.unwrap_or(state.error),
            active_request: patch.active_request.unwrap_or(state.active_request),
            participants: patch.participants.unwrap_or(state.participants),
            timeline: patch.timeline.unwrap_or(state.timeline),
            messages: state.messages,
        },
        ChatAction::Done => ConversationState {
            active: false,
            active_request: None,
            ..state
        },
        ChatAction::Unknown => state,
    }
}
