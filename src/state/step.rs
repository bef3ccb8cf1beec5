use crate::breakpoint::Breakpoint;
use crate::protocol::chat::{Participant, Timeline};
use crate::protocol::step::{DebugStats, HelpGroup, StepEntry};
use crate::protocol::ActiveRequest;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Step-debug channel state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepDebugState {
    /// Append-only until cleared or reset.
    pub events: Vec<StepEntry>,
    /// Runtime event the debugger is paused on.
    pub current_event: Option<Value>,
    pub active: bool,
    pub show: bool,
    pub error: Option<String>,
    pub active_request: Option<ActiveRequest>,
    pub participants: Vec<Participant>,
    pub timeline: Option<Timeline>,
    pub breakpoints: Vec<Breakpoint>,
    pub step_mode: bool,
    pub auto_continue: bool,
    pub stats: Option<DebugStats>,
    pub help: Option<Vec<HelpGroup>>,
    /// Control code typed but not yet sent.
    pub pending_control_input: Option<String>,
}

/// Bulk patch for the non-history fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepDebugPatch {
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub show: Option<bool>,
    #[serde(default)]
    pub error: Option<Option<String>>,
    #[serde(default)]
    pub active_request: Option<Option<ActiveRequest>>,
    #[serde(default)]
    pub current_event: Option<Option<Value>>,
    #[serde(default)]
    pub breakpoints: Option<Vec<Breakpoint>>,
    #[serde(default)]
    pub step_mode: Option<bool>,
    #[serde(default)]
    pub auto_continue: Option<bool>,
    #[serde(default)]
    pub help: Option<Option<Vec<HelpGroup>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepAction {
    Reset {
        #[serde(default)]
        initial: Option<Box<StepDebugState>>,
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
    /// Append an event. `make_it_current` also moves the paused-on pointer,
    /// `is_workflow_end` also deactivates, both in this one transition.
    AddEvent {
        event: StepEntry,
        #[serde(default)]
        current: Option<Value>,
        #[serde(default)]
        make_it_current: bool,
        #[serde(default)]
        is_workflow_end: bool,
    },
    RemoveEvent {
        id: String,
    },
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
    SetBreakpoints {
        breakpoints: Vec<Breakpoint>,
    },
    /// Store a stats snapshot and mirror its mode flags.
    SetStats {
        stats: DebugStats,
    },
    SetHelp {
        help: Option<Vec<HelpGroup>>,
    },
    SetPendingControlInput {
        input: Option<String>,
    },
    SetState {
        patch: StepDebugPatch,
    },
    Done,
    #[serde(other)]
    Unknown,
}

pub fn reduce_step_debug(state: StepDebugState, action: StepAction) -> StepDebugState {
    match action {
        StepAction::Reset { initial } => initial.map(|s| *s).unwrap_or_default(),
        StepAction::SetActive { active } => StepDebugState { active, ..state },
        StepAction::SetShow { show } => StepDebugState { show, ..state },
        StepAction::SetError { error } => StepDebugState { error, ..state },
        StepAction::AddEvent {
            event,
            current,
            make_it_current,
            is_workflow_end,
        } => {
            let mut events = state.events;
            events.push(event);
            StepDebugState {
                events,
                current_event: if make_it_current {
                    current
                } else {
                    state.current_event
                },
                active: state.active && !is_workflow_end,
                active_request: if is_workflow_end {
                    None
                } else {
                    state.active_request
                },
                ..state
            }
        }
        StepAction::RemoveEvent { id } => {
            let mut events = state.events;
            events.retain(|entry| entry.id != id);
            StepDebugState { events, ..state }
        }
        StepAction::Clear => StepDebugState {
            events: Vec::new(),
            current_event: None,
            error: None,
            active_request: None,
            pending_control_input: None,
            ..state
        },
        StepAction::SetParticipants { participants } => StepDebugState {
            participants,
            ..state
        },
        StepAction::SetActiveRequest { request } => StepDebugState {
            active_request: request,
            ..state
        },
        StepAction::SetTimeline { timeline } => StepDebugState { timeline, ..state },
        StepAction::SetBreakpoints { breakpoints } => StepDebugState {
            breakpoints,
            ..state
        },
        StepAction::SetStats { stats } => StepDebugState {
            step_mode: stats.step_mode,
            auto_continue: stats.auto_continue,
            stats: Some(stats),
            ..state
        },
        StepAction::SetHelp { help } => StepDebugState { help, ..state },
        StepAction::SetPendingControlInput { input } => StepDebugState {
            pending_control_input: input,
            ..state
        },
        StepAction::SetState { patch } => StepDebugState {
            active: patch.active.unwrap_or(state.active),
            show: patch.show.unwrap_or(state.show),
            error: patch.error.unwrap_or(state.error),
            active_request: patch.active_request.unwrap_or(state.active_request),
            current_event: patch.current_event.unwrap_or(state.current_event),
            breakpoints: patch.breakpoints.unwrap_or(state.breakpoints),
            step_mode: patch.step_mode.unwrap_or(state.step_mode),
            auto_continue: patch.auto_continue.unwrap_or(state.auto_continue),
            help: patch.help.unwrap_or(state.help),
            ..state
        },
        StepAction::Done => StepDebugState {
            active: false,
            active_request: None,
            pending_control_input: None,
            ..state
        },
        StepAction::Unknown => state,
    }
}
