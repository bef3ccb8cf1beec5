//! Step-debug channel: `debug_*` messages, handlers, and control codes.

mod control;
mod handlers;
mod messages;

pub use control::{debug_input_response_frame, ControlCode, UnknownControlCode};
pub use handlers::{
    BreakpointAddedHandler, BreakpointClearedHandler, BreakpointRemovedHandler,
    BreakpointsListHandler, DebugErrorHandler, DebugInputRequestHandler,
    DebugInputResponseHandler, DebugPrintHandler, EventInfoHandler, HelpHandler, StatsHandler,
};
pub use messages::{DebugStats, HelpCommand, HelpGroup, StepEntry, StepMessage};

use super::registry::{HandlerRegistry, MessageProcessor};
use super::RequestChange;
use crate::breakpoint::Breakpoint;
use crate::error::RegistryError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix shared by every step-debug tag.
pub const STEP_TAG_PREFIX: &str = "debug_";

/// Processor specialized for the step-debug channel.
pub type StepProcessor = MessageProcessor<StepEntry, StepUpdate>;

/// How a processed message changes the breakpoint set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BreakpointChange {
    Add { breakpoint: Breakpoint },
    Remove { breakpoint: Breakpoint },
    Clear,
    Replace { breakpoints: Vec<Breakpoint> },
}

impl BreakpointChange {
    /// Apply to a breakpoint list. Adding an existing breakpoint is a no-op.
    pub fn apply(&self, mut current: Vec<Breakpoint>) -> Vec<Breakpoint> {
        match self {
            Self::Add { breakpoint } => {
                if !current.contains(breakpoint) {
                    current.push(breakpoint.clone());
                }
                current
            }
            Self::Remove { breakpoint } => {
                current.retain(|bp| bp != breakpoint);
                current
            }
            Self::Clear => Vec::new(),
            Self::Replace { breakpoints } => breakpoints.clone(),
        }
    }
}

/// State fragment produced by a step-debug handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_request: Option<RequestChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakpoints: Option<BreakpointChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<DebugStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<Vec<HelpGroup>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_continue: Option<bool>,
    /// The runtime event the debugger is paused on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_event: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

impl StepUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Whether `message_type` belongs to the step-debug channel.
pub fn is_step_tag(message_type: &str) -> bool {
    message_type.starts_with(STEP_TAG_PREFIX)
}

/// Registry with every step-debug handler.
pub fn standard_registry() -> Result<HandlerRegistry<StepEntry, StepUpdate>, RegistryError> {
    let mut registry = HandlerRegistry::new();
    registry.register(DebugInputRequestHandler)?;
    registry.register(DebugInputResponseHandler)?;
    registry.register(EventInfoHandler)?;
    registry.register(BreakpointAddedHandler)?;
    registry.register(BreakpointRemovedHandler)?;
    registry.register(BreakpointClearedHandler)?;
    registry.register(BreakpointsListHandler)?;
    registry.register(StatsHandler)?;
    registry.register(HelpHandler)?;
    registry.register(DebugErrorHandler)?;
    registry.register(DebugPrintHandler)?;
    Ok(registry)
}

pub fn standard_processor() -> Result<StepProcessor, RegistryError> {
    Ok(MessageProcessor::new(standard_registry()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakpoint_changes_ignore_descriptions_when_matching() {
        let list = BreakpointChange::Add {
            breakpoint: Breakpoint::event("tool_call"),
        }
        .apply(Vec::new());
        let list = BreakpointChange::Add {
            breakpoint: Breakpoint::event("tool_call").with_description("tools"),
        }
        .apply(list);
        assert_eq!(list.len(), 1);

        let list = BreakpointChange::Remove {
            breakpoint: Breakpoint::event("tool_call").with_description("other"),
        }
        .apply(list);
        assert!(list.is_empty());
    }

    #[test]
    fn replace_and_clear() {
        let all = vec![Breakpoint::all(), Breakpoint::agent("a")];
        let list = BreakpointChange::Replace {
            breakpoints: all.clone(),
        }
        .apply(vec![Breakpoint::event("x")]);
        assert_eq!(list, all);
        assert!(BreakpointChange::Clear.apply(list).is_empty());
    }

    #[test]
    fn registry_covers_every_debug_tag() {
        let registry = standard_registry().expect("registry");
        for tag in [
            "debug_print",
            "debug_input_request",
            "debug_input_response",
            "debug_breakpoint_added",
            "debug_breakpoint_removed",
            "debug_breakpoint_cleared",
            "debug_breakpoints_list",
            "debug_event_info",
            "debug_stats",
            "debug_help",
            "debug_error",
        ] {
            assert!(registry.find(tag).is_some(), "no handler for {tag}");
            assert!(is_step_tag(tag));
        }
        assert!(!is_step_tag("print"));
    }
}
