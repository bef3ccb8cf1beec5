use super::messages::{DebugStats, HelpGroup, StepEntry, StepMessage};
use super::{BreakpointChange, StepUpdate};
use crate::breakpoint::normalize_value;
use crate::protocol::markers::{detect_marker, WorkflowMarker};
use crate::protocol::registry::{ControlAction, MessageHandler, ProcessContext, ProcessingResult};
use crate::protocol::{value_text, ActiveRequest, Envelope, RequestChange};
use serde_json::Value;

type StepResult = ProcessingResult<StepEntry, StepUpdate>;

fn entry(envelope: &Envelope, message: StepMessage) -> StepEntry {
    StepEntry::from_envelope(envelope, message)
}

/// Text carried by `data`, `message`, or a string `content`.
fn text_field(envelope: &Envelope) -> Option<String> {
    ["data", "message"]
        .into_iter()
        .find_map(|key| envelope.lookup(key).map(value_text))
        .or_else(|| envelope.get("content").and_then(Value::as_str).map(str::to_string))
}

pub struct DebugPrintHandler;

impl MessageHandler<StepEntry, StepUpdate> for DebugPrintHandler {
    fn name(&self) -> &'static str {
        "debug_print"
    }

    fn message_types(&self) -> &'static [&'static str] {
        &["debug_print"]
    }

    fn handle(&self, envelope: &Envelope, _ctx: &ProcessContext) -> Option<StepResult> {
        let text = text_field(envelope)?;
        let marker = detect_marker(&text);
        let result = StepResult::message(entry(envelope, StepMessage::Print { text }));
        Some(match marker {
            Some(marker) if marker.is_end() => result.ending_workflow(),
            Some(WorkflowMarker::Started) => result
                .with_update(StepUpdate {
                    active: Some(true),
                    ..StepUpdate::default()
                })
                .with_control(ControlAction::WorkflowStarted),
            _ => result,
        })
    }
}

pub struct DebugInputRequestHandler;

impl MessageHandler<StepEntry, StepUpdate> for DebugInputRequestHandler {
    fn name(&self) -> &'static str {
        "debug_input_request"
    }

    fn message_types(&self) -> &'static [&'static str] {
        &["debug_input_request"]
    }

    fn handle(&self, envelope: &Envelope, _ctx: &ProcessContext) -> Option<StepResult> {
        let request = ActiveRequest::from_envelope(envelope)?;
        let update = StepUpdate {
            active_request: Some(RequestChange::Set(request.clone())),
            ..StepUpdate::default()
        };
        Some(
            StepResult::message(entry(envelope, StepMessage::InputRequest(request)))
                .with_update(update)
                .with_control(ControlAction::FocusInput),
        )
    }
}

pub struct DebugInputResponseHandler;

impl MessageHandler<StepEntry, StepUpdate> for DebugInputResponseHandler {
    fn name(&self) -> &'static str {
        "debug_input_response"
    }

    fn message_types(&self) -> &'static [&'static str] {
        &["debug_input_response"]
    }

    fn handle(&self, envelope: &Envelope, ctx: &ProcessContext) -> Option<StepResult> {
        let request_id = envelope
            .lookup_str("request_id")
            .map(str::to_string)
            .or_else(|| ctx.request_id.clone())?;
        let data = envelope.lookup("data").map(value_text).unwrap_or_default();
        let update = StepUpdate {
            active_request: Some(RequestChange::Resolve {
                request_id: request_id.clone(),
            }),
            ..StepUpdate::default()
        };
        let message = StepMessage::InputResponse { request_id, data };
        Some(StepResult::message(entry(envelope, message)).with_update(update))
    }
}

pub struct BreakpointAddedHandler;

impl MessageHandler<StepEntry, StepUpdate> for BreakpointAddedHandler {
    fn name(&self) -> &'static str {
        "debug_breakpoint_added"
    }

    fn message_types(&self) -> &'static [&'static str] {
        &["debug_breakpoint_added"]
    }

    fn handle(&self, envelope: &Envelope, _ctx: &ProcessContext) -> Option<StepResult> {
        let breakpoint = normalize_value(envelope.lookup("breakpoint")?)?;
        let update = StepUpdate {
            breakpoints: Some(BreakpointChange::Add {
                breakpoint: breakpoint.clone(),
            }),
            ..StepUpdate::default()
        };
        let message = StepMessage::BreakpointAdded { breakpoint };
        Some(StepResult::message(entry(envelope, message)).with_update(update))
    }
}

pub struct BreakpointRemovedHandler;

impl MessageHandler<StepEntry, StepUpdate> for BreakpointRemovedHandler {
    fn name(&self) -> &'static str {
        "debug_breakpoint_removed"
    }

    fn message_types(&self) -> &'static [&'static str] {
        &["debug_breakpoint_removed"]
    }

    fn handle(&self, envelope: &Envelope, _ctx: &ProcessContext) -> Option<StepResult> {
        let breakpoint = normalize_value(envelope.lookup("breakpoint")?)?;
        let update = StepUpdate {
            breakpoints: Some(BreakpointChange::Remove {
                breakpoint: breakpoint.clone(),
            }),
            ..StepUpdate::default()
        };
        let message = StepMessage::BreakpointRemoved { breakpoint };
        Some(StepResult::message(entry(envelope, message)).with_update(update))
    }
}

pub struct BreakpointClearedHandler;

impl MessageHandler<StepEntry, StepUpdate> for BreakpointClearedHandler {
    fn name(&self) -> &'static str {
        "debug_breakpoint_cleared"
    }

    fn message_types(&self) -> &'static [&'static str] {
        &["debug_breakpoint_cleared"]
    }

    fn handle(&self, envelope: &Envelope, _ctx: &ProcessContext) -> Option<StepResult> {
        let update = StepUpdate {
            breakpoints: Some(BreakpointChange::Clear),
            ..StepUpdate::default()
        };
        let message = StepMessage::BreakpointCleared {
            message: text_field(envelope),
        };
        Some(StepResult::message(entry(envelope, message)).with_update(update))
    }
}

/// Full breakpoint set. Elements may be strings or objects; one unreadable
/// element declines the whole list.
pub struct BreakpointsListHandler;

impl MessageHandler<StepEntry, StepUpdate> for BreakpointsListHandler {
    fn name(&self) -> &'static str {
        "debug_breakpoints_list"
    }

    fn message_types(&self) -> &'static [&'static str] {
        &["debug_breakpoints_list"]
    }

    fn handle(&self, envelope: &Envelope, _ctx: &ProcessContext) -> Option<StepResult> {
        let breakpoints = envelope
            .lookup("breakpoints")?
            .as_array()?
            .iter()
            .map(normalize_value)
            .collect::<Option<Vec<_>>>()?;
        let update = StepUpdate {
            breakpoints: Some(BreakpointChange::Replace {
                breakpoints: breakpoints.clone(),
            }),
            ..StepUpdate::default()
        };
        let message = StepMessage::BreakpointsList { breakpoints };
        Some(StepResult::message(entry(envelope, message)).with_update(update))
    }
}

/// Wraps the runtime event the debugger stopped on. A wrapped
/// `run_completion` ends the workflow.
pub struct EventInfoHandler;

impl MessageHandler<StepEntry, StepUpdate> for EventInfoHandler {
    fn name(&self) -> &'static str {
        "debug_event_info"
    }

    fn message_types(&self) -> &'static [&'static str] {
        &["debug_event_info"]
    }

    fn handle(&self, envelope: &Envelope, _ctx: &ProcessContext) -> Option<StepResult> {
        let event = match envelope.get("event").or_else(|| envelope.get("content")) {
            Some(event @ Value::Object(_)) => event.clone(),
            _ => return None,
        };
        let completes_run = event.get("type").and_then(Value::as_str) == Some("run_completion");
        let update = StepUpdate {
            current_event: Some(event.clone()),
            ..StepUpdate::default()
        };
        let result = StepResult::message(entry(envelope, StepMessage::EventInfo { event }))
            .with_update(update);
        Some(if completes_run {
            result.ending_workflow()
        } else {
            result.with_control(ControlAction::ScrollToLatest)
        })
    }
}

pub struct StatsHandler;

impl MessageHandler<StepEntry, StepUpdate> for StatsHandler {
    fn name(&self) -> &'static str {
        "debug_stats"
    }

    fn message_types(&self) -> &'static [&'static str] {
        &["debug_stats"]
    }

    fn handle(&self, envelope: &Envelope, _ctx: &ProcessContext) -> Option<StepResult> {
        let stats: DebugStats = serde_json::from_value(envelope.lookup("stats")?.clone()).ok()?;
        let update = StepUpdate {
            stats: Some(stats.clone()),
            step_mode: Some(stats.step_mode),
            auto_continue: Some(stats.auto_continue),
            ..StepUpdate::default()
        };
        Some(StepResult::message(entry(envelope, StepMessage::Stats { stats })).with_update(update))
    }
}

pub struct HelpHandler;

impl MessageHandler<StepEntry, StepUpdate> for HelpHandler {
    fn name(&self) -> &'static str {
        "debug_help"
    }

    fn message_types(&self) -> &'static [&'static str] {
        &["debug_help"]
    }

    fn handle(&self, envelope: &Envelope, _ctx: &ProcessContext) -> Option<StepResult> {
        let help: Vec<HelpGroup> = serde_json::from_value(envelope.lookup("help")?.clone()).ok()?;
        let update = StepUpdate {
            help: Some(help.clone()),
            ..StepUpdate::default()
        };
        Some(StepResult::message(entry(envelope, StepMessage::Help { help })).with_update(update))
    }
}

pub struct DebugErrorHandler;

impl MessageHandler<StepEntry, StepUpdate> for DebugErrorHandler {
    fn name(&self) -> &'static str {
        "debug_error"
    }

    fn message_types(&self) -> &'static [&'static str] {
        &["debug_error"]
    }

    fn handle(&self, envelope: &Envelope, _ctx: &ProcessContext) -> Option<StepResult> {
        let error = match envelope.lookup("error") {
            Some(Value::Object(map)) => value_text(map.get("message")?),
            Some(other) => value_text(other),
            None => text_field(envelope)?,
        };
        let update = StepUpdate {
            error: Some(error.clone()),
            ..StepUpdate::default()
        };
        Some(StepResult::message(entry(envelope, StepMessage::Error { error })).with_update(update))
    }
}

#[cfg(test)]
mod tests {
    use crate::breakpoint::Breakpoint;
    use crate::protocol::registry::{ControlAction, ProcessContext, ProcessingResult};
    use crate::protocol::step::{standard_processor, BreakpointChange, StepEntry, StepMessage, StepUpdate};
    use crate::protocol::RequestChange;
    use serde_json::{json, Value};

    fn run(payload: Value) -> ProcessingResult<StepEntry, StepUpdate> {
        standard_processor()
            .expect("processor")
            .process(payload, &ProcessContext::default())
            .expect("processed")
            .expect("result")
    }

    fn message(payload: Value) -> StepMessage {
        run(payload).message.expect("entry").message
    }

    #[test]
    fn input_request_sets_debug_active_request() {
        let result = run(json!({"type": "debug_input_request", "request_id": "d1", "prompt": "[c/s/q]?"}));
        assert!(matches!(
            result.update.active_request,
            Some(RequestChange::Set(ref req)) if req.request_id == "d1"
        ));
        assert_eq!(result.control, Some(ControlAction::FocusInput));
    }

    #[test]
    fn breakpoint_messages_map_to_set_changes() {
        let added = run(json!({"type": "debug_breakpoint_added", "breakpoint": "agent:Planner"}));
        assert_eq!(
            added.update.breakpoints,
            Some(BreakpointChange::Add {
                breakpoint: Breakpoint::agent("Planner")
            })
        );
        let removed = run(json!({
            "type": "debug_breakpoint_removed",
            "breakpoint": {"type": "event", "event_type": "tool_call"}
        }));
        assert_eq!(
            removed.update.breakpoints,
            Some(BreakpointChange::Remove {
                breakpoint: Breakpoint::event("tool_call")
            })
        );
        let cleared = run(json!({"type": "debug_breakpoint_cleared", "message": "All cleared"}));
        assert_eq!(cleared.update.breakpoints, Some(BreakpointChange::Clear));
    }

    #[test]
    fn breakpoints_list_accepts_mixed_forms() {
        let result = run(json!({
            "type": "debug_breakpoints_list",
            "breakpoints": ["*", {"type": "agent", "agent": "Critic"}, "tool_call"]
        }));
        assert_eq!(
            result.update.breakpoints,
            Some(BreakpointChange::Replace {
                breakpoints: vec![
                    Breakpoint::all(),
                    Breakpoint::agent("Critic"),
                    Breakpoint::event("tool_call"),
                ]
            })
        );
        let bad = message(json!({"type": "debug_breakpoints_list", "breakpoints": ["*", 3]}));
        assert!(matches!(bad, StepMessage::Unknown { .. }));
    }

    #[test]
    fn stats_update_flags() {
        let result = run(json!({
            "type": "debug_stats",
            "stats": {"events_processed": 2, "total_events": 5, "step_mode": true, "auto_continue": false,
                      "breakpoints": [], "event_history_count": 2}
        }));
        assert_eq!(result.update.step_mode, Some(true));
        assert_eq!(result.update.auto_continue, Some(false));
        assert_eq!(result.update.stats.map(|s| s.total_events), Some(5));
    }

    #[test]
    fn event_info_wrapping_run_completion_ends_workflow() {
        let result = run(json!({
            "type": "debug_event_info",
            "event": {"type": "run_completion", "summary": "ok"}
        }));
        assert!(result.is_workflow_end);
        assert_eq!(
            result.update.current_event,
            Some(json!({"type": "run_completion", "summary": "ok"}))
        );

        let paused = run(json!({"type": "debug_event_info", "event": {"type": "text", "sender": "a"}}));
        assert!(!paused.is_workflow_end);
        assert_eq!(paused.control, Some(ControlAction::ScrollToLatest));
    }

    #[test]
    fn help_and_error_payloads() {
        let help = run(json!({
            "type": "debug_help",
            "help": [{"title": "Flow", "commands": [{"command": "c", "description": "continue"}]}]
        }));
        assert_eq!(help.update.help.map(|groups| groups[0].commands.len()), Some(1));

        let error = run(json!({"type": "debug_error", "error": "bad breakpoint"}));
        assert_eq!(error.update.error.as_deref(), Some("bad breakpoint"));
        assert!(!error.is_workflow_end);
    }

    #[test]
    fn print_start_marker_activates_debugger() {
        let result = run(json!({"type": "debug_print", "data": "<Runner> - Starting workflow..."}));
        assert_eq!(result.update.active, Some(true));
        assert_eq!(result.control, Some(ControlAction::WorkflowStarted));
        assert!(!result.is_workflow_end);
    }

    #[test]
    fn print_end_marker_ends_workflow() {
        let result = run(json!({"type": "debug_print", "data": "Workflow stopped by user"}));
        assert!(result.is_workflow_end);
        let plain = run(json!({"type": "debug_print", "content": "hello"}));
        assert_eq!(
            plain.message.map(|e| e.message),
            Some(StepMessage::Print { text: "hello".into() })
        );
    }

    #[test]
    fn unregistered_debug_tag_is_unknown() {
        let msg = message(json!({"type": "debug_teleport"}));
        assert!(matches!(msg, StepMessage::Unknown { ref message_type, .. } if message_type == "debug_teleport"));
    }
}
