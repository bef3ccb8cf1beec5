//! Conversation handlers, one per message tag.

use super::messages::{ChatEntry, ChatMessage, MessageContent, Role, ToolCall, ToolResponse};
use super::{ChatUpdate, Participant, Timeline};
use crate::protocol::markers::{detect_marker, WorkflowMarker};
use crate::protocol::registry::{ControlAction, MessageHandler, ProcessContext, ProcessingResult};
use crate::protocol::{value_text, ActiveRequest, Envelope, RequestChange};
use serde_json::Value;

type ChatResult = ProcessingResult<ChatEntry, ChatUpdate>;

fn entry(envelope: &Envelope, message: ChatMessage) -> ChatEntry {
    ChatEntry::from_envelope(envelope, message)
}

fn owned_str(envelope: &Envelope, key: &str) -> Option<String> {
    envelope.lookup_str(key).map(str::to_string)
}

/// Body text: a top-level string `content`, or `content.content` when
/// `content` is an object.
fn body_value(envelope: &Envelope) -> Option<&Value> {
    match envelope.get("content")? {
        Value::Object(inner) => inner.get("content").filter(|v| !v.is_null()),
        Value::Null => None,
        other => Some(other),
    }
}

fn role_for(envelope: &Envelope, sender: Option<&str>) -> Role {
    match envelope.lookup_str("role") {
        Some("user") => return Role::User,
        Some("system") => return Role::System,
        Some("assistant" | "agent") => return Role::Agent,
        _ => {}
    }
    match sender {
        Some("user" | "user_proxy" | "human") => Role::User,
        Some("system") => Role::System,
        _ => Role::Agent,
    }
}

/// Plain and multi-part text from agents, users, and the system.
pub struct TextHandler;

impl MessageHandler<ChatEntry, ChatUpdate> for TextHandler {
    fn name(&self) -> &'static str {
        "text"
    }

    fn message_types(&self) -> &'static [&'static str] {
        &["text"]
    }

    fn handle(&self, envelope: &Envelope, _ctx: &ProcessContext) -> Option<ChatResult> {
        let content = MessageContent::from_value(body_value(envelope)?)?;
        let sender = owned_str(envelope, "sender");
        let message = ChatMessage::Text {
            role: role_for(envelope, sender.as_deref()),
            sender,
            recipient: owned_str(envelope, "recipient"),
            content,
        };
        Some(ChatResult::message(entry(envelope, message)).with_control(ControlAction::ScrollToLatest))
    }
}

/// Tool invocations requested by an agent.
pub struct ToolCallHandler;

impl ToolCallHandler {
    fn parse_call(value: &Value) -> Option<ToolCall> {
        let function = value.get("function").unwrap_or(value);
        let name = function.get("name").and_then(Value::as_str)?;
        let arguments = match function.get("arguments") {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        Some(ToolCall {
            id: value.get("id").and_then(Value::as_str).map(str::to_string),
            name: name.to_string(),
            arguments,
        })
    }
}

impl MessageHandler<ChatEntry, ChatUpdate> for ToolCallHandler {
    fn name(&self) -> &'static str {
        "tool_call"
    }

    fn message_types(&self) -> &'static [&'static str] {
        &["tool_call"]
    }

    fn handle(&self, envelope: &Envelope, _ctx: &ProcessContext) -> Option<ChatResult> {
        let tool_calls = envelope
            .lookup("tool_calls")?
            .as_array()?
            .iter()
            .map(Self::parse_call)
            .collect::<Option<Vec<_>>>()?;
        let message = ChatMessage::ToolCall {
            sender: owned_str(envelope, "sender"),
            recipient: owned_str(envelope, "recipient"),
            tool_calls,
        };
        Some(ChatResult::message(entry(envelope, message)).with_control(ControlAction::ScrollToLatest))
    }
}

/// Tool outputs sent back to the caller.
pub struct ToolResponseHandler;

impl MessageHandler<ChatEntry, ChatUpdate> for ToolResponseHandler {
    fn name(&self) -> &'static str {
        "tool_response"
    }

    fn message_types(&self) -> &'static [&'static str] {
        &["tool_response"]
    }

    fn handle(&self, envelope: &Envelope, _ctx: &ProcessContext) -> Option<ChatResult> {
        let responses = match envelope.lookup("tool_responses") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    Some(ToolResponse {
                        tool_call_id: item
                            .get("tool_call_id")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                        content: value_text(item.get("content")?),
                    })
                })
                .collect::<Option<Vec<_>>>()?,
            Some(_) => return None,
            // Single-response shape: `tool_call_id` + body.
            None => vec![ToolResponse {
                tool_call_id: Some(owned_str(envelope, "tool_call_id")?),
                content: value_text(body_value(envelope)?),
            }],
        };
        let message = ChatMessage::ToolResponse {
            sender: owned_str(envelope, "sender"),
            recipient: owned_str(envelope, "recipient"),
            responses,
        };
        Some(ChatResult::message(entry(envelope, message)))
    }
}

/// Result of executing a code block.
pub struct CodeExecutionReplyHandler;

impl MessageHandler<ChatEntry, ChatUpdate> for CodeExecutionReplyHandler {
    fn name(&self) -> &'static str {
        "code_execution_reply"
    }

    fn message_types(&self) -> &'static [&'static str] {
        &["code_execution_reply"]
    }

    fn handle(&self, envelope: &Envelope, _ctx: &ProcessContext) -> Option<ChatResult> {
        let output = match envelope.lookup("output") {
            Some(Value::String(text)) => text.clone(),
            _ => value_text(body_value(envelope)?),
        };
        let message = ChatMessage::CodeExecutionReply {
            sender: owned_str(envelope, "sender"),
            recipient: owned_str(envelope, "recipient"),
            output,
            exit_code: envelope.lookup("exit_code").and_then(Value::as_i64),
        };
        Some(ChatResult::message(entry(envelope, message)))
    }
}

/// Group-chat speaker selection.
pub struct SelectSpeakerHandler;

impl MessageHandler<ChatEntry, ChatUpdate> for SelectSpeakerHandler {
    fn name(&self) -> &'static str {
        "select_speaker"
    }

    fn message_types(&self) -> &'static [&'static str] {
        &["select_speaker"]
    }

    fn handle(&self, envelope: &Envelope, _ctx: &ProcessContext) -> Option<ChatResult> {
        let agents = envelope
            .lookup("agents")?
            .as_array()?
            .iter()
            .map(|agent| Participant::from_value(agent).map(|p| p.name))
            .collect::<Option<Vec<_>>>()?;
        let selected = owned_str(envelope, "selected_speaker").or_else(|| owned_str(envelope, "speaker"));
        let message = ChatMessage::SelectSpeaker { agents, selected };
        Some(ChatResult::message(entry(envelope, message)))
    }
}

/// A chat reached its termination condition.
pub struct TerminationHandler;

impl MessageHandler<ChatEntry, ChatUpdate> for TerminationHandler {
    fn name(&self) -> &'static str {
        "termination"
    }

    fn message_types(&self) -> &'static [&'static str] {
        &["termination"]
    }

    fn handle(&self, envelope: &Envelope, _ctx: &ProcessContext) -> Option<ChatResult> {
        let reason = owned_str(envelope, "termination_reason").or_else(|| owned_str(envelope, "reason"));
        Some(ChatResult::message(entry(
            envelope,
            ChatMessage::Termination { reason },
        )))
    }
}

/// The runner asks the user for input.
pub struct InputRequestHandler;

impl MessageHandler<ChatEntry, ChatUpdate> for InputRequestHandler {
    fn name(&self) -> &'static str {
        "input_request"
    }

    fn message_types(&self) -> &'static [&'static str] {
        &["input_request"]
    }

    fn handle(&self, envelope: &Envelope, _ctx: &ProcessContext) -> Option<ChatResult> {
        let request = ActiveRequest::from_envelope(envelope)?;
        let update = ChatUpdate {
            active_request: Some(RequestChange::Set(request.clone())),
            ..ChatUpdate::default()
        };
        Some(
            ChatResult::message(entry(envelope, ChatMessage::InputRequest(request)))
                .with_update(update)
                .with_control(ControlAction::FocusInput),
        )
    }
}

/// Echo of the user's answer.
pub struct InputResponseHandler;

impl MessageHandler<ChatEntry, ChatUpdate> for InputResponseHandler {
    fn name(&self) -> &'static str {
        "input_response"
    }

    fn message_types(&self) -> &'static [&'static str] {
        &["input_response"]
    }

    fn handle(&self, envelope: &Envelope, ctx: &ProcessContext) -> Option<ChatResult> {
        let request_id = owned_str(envelope, "request_id").or_else(|| ctx.request_id.clone())?;
        let data = envelope.lookup("data").or_else(|| envelope.lookup("response"))?;
        let mut content = MessageContent::from_value(data)?;
        if let Some(url) = ctx.image_url.as_deref() {
            content = content.with_image(url);
        }
        let update = ChatUpdate {
            active_request: Some(RequestChange::Resolve {
                request_id: request_id.clone(),
            }),
            ..ChatUpdate::default()
        };
        let message = ChatMessage::InputResponse {
            request_id,
            content,
        };
        Some(ChatResult::message(entry(envelope, message)).with_update(update))
    }
}

/// Final summary of a run.
pub struct RunCompletionHandler;

impl MessageHandler<ChatEntry, ChatUpdate> for RunCompletionHandler {
    fn name(&self) -> &'static str {
        "run_completion"
    }

    fn message_types(&self) -> &'static [&'static str] {
        &["run_completion"]
    }

    fn handle(&self, envelope: &Envelope, _ctx: &ProcessContext) -> Option<ChatResult> {
        let message = ChatMessage::RunCompletion {
            summary: envelope.lookup("summary").map(value_text),
            last_speaker: owned_str(envelope, "last_speaker"),
            cost: envelope.lookup("cost").cloned(),
        };
        let update = ChatUpdate {
            active_request: Some(RequestChange::Clear),
            ..ChatUpdate::default()
        };
        Some(
            ChatResult::message(entry(envelope, message))
                .with_update(update)
                .ending_workflow(),
        )
    }
}

/// Failure reported by the runner. Does not end the session by itself.
pub struct ErrorHandler;

impl MessageHandler<ChatEntry, ChatUpdate> for ErrorHandler {
    fn name(&self) -> &'static str {
        "error"
    }

    fn message_types(&self) -> &'static [&'static str] {
        &["error"]
    }

    fn handle(&self, envelope: &Envelope, _ctx: &ProcessContext) -> Option<ChatResult> {
        let error = match envelope.lookup("error") {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Object(map)) => value_text(map.get("message")?),
            _ => owned_str(envelope, "message")?,
        };
        let update = ChatUpdate {
            error: Some(error.clone()),
            ..ChatUpdate::default()
        };
        Some(ChatResult::message(entry(envelope, ChatMessage::Error { error })).with_update(update))
    }
}

/// Raw runner output.
///
/// Besides plain text, prints carry workflow markers and embedded JSON
/// reports (participants, timeline) that only update state.
pub struct PrintHandler;

impl PrintHandler {
    fn text(envelope: &Envelope) -> Option<String> {
        if let Some(data) = envelope.lookup("data") {
            return Some(value_text(data));
        }
        if let Some(objects) = envelope.lookup("objects").and_then(Value::as_array) {
            let sep = envelope.lookup_str("sep").unwrap_or(" ");
            return Some(objects.iter().map(value_text).collect::<Vec<_>>().join(sep));
        }
        body_value(envelope).map(value_text)
    }

    fn embedded_report(text: &str) -> Option<ChatResult> {
        let trimmed = text.trim();
        if !trimmed.starts_with('{') {
            return None;
        }
        let report: Value = serde_json::from_str(trimmed).ok()?;
        if let Some(list) = report.get("participants").and_then(Value::as_array) {
            let participants = list.iter().filter_map(Participant::from_value).collect();
            return Some(ChatResult::update(ChatUpdate {
                participants: Some(participants),
                ..ChatUpdate::default()
            }));
        }
        if report.get("type").and_then(Value::as_str) == Some("timeline") {
            return Some(ChatResult::update(ChatUpdate {
                timeline: Some(Timeline::from_value(&report)),
                ..ChatUpdate::default()
            }));
        }
        None
    }
}

impl MessageHandler<ChatEntry, ChatUpdate> for PrintHandler {
    fn name(&self) -> &'static str {
        "print"
    }

    fn message_types(&self) -> &'static [&'static str] {
        &["print"]
    }

    fn handle(&self, envelope: &Envelope, _ctx: &ProcessContext) -> Option<ChatResult> {
        let text = Self::text(envelope)?;
        if let Some(report) = Self::embedded_report(&text) {
            return Some(report);
        }
        let marker = detect_marker(&text);
        let message = ChatMessage::Print { text: text.clone() };
        let result = ChatResult::message(entry(envelope, message));
        Some(match marker {
            Some(WorkflowMarker::Started) => result
                .with_update(ChatUpdate {
                    active: Some(true),
                    ..ChatUpdate::default()
                })
                .with_control(ControlAction::WorkflowStarted),
            Some(WorkflowMarker::Failed) => result
                .with_update(ChatUpdate {
                    error: Some(text.trim().to_string()),
                    ..ChatUpdate::default()
                })
                .ending_workflow(),
            Some(_) => result.ending_workflow(),
            None => result,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::protocol::chat::{standard_processor, ChatEntry, ChatMessage, ChatUpdate, MessageContent, Role};
    use crate::protocol::registry::{ControlAction, ProcessContext, ProcessingResult};
    use crate::protocol::{ActiveRequest, RequestChange};
    use serde_json::{json, Value};

    fn run(payload: Value) -> ProcessingResult<ChatEntry, ChatUpdate> {
        run_with(payload, &ProcessContext::default())
    }

    fn run_with(payload: Value, ctx: &ProcessContext) -> ProcessingResult<ChatEntry, ChatUpdate> {
        standard_processor()
            .expect("processor")
            .process(payload, ctx)
            .expect("processed")
            .expect("result")
    }

    fn message(payload: Value) -> ChatMessage {
        run(payload).message.expect("message").message
    }

    #[test]
    fn input_request_sets_active_request() {
        let result = run(json!({"type": "input_request", "request_id": "r1", "prompt": "Name?"}));
        let expected = ActiveRequest::new("r1", "Name?");
        assert_eq!(
            result.message.map(|m| m.message),
            Some(ChatMessage::InputRequest(expected.clone()))
        );
        assert_eq!(result.update.active_request, Some(RequestChange::Set(expected)));
        assert_eq!(result.control, Some(ControlAction::FocusInput));
    }

    #[test]
    fn input_request_missing_prompt_falls_back_to_unknown() {
        let result = run(json!({"type": "input_request", "request_id": "r1"}));
        assert!(matches!(
            result.message.map(|m| m.message),
            Some(ChatMessage::Unknown { message_type, .. }) if message_type == "input_request"
        ));
        assert!(result.update.is_empty());
    }

    #[test]
    fn text_reads_nested_content_and_infers_role() {
        let msg = message(json!({
            "type": "text",
            "content": {"uuid": "u1", "content": "hi", "sender": "user", "recipient": "assistant"}
        }));
        assert_eq!(
            msg,
            ChatMessage::Text {
                role: Role::User,
                sender: Some("user".into()),
                recipient: Some("assistant".into()),
                content: MessageContent::Text("hi".into()),
            }
        );
        let entry = run(json!({"type": "text", "content": {"uuid": "u1", "content": "x"}}))
            .message
            .expect("entry");
        assert_eq!(entry.id, "u1");
    }

    #[test]
    fn legacy_auto_reply_tag_is_text() {
        let msg = message(json!({"type": "using_auto_reply", "content": "auto", "sender": "bot"}));
        assert!(matches!(msg, ChatMessage::Text { role: Role::Agent, .. }));
    }

    #[test]
    fn tool_call_accepts_function_wrapped_calls() {
        let msg = message(json!({
            "type": "tool_call",
            "content": {
                "sender": "assistant",
                "tool_calls": [
                    {"id": "c1", "function": {"name": "search", "arguments": "{\"q\":1}"}},
                    {"name": "now", "arguments": {"tz": "UTC"}}
                ]
            }
        }));
        let ChatMessage::ToolCall { tool_calls, sender, .. } = msg else {
            panic!("expected tool call");
        };
        assert_eq!(sender.as_deref(), Some("assistant"));
        assert_eq!(tool_calls[0].name, "search");
        assert_eq!(tool_calls[0].id.as_deref(), Some("c1"));
        assert_eq!(tool_calls[1].arguments, r#"{"tz":"UTC"}"#);
    }

    #[test]
    fn tool_call_with_nameless_entry_is_declined() {
        let msg = message(json!({"type": "tool_call", "tool_calls": [{"arguments": "{}"}]}));
        assert!(matches!(msg, ChatMessage::Unknown { .. }));
    }

    #[test]
    fn tool_response_supports_list_and_single_shapes() {
        let msg = message(json!({
            "type": "tool_response",
            "content": {"tool_responses": [{"tool_call_id": "c1", "content": "42"}]}
        }));
        assert_eq!(msg.summary_text(), "42");
        let msg = message(json!({"type": "tool_response", "tool_call_id": "c2", "content": "ok"}));
        assert_eq!(msg.summary_text(), "ok");
    }

    #[test]
    fn legacy_code_execution_tag_resolves() {
        let msg = message(json!({
            "type": "execute_code_reply",
            "content": {"content": "exitcode: 0", "sender": "executor"},
            "exit_code": 0
        }));
        assert!(matches!(
            msg,
            ChatMessage::CodeExecutionReply { exit_code: Some(0), ref output, .. } if output == "exitcode: 0"
        ));
    }

    #[test]
    fn select_speaker_lists_agents() {
        let msg = message(json!({
            "type": "group_chat_run_chat",
            "content": {"agents": ["planner", {"name": "critic"}], "selected_speaker": "critic"}
        }));
        assert_eq!(
            msg,
            ChatMessage::SelectSpeaker {
                agents: vec!["planner".into(), "critic".into()],
                selected: Some("critic".into()),
            }
        );
    }

    #[test]
    fn run_completion_ends_workflow_and_clears_request() {
        let result = run(json!({"type": "run_completion", "summary": "done", "cost": {"usd": 0.1}}));
        assert!(result.is_workflow_end);
        assert_eq!(result.control, Some(ControlAction::WorkflowEnded));
        assert_eq!(result.update.active_request, Some(RequestChange::Clear));
    }

    #[test]
    fn error_message_sets_error_without_ending() {
        let result = run(json!({"type": "error", "error": {"message": "rate limited"}}));
        assert_eq!(result.update.error.as_deref(), Some("rate limited"));
        assert!(!result.is_workflow_end);
    }

    #[test]
    fn input_response_resolves_request_and_attaches_image() {
        let ctx = ProcessContext::default().with_image_url("https://img");
        let result = run_with(
            json!({"type": "input_response", "request_id": "r1", "data": "see attached"}),
            &ctx,
        );
        assert_eq!(
            result.update.active_request,
            Some(RequestChange::Resolve {
                request_id: "r1".into()
            })
        );
        let ChatMessage::InputResponse { content, .. } = result.message.expect("entry").message else {
            panic!("expected input response");
        };
        assert_eq!(content.plain_text(), "see attached [image]");
    }

    #[test]
    fn print_markers_drive_workflow_flags() {
        let started = run(json!({"type": "print", "data": "<Runner> - Starting workflow..."}));
        assert_eq!(started.control, Some(ControlAction::WorkflowStarted));
        assert_eq!(started.update.active, Some(true));

        let finished = run(json!({"type": "print", "content": {"objects": ["Workflow", "finished"]}}));
        assert!(finished.is_workflow_end);

        let failed = run(json!({"type": "print", "data": "Workflow execution failed: boom"}));
        assert!(failed.is_workflow_end);
        assert_eq!(failed.update.error.as_deref(), Some("Workflow execution failed: boom"));
    }

    #[test]
    fn print_with_participants_report_only_updates_state() {
        let report = json!({"participants": [{"name": "user", "humanInputMode": "ALWAYS"}, {"name": "bot"}]});
        let result = run(json!({"type": "print", "data": report.to_string()}));
        assert!(result.message.is_none());
        let participants = result.update.participants.expect("participants");
        assert_eq!(participants.len(), 2);
        assert!(participants[0].is_user);
    }

    #[test]
    fn print_with_timeline_report_sets_timeline() {
        let report = json!({"type": "timeline", "content": {"timeline": [{"agent": "a"}]}});
        let result = run(json!({"type": "print", "data": report.to_string()}));
        assert_eq!(result.update.timeline.expect("timeline").entries.len(), 1);
    }
}
