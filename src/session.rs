//! Run session controller.
//!
//! Glues the pieces into the inbound pipeline
//! `frame → decode → rpc resolve → dispatch → dedup → reduce` and the outbound
//! paths (input responses and debugger control codes). All processing for one
//! frame happens synchronously inside [`RunSession::handle_frame`]; the only
//! asynchronous part is awaiting a correlated reply, which callers do outside
//! the session.

use crate::dedup::{DedupCache, DedupOptions};
use crate::error::{ProcessError, RpcError, SessionError};
use crate::protocol::chat::{
    self, input_response_frame, message_signature, ChatEntry, ChatProcessor, ChatUpdate,
};
use crate::protocol::step::{
    self, debug_input_response_frame, is_step_tag, ControlCode, StepEntry, StepProcessor,
    StepUpdate,
};
use crate::protocol::{ControlAction, Envelope, ProcessContext, ProcessingResult, RawPayload};
use crate::rpc::{FrameSink, RpcCorrelator};
use crate::state::{
    reduce_conversation, reduce_step_debug, ChatAction, ConversationState, StepAction,
    StepDebugPatch, StepDebugState,
};
use crate::transport::TransportEvent;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tunables for [`RunSession::new`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionOptions {
    pub dedup: DedupOptions,
    /// How long to wait for the runner to acknowledge a control code.
    pub rpc_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            dedup: DedupOptions::default(),
            rpc_timeout: Duration::from_secs(30),
        }
    }
}

/// A processed inbound item, tagged by channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// The frame answered a pending request and was consumed by it.
    Reply { id: String },
    Chat(ChatEntry),
    Step(StepEntry),
}

/// What one inbound frame or transport event did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameOutcome {
    pub inbound: Option<Inbound>,
    pub control: Option<ControlAction>,
    pub is_workflow_end: bool,
    /// Dropped as a redelivery of an earlier message.
    pub duplicate: bool,
}

pub struct RunSession<S> {
    chat: ChatProcessor,
    step: StepProcessor,
    rpc: RpcCorrelator<S>,
    dedup: DedupCache,
    conversation: ConversationState,
    step_debug: StepDebugState,
    rpc_timeout: Duration,
}

impl<S: FrameSink> RunSession<S> {
    pub fn new(sink: S, options: SessionOptions) -> Result<Self, SessionError> {
        Ok(Self {
            chat: chat::standard_processor()?,
            step: step::standard_processor()?,
            rpc: RpcCorrelator::new(sink),
            dedup: DedupCache::new(options.dedup),
            conversation: ConversationState::default(),
            step_debug: StepDebugState::default(),
            rpc_timeout: options.rpc_timeout,
        })
    }

    pub fn conversation(&self) -> &ConversationState {
        &self.conversation
    }

    pub fn step_debug(&self) -> &StepDebugState {
        &self.step_debug
    }

    pub fn rpc(&self) -> &RpcCorrelator<S> {
        &self.rpc
    }

    pub fn sink(&self) -> &S {
        self.rpc.sink()
    }

    /// Apply an action to the conversation state.
    pub fn dispatch_chat(&mut self, action: ChatAction) {
        self.conversation = reduce_conversation(std::mem::take(&mut self.conversation), action);
    }

    /// Apply an action to the step-debug state.
    pub fn dispatch_step(&mut self, action: StepAction) {
        self.step_debug = reduce_step_debug(std::mem::take(&mut self.step_debug), action);
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    /// React to one transport event.
    pub fn handle_event(&mut self, event: TransportEvent) -> Result<FrameOutcome, ProcessError> {
        match event {
            TransportEvent::Frame(frame) => return self.handle_frame(frame),
            TransportEvent::Connected => {
                info!("session connected");
                self.dispatch_chat(ChatAction::SetError { error: None });
                self.dispatch_chat(ChatAction::SetShow { show: true });
                self.dispatch_step(StepAction::SetError { error: None });
                self.dispatch_step(StepAction::SetShow { show: true });
            }
            TransportEvent::Disconnected { reason } => {
                let banner = Some(format!("connection lost: {reason}"));
                self.dispatch_chat(ChatAction::SetError { error: banner.clone() });
                self.dispatch_step(StepAction::SetError { error: banner });
            }
            TransportEvent::Error(err) => {
                debug!(error = %err, "transport error");
                let banner = Some(err.to_string());
                self.dispatch_chat(ChatAction::SetError { error: banner.clone() });
                self.dispatch_step(StepAction::SetError { error: banner });
            }
            TransportEvent::GaveUp { attempts } => {
                warn!(attempts, "connection abandoned");
                self.rpc.cancel_all("connection abandoned");
                let banner = Some(format!("unable to reconnect after {attempts} attempts"));
                self.dispatch_chat(ChatAction::SetActive { active: false });
                self.dispatch_chat(ChatAction::SetActiveRequest { request: None });
                self.dispatch_chat(ChatAction::SetError { error: banner.clone() });
                self.dispatch_step(StepAction::SetActive { active: false });
                self.dispatch_step(StepAction::SetActiveRequest { request: None });
                self.dispatch_step(StepAction::SetError { error: banner });
            }
        }
        Ok(FrameOutcome::default())
    }

    /// Process one inbound frame with an empty context.
    pub fn handle_frame(
        &mut self,
        raw: impl Into<RawPayload>,
    ) -> Result<FrameOutcome, ProcessError> {
        self.handle_frame_with(raw, &ProcessContext::default())
    }

    /// Process one inbound frame.
    ///
    /// Malformed frames are returned as errors and leave state untouched.
    pub fn handle_frame_with(
        &mut self,
        raw: impl Into<RawPayload>,
        ctx: &ProcessContext,
    ) -> Result<FrameOutcome, ProcessError> {
        let raw = raw.into();
        if raw.is_blank() {
            return Ok(FrameOutcome::default());
        }
        let envelope =
            Envelope::decode(raw).inspect_err(|err| warn!(error = %err, "dropping frame"))?;
        if self.rpc.resolve(&envelope) {
            let id = envelope.correlation_id().unwrap_or_default();
            return Ok(FrameOutcome {
                inbound: Some(Inbound::Reply { id }),
                ..FrameOutcome::default()
            });
        }
        if is_step_tag(envelope.kind()) {
            let result = self.step.process_envelope(&envelope, ctx);
            Ok(self.apply_step(result))
        } else {
            let result = self.chat.process_envelope(&envelope, ctx);
            Ok(self.apply_chat(result, true))
        }
    }

    fn apply_chat(
        &mut self,
        result: ProcessingResult<ChatEntry, ChatUpdate>,
        dedup: bool,
    ) -> FrameOutcome {
        if dedup {
            if let Some(entry) = &result.message {
                if !self.dedup.should_emit(entry, message_signature) {
                    debug!(kind = entry.message.kind(), "suppressed duplicate message");
                    return FrameOutcome {
                        duplicate: true,
                        ..FrameOutcome::default()
                    };
                }
            }
        }

        let ProcessingResult {
            message,
            update,
            control,
            is_workflow_end,
        } = result;
        if let Some(change) = update.active_request {
            let request = change.apply(self.conversation.active_request.clone());
            self.dispatch_chat(ChatAction::SetActiveRequest { request });
        }
        if let Some(active) = update.active {
            self.dispatch_chat(ChatAction::SetActive { active });
        }
        if let Some(show) = update.show {
            self.dispatch_chat(ChatAction::SetShow { show });
        }
        if let Some(error) = update.error {
            self.dispatch_chat(ChatAction::SetError { error: Some(error) });
        }
        if let Some(participants) = update.participants {
            self.dispatch_chat(ChatAction::SetParticipants { participants });
        }
        if let Some(timeline) = update.timeline {
            self.dispatch_chat(ChatAction::SetTimeline {
                timeline: Some(timeline),
            });
        }
        match &message {
            Some(entry) => self.dispatch_chat(ChatAction::AddMessage {
                message: entry.clone(),
                is_workflow_end,
            }),
            None if is_workflow_end => self.dispatch_chat(ChatAction::Done),
            None => {}
        }

        FrameOutcome {
            inbound: message.map(Inbound::Chat),
            control,
            is_workflow_end,
            duplicate: false,
        }
    }

    fn apply_step(&mut self, result: ProcessingResult<StepEntry, StepUpdate>) -> FrameOutcome {
        let ProcessingResult {
            message,
            update,
            control,
            is_workflow_end,
        } = result;
        if let Some(change) = update.active_request {
            let request = change.apply(self.step_debug.active_request.clone());
            self.dispatch_step(StepAction::SetActiveRequest { request });
        }
        if let Some(change) = update.breakpoints {
            let breakpoints = change.apply(self.step_debug.breakpoints.clone());
            self.dispatch_step(StepAction::SetBreakpoints { breakpoints });
        }
        match update.stats {
            Some(stats) => self.dispatch_step(StepAction::SetStats { stats }),
            None if update.step_mode.is_some() || update.auto_continue.is_some() => {
                self.dispatch_step(StepAction::SetState {
                    patch: StepDebugPatch {
                        step_mode: update.step_mode,
                        auto_continue: update.auto_continue,
                        ..StepDebugPatch::default()
                    },
                });
            }
            None => {}
        }
        if let Some(active) = update.active {
            self.dispatch_step(StepAction::SetActive { active });
        }
        if let Some(help) = update.help {
            self.dispatch_step(StepAction::SetHelp { help: Some(help) });
        }
        if let Some(error) = update.error {
            self.dispatch_step(StepAction::SetError { error: Some(error) });
        }
        match &message {
            Some(entry) => self.dispatch_step(StepAction::AddEvent {
                event: entry.clone(),
                make_it_current: update.current_event.is_some(),
                current: update.current_event,
                is_workflow_end,
            }),
            None if is_workflow_end => self.dispatch_step(StepAction::Done),
            None => {}
        }

        FrameOutcome {
            inbound: message.map(Inbound::Step),
            control,
            is_workflow_end,
            duplicate: false,
        }
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    /// Answer the active conversation request.
    ///
    /// The answer is echoed into history locally, since runners don't send it
    /// back.
    pub fn respond(&mut self, text: &str, image_url: Option<&str>) -> Result<(), SessionError> {
        let request = self
            .conversation
            .active_request
            .clone()
            .ok_or(SessionError::NoActiveRequest)?;
        let frame = input_response_frame(&request.request_id, text, image_url);
        if !self.rpc.sink().send_frame(frame.to_frame()) {
            return Err(RpcError::NotConnected.into());
        }
        let ctx = ProcessContext::default().with_request_id(&request.request_id);
        let echo = self.chat.process_envelope(&frame, &ctx);
        self.apply_chat(echo, false);
        Ok(())
    }

    /// Send a control code for the active debugger prompt.
    ///
    /// Returns the pending acknowledgement; the prompt is cleared once the
    /// frame is on the wire.
    pub fn send_control(
        &mut self,
        code: &ControlCode,
    ) -> Result<impl Future<Output = Result<Value, RpcError>> + Send + 'static, SessionError> {
        self.answer_step(&code.to_data())
    }

    /// Send free text for the active debugger prompt.
    pub fn answer_step(
        &mut self,
        data: &str,
    ) -> Result<impl Future<Output = Result<Value, RpcError>> + Send + 'static, SessionError> {
        let request = self
            .step_debug
            .active_request
            .clone()
            .ok_or(SessionError::NoActiveRequest)?;
        let frame = debug_input_response_frame(&request.request_id, data);
        let reply = self
            .rpc
            .request_with_id(request.request_id.clone(), &frame, self.rpc_timeout)?;
        self.dispatch_step(StepAction::SetActiveRequest { request: None });
        self.dispatch_step(StepAction::SetPendingControlInput { input: None });
        Ok(reply)
    }

    /// Record a control code typed but not yet sent.
    pub fn stage_control_input(&mut self, input: impl Into<String>) {
        self.dispatch_step(StepAction::SetPendingControlInput {
            input: Some(input.into()),
        });
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Start over for a new run: cancel pending replies, forget seen
    /// messages, and reset both state machines to their defaults.
    pub fn reset(&mut self) {
        let cancelled = self.rpc.cancel_all("session reset");
        self.dedup.clear();
        self.dispatch_chat(ChatAction::Reset { initial: None });
        self.dispatch_step(StepAction::Reset { initial: None });
        info!(cancelled, "session reset");
    }

    /// Invalidate everything tied to the current connection. History stays.
    pub fn disconnect(&mut self) {
        self.rpc.cancel_all("disconnected");
        self.dispatch_chat(ChatAction::SetActiveRequest { request: None });
        self.dispatch_chat(ChatAction::SetActive { active: false });
        self.dispatch_step(StepAction::SetActiveRequest { request: None });
        self.dispatch_step(StepAction::SetActive { active: false });
    }
}
