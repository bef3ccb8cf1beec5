//! Handler registry and the message processor built on it.
//!
//! A registry is an ordered list of handlers. The processor decodes a raw
//! payload, resolves legacy tag aliases, and hands the envelope to the first
//! handler whose [`MessageHandler::can_handle`] accepts the tag. When no
//! handler matches, or the matching handler declines a malformed body, the
//! processor synthesizes an "unknown" result instead of failing.

use super::envelope::{Envelope, RawPayload};
use crate::error::{ProcessError, RegistryError};
use std::collections::HashMap;
use tracing::debug;

/// Per-call hints supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessContext {
    /// Correlation id of the request this frame answers, if known.
    pub request_id: Option<String>,
    /// Image to attach to a message built in this context.
    pub image_url: Option<String>,
}

impl ProcessContext {
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_image_url(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }
}

/// Something the consuming layer should act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    WorkflowStarted,
    WorkflowEnded,
    /// New content arrived; move the view to it.
    ScrollToLatest,
    /// The runner is waiting on the user.
    FocusInput,
}

/// Output of one handler invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingResult<M, U> {
    /// The reconstructed message. Side-effect-only envelopes leave this empty.
    pub message: Option<M>,
    /// Fragment to merge into session state.
    pub update: U,
    pub control: Option<ControlAction>,
    pub is_workflow_end: bool,
}

impl<M, U: Default> ProcessingResult<M, U> {
    /// Result carrying just a message.
    pub fn message(message: M) -> Self {
        Self {
            message: Some(message),
            update: U::default(),
            control: None,
            is_workflow_end: false,
        }
    }

    /// Result carrying just a state fragment.
    pub fn update(update: U) -> Self {
        Self {
            message: None,
            update,
            control: None,
            is_workflow_end: false,
        }
    }

    pub fn with_update(mut self, update: U) -> Self {
        self.update = update;
        self
    }

    pub fn with_control(mut self, control: ControlAction) -> Self {
        self.control = Some(control);
        self
    }

    /// Mark the result as the end of the workflow.
    pub fn ending_workflow(mut self) -> Self {
        self.is_workflow_end = true;
        self.control = Some(ControlAction::WorkflowEnded);
        self
    }
}

/// Message families that can represent an unrecognized envelope.
pub trait FallbackMessage: Sized {
    fn unknown(envelope: &Envelope) -> Self;
}

/// Converts one family of envelopes into typed messages.
pub trait MessageHandler<M, U>: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Tags this handler claims. Registration rejects overlapping claims.
    fn message_types(&self) -> &'static [&'static str];

    fn can_handle(&self, message_type: &str) -> bool {
        self.message_types().contains(&message_type)
    }

    /// Build the result, or decline with `None` when required fields are
    /// missing or mistyped.
    fn handle(&self, envelope: &Envelope, ctx: &ProcessContext) -> Option<ProcessingResult<M, U>>;
}

/// Ordered handler list. Earlier registrations take precedence.
pub struct HandlerRegistry<M, U> {
    handlers: Vec<Box<dyn MessageHandler<M, U>>>,
    claims: HashMap<&'static str, &'static str>,
}

impl<M, U> HandlerRegistry<M, U> {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            claims: HashMap::new(),
        }
    }

    /// Register a handler after the existing ones.
    pub fn register(
        &mut self,
        handler: impl MessageHandler<M, U> + 'static,
    ) -> Result<(), RegistryError> {
        for message_type in handler.message_types() {
            if let Some(existing) = self.claims.get(message_type) {
                return Err(RegistryError::DuplicateType {
                    message_type: (*message_type).to_string(),
                    existing: *existing,
                    incoming: handler.name(),
                });
            }
        }
        for message_type in handler.message_types() {
            self.claims.insert(*message_type, handler.name());
        }
        self.handlers.push(Box::new(handler));
        Ok(())
    }

    /// First handler accepting `message_type`.
    pub fn find(&self, message_type: &str) -> Option<&dyn MessageHandler<M, U>> {
        self.handlers
            .iter()
            .find(|handler| handler.can_handle(message_type))
            .map(|handler| handler.as_ref())
    }

    /// Names in precedence order.
    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|handler| handler.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<M, U> Default for HandlerRegistry<M, U> {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode → resolve alias → dispatch.
pub struct MessageProcessor<M, U> {
    registry: HandlerRegistry<M, U>,
    aliases: HashMap<&'static str, &'static str>,
}

impl<M, U> MessageProcessor<M, U>
where
    M: FallbackMessage,
    U: Default,
{
    pub fn new(registry: HandlerRegistry<M, U>) -> Self {
        Self {
            registry,
            aliases: HashMap::new(),
        }
    }

    /// Map legacy tags onto current ones before dispatch.
    pub fn with_aliases(mut self, aliases: &[(&'static str, &'static str)]) -> Self {
        self.aliases.extend(aliases.iter().copied());
        self
    }

    pub fn registry(&self) -> &HandlerRegistry<M, U> {
        &self.registry
    }

    /// Current tag for `message_type`.
    pub fn canonical_type<'a>(&self, message_type: &'a str) -> &'a str {
        match self.aliases.get(message_type) {
            Some(current) => *current,
            None => message_type,
        }
    }

    /// Process one raw frame.
    ///
    /// Blank text yields `Ok(None)`. Undecodable payloads and envelopes
    /// without a `type` are errors; everything else produces a result.
    pub fn process(
        &self,
        raw: impl Into<RawPayload>,
        ctx: &ProcessContext,
    ) -> Result<Option<ProcessingResult<M, U>>, ProcessError> {
        let raw = raw.into();
        if raw.is_blank() {
            return Ok(None);
        }
        let envelope = Envelope::decode(raw)?;
        Ok(Some(self.process_envelope(&envelope, ctx)))
    }

    /// Dispatch an already-decoded envelope.
    pub fn process_envelope(
        &self,
        envelope: &Envelope,
        ctx: &ProcessContext,
    ) -> ProcessingResult<M, U> {
        let message_type = self.canonical_type(envelope.kind());
        let Some(handler) = self.registry.find(message_type) else {
            debug!(message_type, "no handler registered");
            return ProcessingResult::message(M::unknown(envelope));
        };
        match handler.handle(envelope, ctx) {
            Some(result) => result,
            None => {
                debug!(
                    message_type,
                    handler = handler.name(),
                    "handler declined envelope"
                );
                ProcessingResult::message(M::unknown(envelope))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq)]
    enum Msg {
        Ping(String),
        Wild(String),
        Unknown(String),
    }

    impl FallbackMessage for Msg {
        fn unknown(envelope: &Envelope) -> Self {
            Msg::Unknown(envelope.kind().to_string())
        }
    }

    struct PingHandler;

    impl MessageHandler<Msg, ()> for PingHandler {
        fn name(&self) -> &'static str {
            "ping"
        }
        fn message_types(&self) -> &'static [&'static str] {
            &["ping"]
        }
        fn handle(&self, envelope: &Envelope, _ctx: &ProcessContext) -> Option<ProcessingResult<Msg, ()>> {
            let body = envelope.lookup_str("body")?;
            Some(ProcessingResult::message(Msg::Ping(body.to_string())))
        }
    }

    struct CatchAll;

    impl MessageHandler<Msg, ()> for CatchAll {
        fn name(&self) -> &'static str {
            "catch-all"
        }
        fn message_types(&self) -> &'static [&'static str] {
            &[]
        }
        fn can_handle(&self, message_type: &str) -> bool {
            message_type.starts_with("x_")
        }
        fn handle(&self, envelope: &Envelope, _ctx: &ProcessContext) -> Option<ProcessingResult<Msg, ()>> {
            Some(ProcessingResult::message(Msg::Wild(envelope.kind().to_string())))
        }
    }

    fn processor() -> MessageProcessor<Msg, ()> {
        let mut registry = HandlerRegistry::new();
        registry.register(PingHandler).expect("ping");
        registry.register(CatchAll).expect("catch-all");
        MessageProcessor::new(registry).with_aliases(&[("legacy_ping", "ping")])
    }

    #[test]
    fn dispatches_to_first_matching_handler() {
        let result = processor()
            .process(r#"{"type":"ping","body":"hi"}"#, &ProcessContext::default())
            .expect("ok")
            .expect("some");
        assert_eq!(result.message, Some(Msg::Ping("hi".into())));
    }

    #[test]
    fn aliases_route_to_current_handler() {
        let result = processor()
            .process(json!({"type": "legacy_ping", "body": "old"}), &ProcessContext::default())
            .expect("ok")
            .expect("some");
        assert_eq!(result.message, Some(Msg::Ping("old".into())));
    }

    #[test]
    fn pattern_handlers_run_after_specific_ones() {
        let result = processor()
            .process(r#"{"type":"x_custom"}"#, &ProcessContext::default())
            .expect("ok")
            .expect("some");
        assert_eq!(result.message, Some(Msg::Wild("x_custom".into())));
    }

    #[test]
    fn declined_envelope_becomes_unknown() {
        let result = processor()
            .process(r#"{"type":"ping"}"#, &ProcessContext::default())
            .expect("ok")
            .expect("some");
        assert_eq!(result.message, Some(Msg::Unknown("ping".into())));
    }

    #[test]
    fn unregistered_type_becomes_unknown() {
        let result = processor()
            .process(r#"{"type":"mystery"}"#, &ProcessContext::default())
            .expect("ok")
            .expect("some");
        assert_eq!(result.message, Some(Msg::Unknown("mystery".into())));
        assert!(!result.is_workflow_end);
    }

    #[test]
    fn malformed_and_untyped_payloads_are_errors() {
        let p = processor();
        assert!(matches!(
            p.process("not json", &ProcessContext::default()),
            Err(ProcessError::Decode(_))
        ));
        assert_eq!(
            p.process(r#"{"body":"x"}"#, &ProcessContext::default()),
            Err(ProcessError::MissingType)
        );
        assert_eq!(p.process("   ", &ProcessContext::default()), Ok(None));
    }

    #[test]
    fn duplicate_claims_are_rejected_at_registration() {
        let mut registry: HandlerRegistry<Msg, ()> = HandlerRegistry::new();
        registry.register(PingHandler).expect("first");
        let err = registry.register(PingHandler).unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateType {
                message_type: "ping".into(),
                existing: "ping",
                incoming: "ping",
            }
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn handler_names_follow_registration_order() {
        assert_eq!(processor().registry().handler_names(), vec!["ping", "catch-all"]);
    }

    #[cfg(feature = "fuzz-tests")]
    mod prop_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn process_never_panics_on_arbitrary_text(text in "\\PC{0,64}") {
                let _ = processor().process(text, &ProcessContext::default());
            }
        }
    }
}
