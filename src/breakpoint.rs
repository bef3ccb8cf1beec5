//! Breakpoint specifications for step-by-step debugging.
//!
//! A breakpoint has a canonical structured form ([`Breakpoint`]) and a compact
//! string form used on the wire and in user input:
//!
//! | string                    | meaning                                  |
//! |---------------------------|------------------------------------------|
//! | `*`                       | every event                              |
//! | `event:<type>`            | events whose `type` tag equals `<type>`  |
//! | `agent:<name>`            | events whose resolved agent is `<name>`  |
//! | `agent_event:<name>:<type>` | both of the above                      |
//!
//! Inside `agent_event`, a `:` or `\` in the agent name is escaped with a
//! backslash. Text after a prefix is kept verbatim, whitespace included. Any
//! other string is read leniently as `event:<string>`, trimmed. All matching
//! logic operates on the structured form; the string form is only a
//! serialization.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::convert::Infallible;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

const ALL_TOKEN: &str = "*";
const EVENT_PREFIX: &str = "event:";
const AGENT_PREFIX: &str = "agent:";
const AGENT_EVENT_PREFIX: &str = "agent_event:";
const SEPARATOR: char = ':';
const ESCAPE: char = '\\';

/// What a breakpoint pauses on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BreakpointKind {
    All,
    Event {
        event_type: String,
    },
    Agent {
        #[serde(alias = "agent")]
        agent_name: String,
    },
    AgentEvent {
        #[serde(alias = "agent")]
        agent_name: String,
        event_type: String,
    },
}

/// A breakpoint plus an optional human description.
///
/// The description only exists in the structured form; the compact string
/// form carries the kind alone. Equality and hashing look at the kind only,
/// so a described breakpoint removes its undescribed twin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Breakpoint {
    #[serde(flatten)]
    pub kind: BreakpointKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Breakpoint {
    pub fn all() -> Self {
        BreakpointKind::All.into()
    }

    pub fn event(event_type: impl Into<String>) -> Self {
        BreakpointKind::Event {
            event_type: event_type.into(),
        }
        .into()
    }

    pub fn agent(agent_name: impl Into<String>) -> Self {
        BreakpointKind::Agent {
            agent_name: agent_name.into(),
        }
        .into()
    }

    pub fn agent_event(agent_name: impl Into<String>, event_type: impl Into<String>) -> Self {
        BreakpointKind::AgentEvent {
            agent_name: agent_name.into(),
            event_type: event_type.into(),
        }
        .into()
    }

    /// Attach a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Compact string form. Total.
    pub fn serialize(&self) -> String {
        match &self.kind {
            BreakpointKind::All => ALL_TOKEN.to_string(),
            BreakpointKind::Event { event_type } => format!("{EVENT_PREFIX}{event_type}"),
            BreakpointKind::Agent { agent_name } => format!("{AGENT_PREFIX}{agent_name}"),
            BreakpointKind::AgentEvent {
                agent_name,
                event_type,
            } => format!(
                "{AGENT_EVENT_PREFIX}{}{SEPARATOR}{event_type}",
                escape_component(agent_name)
            ),
        }
    }

    /// Whether this breakpoint fires for `event`.
    pub fn matches(&self, event: &Value) -> bool {
        match &self.kind {
            BreakpointKind::All => true,
            BreakpointKind::Event { event_type } => event_type_of(event) == Some(event_type),
            BreakpointKind::Agent { agent_name } => {
                resolve_agent_name(event) == Some(agent_name.as_str())
            }
            BreakpointKind::AgentEvent {
                agent_name,
                event_type,
            } => {
                event_type_of(event) == Some(event_type)
                    && resolve_agent_name(event) == Some(agent_name.as_str())
            }
        }
    }

    /// Human label for lists and banners.
    pub fn display_name(&self) -> String {
        if let Some(description) = self.description.as_deref().map(str::trim) {
            if !description.is_empty() {
                return description.to_string();
            }
        }
        match &self.kind {
            BreakpointKind::All => "All events".to_string(),
            BreakpointKind::Event { event_type } => format!("Event: {event_type}"),
            BreakpointKind::Agent { agent_name } => format!("Agent: {agent_name}"),
            BreakpointKind::AgentEvent {
                agent_name,
                event_type,
            } => format!("Agent {agent_name} on {event_type}"),
        }
    }
}

impl PartialEq for Breakpoint {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for Breakpoint {}

impl Hash for Breakpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
    }
}

impl From<BreakpointKind> for Breakpoint {
    fn from(kind: BreakpointKind) -> Self {
        Self {
            kind,
            description: None,
        }
    }
}

impl fmt::Display for Breakpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

impl FromStr for Breakpoint {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(parse_breakpoint(s))
    }
}

/// Either serialized form accepted by [`normalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointInput {
    Text(String),
    Structured(Breakpoint),
}

impl From<&str> for BreakpointInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for BreakpointInput {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Breakpoint> for BreakpointInput {
    fn from(value: Breakpoint) -> Self {
        Self::Structured(value)
    }
}

/// Canonicalize either form into the structured form. Never fails.
pub fn normalize(input: impl Into<BreakpointInput>) -> Breakpoint {
    match input.into() {
        BreakpointInput::Text(text) => parse_breakpoint(&text),
        BreakpointInput::Structured(breakpoint) => breakpoint,
    }
}

/// Canonicalize a JSON breakpoint (string or object).
///
/// Objects that don't deserialize as a breakpoint, and non-string scalars,
/// yield `None`.
pub fn normalize_value(value: &Value) -> Option<Breakpoint> {
    match value {
        Value::String(text) => Some(parse_breakpoint(text)),
        Value::Object(_) => serde_json::from_value(value.clone()).ok(),
        _ => None,
    }
}

fn parse_breakpoint(raw: &str) -> Breakpoint {
    let text = raw.trim_start();
    if let Some(rest) = text.strip_prefix(AGENT_EVENT_PREFIX) {
        let (agent_name, event_type) = split_escaped(rest);
        return match event_type {
            Some(event_type) => Breakpoint::agent_event(agent_name, event_type),
            // Missing event half: degrade to an agent breakpoint.
            None => Breakpoint::agent(agent_name),
        };
    }
    if let Some(agent_name) = text.strip_prefix(AGENT_PREFIX) {
        return Breakpoint::agent(agent_name);
    }
    if let Some(event_type) = text.strip_prefix(EVENT_PREFIX) {
        return Breakpoint::event(event_type);
    }
    match text.trim_end() {
        ALL_TOKEN => Breakpoint::all(),
        bare => Breakpoint::event(bare),
    }
}

fn escape_component(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == SEPARATOR || c == ESCAPE {
            out.push(ESCAPE);
        }
        out.push(c);
    }
    out
}

/// Unescape up to the first unescaped separator; the remainder is returned
/// verbatim. A trailing lone escape is kept literally.
fn split_escaped(text: &str) -> (String, Option<&str>) {
    let mut head = String::with_capacity(text.len());
    let mut chars = text.char_indices();
    while let Some((index, c)) = chars.next() {
        match c {
            ESCAPE => match chars.next() {
                Some((_, escaped)) => head.push(escaped),
                None => head.push(ESCAPE),
            },
            SEPARATOR => return (head, Some(&text[index + c.len_utf8()..])),
            _ => head.push(c),
        }
    }
    (head, None)
}

fn event_type_of(event: &Value) -> Option<&String> {
    match event.get("type") {
        Some(Value::String(kind)) => Some(kind),
        _ => None,
    }
}

/// Resolve the agent an event belongs to.
///
/// Precedence: `sender`, then `recipient`, then nested identifiers
/// (`agent`, `agent_name`, `content.sender`, `content.recipient`).
pub fn resolve_agent_name(event: &Value) -> Option<&str> {
    const TOP_LEVEL: [&str; 4] = ["sender", "recipient", "agent", "agent_name"];
    for key in TOP_LEVEL {
        if let Some(name) = event.get(key).and_then(agent_field_name) {
            return Some(name);
        }
    }
    let content = event.get("content")?;
    ["sender", "recipient"]
        .into_iter()
        .find_map(|key| content.get(key).and_then(agent_field_name))
}

fn agent_field_name(value: &Value) -> Option<&str> {
    let name = match value {
        Value::String(name) => name.as_str(),
        Value::Object(map) => map.get("name").and_then(Value::as_str)?,
        _ => return None,
    };
    (!name.trim().is_empty()).then_some(name)
}
