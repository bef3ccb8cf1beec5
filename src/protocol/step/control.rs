//! Debugger control codes sent as `data` in a `debug_input_response`.

use crate::breakpoint::{normalize, Breakpoint};
use crate::protocol::Envelope;
use std::fmt;
use std::str::FromStr;

/// A command for the step debugger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCode {
    /// Empty answer; the debugger re-prompts.
    Noop,
    Continue,
    Step,
    Run,
    Quit,
    Info,
    Help,
    Stats,
    AddBreakpoint(Breakpoint),
    RemoveBreakpoint(Breakpoint),
    ListBreakpoints,
    ClearBreakpoints,
}

impl ControlCode {
    /// Short wire token.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Noop => "",
            Self::Continue => "c",
            Self::Step => "s",
            Self::Run => "r",
            Self::Quit => "q",
            Self::Info => "i",
            Self::Help => "h",
            Self::Stats => "st",
            Self::AddBreakpoint(_) => "ab",
            Self::RemoveBreakpoint(_) => "rb",
            Self::ListBreakpoints => "lb",
            Self::ClearBreakpoints => "cb",
        }
    }

    /// Value of the `data` field: the token, plus the serialized breakpoint
    /// for `ab`/`rb`.
    pub fn to_data(&self) -> String {
        match self {
            Self::AddBreakpoint(bp) | Self::RemoveBreakpoint(bp) => {
                format!("{} {}", self.code(), bp.serialize())
            }
            other => other.code().to_string(),
        }
    }
}

impl fmt::Display for ControlCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_data())
    }
}

/// Input that doesn't name a control code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownControlCode(pub String);

impl fmt::Display for UnknownControlCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown control code `{}`", self.0)
    }
}

impl std::error::Error for UnknownControlCode {}

impl FromStr for ControlCode {
    type Err = UnknownControlCode;

    /// Accepts the short tokens and their long names (`continue`, `step`,
    /// ...). `ab`/`rb` require a breakpoint argument.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let text = input.trim();
        let (head, rest) = match text.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (text, ""),
        };
        let code = match (head.to_ascii_lowercase().as_str(), rest.is_empty()) {
            ("", _) => Self::Noop,
            ("c" | "continue", true) => Self::Continue,
            ("s" | "step", true) => Self::Step,
            ("r" | "run", true) => Self::Run,
            ("q" | "quit", true) => Self::Quit,
            ("i" | "info", true) => Self::Info,
            ("h" | "help", true) => Self::Help,
            ("st" | "stats", true) => Self::Stats,
            ("lb", true) => Self::ListBreakpoints,
            ("cb", true) => Self::ClearBreakpoints,
            ("ab", false) => Self::AddBreakpoint(normalize(rest)),
            ("rb", false) => Self::RemoveBreakpoint(normalize(rest)),
            _ => return Err(UnknownControlCode(text.to_string())),
        };
        Ok(code)
    }
}

/// Build the `debug_input_response` frame answering `request_id`.
///
/// `data` is either [`ControlCode::to_data`] output or free text typed at a
/// debugger input prompt.
pub fn debug_input_response_frame(request_id: &str, data: &str) -> Envelope {
    Envelope::outbound("debug_input_response")
        .with_field("request_id", request_id)
        .with_field("data", data)
}
