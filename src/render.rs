//! Terminal output for the `runwire` binary.
//!
//! Messages go to stdout, one per line; status, prompts, and errors go to
//! stderr so stdout can be piped.

use crossterm::style::{Color, Stylize};
use runwire::protocol::chat::{ChatEntry, ChatMessage};
use runwire::protocol::step::{StepEntry, StepMessage};
use runwire::textutil::truncate_with_suffix_by_chars;

/// Longest body printed for one message.
const MAX_BODY_CHARS: usize = 4000;

/// One printable line: optional speaker label plus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub label: Option<String>,
    pub body: String,
    pub tone: Tone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Normal,
    Tool,
    Prompt,
    Error,
    Muted,
}

impl Tone {
    fn color(self) -> Color {
        match self {
            Self::Normal => Color::White,
            Self::Tool => Color::Cyan,
            Self::Prompt => Color::Yellow,
            Self::Error => Color::Red,
            Self::Muted => Color::DarkGrey,
        }
    }
}

pub fn chat_line(entry: &ChatEntry) -> Line {
    let message = &entry.message;
    let label = match (message.sender(), message.recipient()) {
        (Some(sender), Some(recipient)) => Some(format!("{sender} -> {recipient}")),
        (Some(sender), None) => Some(sender.to_string()),
        _ => match message {
            ChatMessage::Print { .. } => None,
            ChatMessage::InputResponse { .. } => Some("you".to_string()),
            other => Some(other.kind().to_string()),
        },
    };
    let tone = match message {
        ChatMessage::ToolCall { .. }
        | ChatMessage::ToolResponse { .. }
        | ChatMessage::CodeExecutionReply { .. } => Tone::Tool,
        ChatMessage::InputRequest(_) => Tone::Prompt,
        ChatMessage::Error { .. } => Tone::Error,
        ChatMessage::Unknown { .. } | ChatMessage::SelectSpeaker { .. } => Tone::Muted,
        _ => Tone::Normal,
    };
    Line {
        label,
        body: truncate_with_suffix_by_chars(&message.summary_text(), MAX_BODY_CHARS, "..."),
        tone,
    }
}

pub fn step_line(entry: &StepEntry) -> Line {
    let message = &entry.message;
    let (label, tone) = match message {
        StepMessage::Print { .. } => (None, Tone::Normal),
        StepMessage::InputRequest(_) => (Some("debug"), Tone::Prompt),
        StepMessage::InputResponse { .. } => (Some("you"), Tone::Muted),
        StepMessage::EventInfo { .. } => (Some("paused"), Tone::Tool),
        StepMessage::Error { .. } => (Some("debug"), Tone::Error),
        StepMessage::Unknown { .. } => (Some("unknown"), Tone::Muted),
        _ => (Some("debug"), Tone::Muted),
    };
    Line {
        label: label.map(str::to_string),
        body: truncate_with_suffix_by_chars(&message.summary_text(), MAX_BODY_CHARS, "..."),
        tone,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    /// Print a message line to stdout.
    pub fn message(&self, line: &Line) {
        let label = line.label.as_deref().map(|label| format!("[{label}] "));
        if self.color {
            let label = label.unwrap_or_default().with(Color::DarkGrey);
            println!("{label}{}", line.body.as_str().with(line.tone.color()));
        } else {
            println!("{}{}", label.unwrap_or_default(), line.body);
        }
    }

    /// Show a prompt on stderr ahead of reading stdin.
    pub fn prompt(&self, text: &str) {
        if self.color {
            eprint!("{} ", format!("? {text}").with(Color::Yellow).bold());
        } else {
            eprint!("? {text} ");
        }
    }

    pub fn activity(&self, text: &str) {
        if self.color {
            eprintln!("{} {}", "•".with(Color::Blue), text.with(Color::Grey));
        } else {
            eprintln!("{text}");
        }
    }

    pub fn warn(&self, msg: &str) {
        if self.color {
            eprintln!("{} {msg}", "warning:".with(Color::Yellow).bold());
        } else {
            eprintln!("warning: {msg}");
        }
    }

    pub fn error(&self, msg: &str) {
        if self.color {
            eprintln!("{} {msg}", "error:".with(Color::Red).bold());
        } else {
            eprintln!("error: {msg}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runwire::breakpoint::Breakpoint;
    use runwire::protocol::chat::MessageContent;

    fn chat(message: ChatMessage) -> ChatEntry {
        ChatEntry {
            id: "m".to_string(),
            timestamp: None,
            message,
        }
    }

    #[test]
    fn chat_lines_label_speaker_pairs() {
        let line = chat_line(&chat(ChatMessage::Print {
            text: "hello".to_string(),
        }));
        assert_eq!(line.label, None);
        assert_eq!(line.body, "hello");

        let line = chat_line(&chat(ChatMessage::Error {
            error: "boom".to_string(),
        }));
        assert_eq!(line.label.as_deref(), Some("error"));
        assert_eq!(line.tone, Tone::Error);

        let line = chat_line(&chat(ChatMessage::InputResponse {
            request_id: "r".to_string(),
            content: MessageContent::Text("yes".to_string()),
        }));
        assert_eq!(line.label.as_deref(), Some("you"));
    }

    #[test]
    fn long_bodies_are_truncated() {
        let line = chat_line(&chat(ChatMessage::Print {
            text: "x".repeat(MAX_BODY_CHARS + 10),
        }));
        assert_eq!(line.body.chars().count(), MAX_BODY_CHARS + 3);
        assert!(line.body.ends_with("..."));
    }

    #[test]
    fn step_lines_use_display_names() {
        let entry = StepEntry {
            id: "e".to_string(),
            timestamp: None,
            message: StepMessage::BreakpointAdded {
                breakpoint: Breakpoint::agent("Planner"),
            },
        };
        let line = step_line(&entry);
        assert_eq!(line.label.as_deref(), Some("debug"));
        assert_eq!(line.body, "breakpoint added: Agent: Planner");
    }
}
