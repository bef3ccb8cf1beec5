//! Error types for each protocol layer.

use std::fmt;

// ---------------------------------------------------------------------------
// ProcessError
// ---------------------------------------------------------------------------

/// Errors reported by the message processor.
///
/// These are returned as values; a malformed frame never panics and never
/// touches session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// The payload was not valid JSON, or decoded to something other than an object.
    Decode(String),
    /// The envelope has no usable `type` tag.
    MissingType,
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(msg) => write!(f, "decode: {msg}"),
            Self::MissingType => write!(f, "envelope is missing a `type` tag"),
        }
    }
}

impl std::error::Error for ProcessError {}

// ---------------------------------------------------------------------------
// RegistryError
// ---------------------------------------------------------------------------

/// Handler registry misconfiguration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Two handlers claim the same message tag.
    DuplicateType {
        message_type: String,
        existing: &'static str,
        incoming: &'static str,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateType {
                message_type,
                existing,
                incoming,
            } => write!(
                f,
                "handler `{incoming}` claims `{message_type}`, already handled by `{existing}`"
            ),
        }
    }
}

impl std::error::Error for RegistryError {}

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

/// Errors from the duplex connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Opening the socket failed.
    Connect(String),
    /// The peer closed the connection.
    Closed,
    /// Writing a frame failed.
    Send(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect(msg) => write!(f, "connect failed: {msg}"),
            Self::Closed => write!(f, "connection closed"),
            Self::Send(msg) => write!(f, "send failed: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

// ---------------------------------------------------------------------------
// RpcError
// ---------------------------------------------------------------------------

/// Failures of a correlated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// No response arrived before the deadline.
    Timeout { id: String, timeout_ms: u64 },
    /// The session was reset or disconnected while the request was pending.
    Cancelled { id: String, reason: String },
    /// The transport refused the frame.
    NotConnected,
    /// The runner answered with an error payload.
    Remote { id: String, message: String },
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { id, timeout_ms } => {
                write!(f, "request `{id}` timed out after {timeout_ms}ms")
            }
            Self::Cancelled { id, reason } => write!(f, "request `{id}` cancelled: {reason}"),
            Self::NotConnected => write!(f, "not connected"),
            Self::Remote { id, message } => write!(f, "request `{id}` failed: {message}"),
        }
    }
}

impl std::error::Error for RpcError {}

impl RpcError {
    /// True for the timeout variant.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// True for the cancellation variant.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors when loading or parsing configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Toml(e) => write!(f, "toml: {e}"),
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml(e)
    }
}

// ---------------------------------------------------------------------------
// SessionError — top-level
// ---------------------------------------------------------------------------

/// Errors surfaced by the session controller to its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    Registry(RegistryError),
    Rpc(RpcError),
    /// A response was submitted while no input request is outstanding.
    NoActiveRequest,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registry(e) => write!(f, "registry: {e}"),
            Self::Rpc(e) => write!(f, "rpc: {e}"),
            Self::NoActiveRequest => write!(f, "no input request is pending"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<RegistryError> for SessionError {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

impl From<RpcError> for SessionError {
    fn from(e: RpcError) -> Self {
        Self::Rpc(e)
    }
}
