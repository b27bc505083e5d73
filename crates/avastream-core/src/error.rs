//! Shared error type across avastream crates.

use thiserror::Error;

/// Stable error codes surfaced to applications and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Required configuration missing or invalid.
    Configuration,
    /// Payload could not be serialized into an envelope.
    Encoding,
    /// Command/event payload does not fit into a single frame.
    PayloadTooLarge,
    /// Media transport or data channel rejected the call.
    Transport,
    /// Envelope carried an unsupported protocol version.
    ProtocolMismatch,
    /// Frame bytes were not a well-formed envelope.
    Malformed,
    /// Partial message dropped before it could be completed.
    ReassemblyGap,
    /// Remote session API failure.
    SessionApi,
    /// Operation exceeded its time bound.
    Timeout,
    /// Internal invariant violated.
    Internal,
}

impl ErrorCode {
    /// String representation used in logs and metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Configuration => "CONFIGURATION",
            ErrorCode::Encoding => "ENCODING",
            ErrorCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ErrorCode::Transport => "TRANSPORT",
            ErrorCode::ProtocolMismatch => "PROTOCOL_MISMATCH",
            ErrorCode::Malformed => "MALFORMED",
            ErrorCode::ReassemblyGap => "REASSEMBLY_GAP",
            ErrorCode::SessionApi => "SESSION_API",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, AvatarError>;

/// Unified error type used by the protocol core and the session client.
#[derive(Debug, Error)]
pub enum AvatarError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("encoding error: {0}")]
    Encoding(String),
    #[error("{kind} payload needs {size} bytes, frame limit is {max}")]
    PayloadTooLarge {
        kind: &'static str,
        size: usize,
        max: usize,
    },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unsupported protocol version: {0}")]
    ProtocolMismatch(u64),
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("reassembly gap in message {message_id} (next expected chunk {next_index})")]
    ReassemblyGap { message_id: String, next_index: u32 },
    #[error("session api error: {0}")]
    SessionApi(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl AvatarError {
    /// Map the error to its stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            AvatarError::Configuration(_) => ErrorCode::Configuration,
            AvatarError::Encoding(_) => ErrorCode::Encoding,
            AvatarError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            AvatarError::Transport(_) => ErrorCode::Transport,
            AvatarError::ProtocolMismatch(_) => ErrorCode::ProtocolMismatch,
            AvatarError::Malformed(_) => ErrorCode::Malformed,
            AvatarError::ReassemblyGap { .. } => ErrorCode::ReassemblyGap,
            AvatarError::SessionApi(_) => ErrorCode::SessionApi,
            AvatarError::Timeout(_) => ErrorCode::Timeout,
            AvatarError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Whether retrying the same call without user action can succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            AvatarError::Transport(_) | AvatarError::SessionApi(_) | AvatarError::Timeout(_)
        )
    }
}
