use thiserror::Error;

/// Failures a live audio session can surface.
///
/// `PermissionDenied`, `DeviceUnavailable` and `ConnectionError` abort
/// `start()`. `ProtocolError` after the session is open is terminal.
/// `DecodeError` only ever affects a single inbound chunk.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("connection failed: {0}")]
    ConnectionError(String),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("corrupt audio payload: {0}")]
    DecodeError(String),

    #[error("session is {0}, operation not allowed")]
    InvalidState(&'static str),
}

impl SessionError {
    /// Errors that end the session rather than a single chunk.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionError::DecodeError(_))
    }
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;
