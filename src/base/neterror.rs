use thiserror::Error;

/// Broad category of a [`NetError`].
///
/// Callers that only care about "which peer failed, and how" can match on
/// this instead of the individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Socket, handshake or authentication failure. Usually a configuration
    /// or availability problem.
    Connection,
    /// The gateway rejected a request, reported an agent-side error, or a
    /// response deadline elapsed on a healthy connection.
    Gateway,
    /// Browser remote-debugging failure: discovery, per-tab socket, or a
    /// command.
    DevTools,
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum NetError {
    // Connection Errors
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Timed out after {0}s opening the gateway connection")]
    ConnectTimedOut(u64),
    #[error("Connection closed by peer")]
    ConnectionClosed,
    #[error("Timed out after {0}s waiting for connect.challenge")]
    ChallengeTimedOut(u64),
    #[error("Gateway authentication rejected: {0}")]
    AuthRejected(String),
    #[error("Timed out after {0}s waiting for connect response")]
    HandshakeTimedOut(u64),

    // Gateway Errors
    #[error("Gateway rejected request: {0}")]
    RequestRejected(String),
    #[error("Agent error: {0}")]
    AgentError(String),
    #[error("Timed out after {0}s waiting for request acknowledgement")]
    AckTimedOut(u64),
    #[error("Timed out after {0}s waiting for agent response")]
    ResponseTimedOut(u64),
    #[error("Malformed gateway frame: {0}")]
    MalformedFrame(String),

    // DevTools Errors
    #[error("Browser unreachable at {0}")]
    BrowserUnreachable(String),
    #[error("WebSocket upgrade failed: {0}")]
    WsUpgradeFailed(String),
    #[error("WebSocket protocol error: {0}")]
    WsProtocolError(String),
    #[error("Message too big ({0} bytes)")]
    MsgTooBig(u64),
    #[error("CDP command {method} failed: {message}")]
    CommandFailed { method: String, message: String },
    #[error("CDP command {method} timed out after {secs}s")]
    CommandTimedOut { method: String, secs: u64 },
    #[error("Timed out after {secs}s waiting for {what}")]
    BrowserTimedOut { what: String, secs: u64 },
    #[error("No tab open")]
    NoTabOpen,
    #[error("Invalid DevTools response: {0}")]
    InvalidResponse(String),
    #[error("Failed to write screenshot to {path}: {reason}")]
    ScreenshotWriteFailed { path: String, reason: String },
}

impl NetError {
    /// Classify this error into one of the three caller-facing kinds.
    pub fn kind(&self) -> ErrorKind {
        match self {
            NetError::InvalidUrl(_)
            | NetError::ConnectionFailed(_)
            | NetError::ConnectTimedOut(_)
            | NetError::ConnectionClosed
            | NetError::ChallengeTimedOut(_)
            | NetError::AuthRejected(_)
            | NetError::HandshakeTimedOut(_) => ErrorKind::Connection,

            NetError::RequestRejected(_)
            | NetError::AgentError(_)
            | NetError::AckTimedOut(_)
            | NetError::ResponseTimedOut(_)
            | NetError::MalformedFrame(_) => ErrorKind::Gateway,

            NetError::BrowserUnreachable(_)
            | NetError::WsUpgradeFailed(_)
            | NetError::WsProtocolError(_)
            | NetError::MsgTooBig(_)
            | NetError::CommandFailed { .. }
            | NetError::CommandTimedOut { .. }
            | NetError::BrowserTimedOut { .. }
            | NetError::NoTabOpen
            | NetError::InvalidResponse(_)
            | NetError::ScreenshotWriteFailed { .. } => ErrorKind::DevTools,
        }
    }

    /// True for every variant produced by an elapsed deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            NetError::ConnectTimedOut(_)
                | NetError::ChallengeTimedOut(_)
                | NetError::HandshakeTimedOut(_)
                | NetError::AckTimedOut(_)
                | NetError::ResponseTimedOut(_)
                | NetError::CommandTimedOut { .. }
                | NetError::BrowserTimedOut { .. }
        )
    }

    pub(crate) fn browser_unreachable(endpoint: &str, err: impl std::fmt::Display) -> Self {
        NetError::BrowserUnreachable(format!("{} ({})", endpoint, err))
    }

    pub(crate) fn browser_timed_out(what: impl Into<String>, timeout: std::time::Duration) -> Self {
        NetError::BrowserTimedOut {
            what: what.into(),
            secs: timeout.as_secs(),
        }
    }
}
