/// Where a gateway run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Socket open, waiting for `connect.challenge`.
    Connecting,

    /// Challenge received, `connect` request sent.
    NonceReceived,

    /// `connect` acknowledged.
    Authenticated,

    /// `chat.send` sent, waiting for its acknowledgement.
    RequestSent,

    /// Acknowledged; forwarding events as they arrive.
    Streaming,

    /// Acknowledged; waiting for the single terminal event.
    WaitingFinal,

    /// Terminal: a `final` event was observed.
    Completed,

    /// Terminal: error event, rejected request, or deadline.
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }
}
