//! Streaming view of one gateway run.

use super::client::{next_frame, Run};
use super::frames::RunEvent;
use super::session::SessionKey;
use super::state::RunState;
use crate::base::neterror::NetError;
use crate::ws::WebSocket;
use futures::Stream;
use std::time::Duration;
use tokio::time::Instant;

/// Something that happened while an agent run was in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// New assistant output. `text` is the accumulated text when the
    /// gateway provides it.
    Delta { delta: String, text: String },

    /// The run finished. Terminal.
    Complete { text: String, session_key: SessionKey },

    /// The run failed or the response deadline elapsed. Terminal.
    Error { message: String },

    /// Nothing arrived for the configured idle interval.
    Idle,
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete { .. } | StreamEvent::Error { .. })
    }
}

/// Live events of one run.
///
/// Yields any number of [`StreamEvent::Delta`] and [`StreamEvent::Idle`]
/// events followed by exactly one terminal event, after which
/// [`next_event`](Self::next_event) returns `None`. The connection is
/// closed when the terminal event is produced, or on drop.
pub struct ChatStream {
    ws: WebSocket,
    run: Run,
    response_timeout: Duration,
    idle_timeout: Duration,
    deadline: Instant,
    state: RunState,
}

impl ChatStream {
    pub(crate) fn new(
        ws: WebSocket,
        run: Run,
        response_timeout: Duration,
        idle_timeout: Duration,
    ) -> Self {
        tracing::debug!(run_id = %run.run_id, state = ?RunState::Streaming, "streaming run events");
        Self {
            ws,
            run,
            response_timeout,
            idle_timeout,
            deadline: Instant::now() + response_timeout,
            state: RunState::Streaming,
        }
    }

    pub fn run(&self) -> &Run {
        &self.run
    }

    pub fn session_key(&self) -> &SessionKey {
        &self.run.session_key
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Wait for the next event. `None` once a terminal event was returned.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        if self.state.is_terminal() {
            return None;
        }

        loop {
            let now = Instant::now();
            if now >= self.deadline {
                let message = NetError::ResponseTimedOut(self.response_timeout.as_secs());
                return Some(self.fail(message.to_string()).await);
            }
            let wake = (now + self.idle_timeout).min(self.deadline);

            let frame = match next_frame(&mut self.ws, wake).await {
                Ok(Some(frame)) => frame,
                Ok(None) if Instant::now() >= self.deadline => continue,
                Ok(None) => return Some(StreamEvent::Idle),
                Err(e) => return Some(self.fail(e.to_string()).await),
            };

            if !frame.is_event() {
                continue;
            }
            let Some(data) = frame.event_data() else {
                continue;
            };
            match data.for_run(&self.run.run_id) {
                Some(RunEvent::Delta { delta, text }) => {
                    return Some(StreamEvent::Delta { delta, text });
                }
                Some(RunEvent::Final(text)) => {
                    self.finish(RunState::Completed).await;
                    return Some(StreamEvent::Complete {
                        text,
                        session_key: self.run.session_key.clone(),
                    });
                }
                Some(RunEvent::Error(message)) => return Some(self.fail(message).await),
                None => continue,
            }
        }
    }

    /// Adapt into a [`Stream`] of events.
    pub fn into_stream(self) -> impl Stream<Item = StreamEvent> {
        futures::stream::unfold(self, |mut stream| async move {
            let event = stream.next_event().await?;
            Some((event, stream))
        })
    }

    async fn fail(&mut self, message: String) -> StreamEvent {
        tracing::debug!(run_id = %self.run.run_id, error = %message, "run failed");
        self.finish(RunState::Failed).await;
        StreamEvent::Error { message }
    }

    async fn finish(&mut self, state: RunState) {
        self.state = state;
        self.ws.close().await;
        tracing::debug!(run_id = %self.run.run_id, state = ?state, "stream finished");
    }
}

impl std::fmt::Debug for ChatStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStream")
            .field("run", &self.run)
            .field("state", &self.state)
            .finish()
    }
}
