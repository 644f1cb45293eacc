//! Agent gateway client.
//!
//! Every call opens its own connection, performs the challenge/connect
//! handshake, sends one `chat.send` request and then either waits for the
//! terminal event ([`GatewayClient::send_message`]) or hands the live
//! connection to a [`ChatStream`] ([`GatewayClient::stream_message`]).
//!
//! # Example
//!
//! ```rust,ignore
//! use clawnet::config::GatewayConfig;
//! use clawnet::gateway::{ChatRequest, GatewayClient};
//!
//! let client = GatewayClient::new(GatewayConfig::from_env());
//! let reply = client
//!     .send_message(ChatRequest::new("Summarise chapter 3").memory_id("study-42"))
//!     .await?;
//! println!("{}", reply.text);
//! ```

use super::frames::{
    ChatSendParams, ConnectParams, InboundFrame, RequestFrame, RunEvent, METHOD_CHAT_SEND,
    METHOD_CONNECT,
};
use super::session::SessionKey;
use super::state::RunState;
use super::stream::ChatStream;
use crate::base::neterror::NetError;
use crate::config::GatewayConfig;
use crate::ws::WebSocket;
use tokio::time::{timeout_at, Instant};
use uuid::Uuid;

/// One message to the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub message: String,
    pub memory_id: Option<String>,
    pub agent_id: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            memory_id: None,
            agent_id: None,
        }
    }

    /// Conversation memory to continue. Equal ids share context.
    pub fn memory_id(mut self, memory_id: impl Into<String>) -> Self {
        self.memory_id = Some(memory_id.into());
        self
    }

    /// Agent to address instead of the configured default.
    pub fn agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }
}

impl From<&str> for ChatRequest {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for ChatRequest {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// The agent's answer to a [`GatewayClient::send_message`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub text: String,
    pub session_key: SessionKey,
    pub run_id: String,
}

/// One request lifecycle on the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    /// Also sent as the idempotency key.
    pub run_id: String,
    pub session_key: SessionKey,
    pub agent_id: String,
}

/// Client for the agent gateway. Cheap to clone; holds no connection.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    config: GatewayConfig,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Session key a request with these ids would use.
    pub fn session_key(&self, memory_id: Option<&str>, agent_id: Option<&str>) -> SessionKey {
        SessionKey::derive(
            memory_id,
            agent_id,
            &self.config.default_agent,
            &self.config.session_prefix,
        )
    }

    /// Send a message and wait for the agent's final answer.
    pub async fn send_message(
        &self,
        request: impl Into<ChatRequest>,
    ) -> Result<ChatReply, NetError> {
        let request = request.into();
        let mut ws = WebSocket::connect(&self.config.url, self.config.challenge_timeout).await?;

        let result = async {
            let run = self.start_run(&mut ws, &request).await?;
            self.wait_final(&mut ws, run).await
        }
        .await;

        ws.close().await;
        result
    }

    /// Send a message and return a stream of its events.
    ///
    /// Connection, authentication and request failures are returned here.
    /// Once the stream exists, failures and deadlines arrive as a terminal
    /// [`StreamEvent::Error`](super::StreamEvent::Error).
    pub async fn stream_message(
        &self,
        request: impl Into<ChatRequest>,
    ) -> Result<ChatStream, NetError> {
        let request = request.into();
        let mut ws = WebSocket::connect(&self.config.url, self.config.challenge_timeout).await?;

        match self.start_run(&mut ws, &request).await {
            Ok(run) => Ok(ChatStream::new(
                ws,
                run,
                self.config.response_timeout,
                self.config.idle_timeout,
            )),
            Err(e) => {
                ws.close().await;
                Err(e)
            }
        }
    }

    /// Handshake, then `chat.send` and its acknowledgement.
    async fn start_run(&self, ws: &mut WebSocket, request: &ChatRequest) -> Result<Run, NetError> {
        self.handshake(ws).await?;

        let run = Run {
            run_id: Uuid::new_v4().to_string(),
            session_key: self
                .session_key(request.memory_id.as_deref(), request.agent_id.as_deref()),
            agent_id: request
                .agent_id
                .clone()
                .unwrap_or_else(|| self.config.default_agent.clone()),
        };

        let request_id = Uuid::new_v4().to_string();
        let params = ChatSendParams {
            session_key: run.session_key.as_str(),
            message: &request.message,
            idempotency_key: &run.run_id,
        };
        ws.send_text(RequestFrame::new(METHOD_CHAT_SEND, &request_id, params).to_json()?)
            .await?;
        tracing::debug!(run_id = %run.run_id, session_key = %run.session_key, state = ?RunState::RequestSent, "chat.send sent");

        let deadline = Instant::now() + self.config.ack_timeout;
        let ack = await_response(ws, &request_id, deadline)
            .await?
            .ok_or(NetError::AckTimedOut(self.config.ack_timeout.as_secs()))?;
        if !ack.is_ok() {
            return Err(NetError::RequestRejected(ack.error_message()));
        }
        Ok(run)
    }

    async fn handshake(&self, ws: &mut WebSocket) -> Result<(), NetError> {
        tracing::debug!(url = %ws.url(), state = ?RunState::Connecting, "waiting for connect.challenge");
        let deadline = Instant::now() + self.config.challenge_timeout;
        loop {
            match next_frame(ws, deadline).await? {
                Some(frame) if frame.is_challenge() => break,
                Some(_) => continue,
                None => {
                    return Err(NetError::ChallengeTimedOut(
                        self.config.challenge_timeout.as_secs(),
                    ))
                }
            }
        }

        let request_id = Uuid::new_v4().to_string();
        let params = ConnectParams::new(self.config.token.as_deref(), &self.config.client_name);
        ws.send_text(RequestFrame::new(METHOD_CONNECT, &request_id, params).to_json()?)
            .await?;
        tracing::debug!(state = ?RunState::NonceReceived, "connect request sent");

        let deadline = Instant::now() + self.config.ack_timeout;
        let response = await_response(ws, &request_id, deadline)
            .await?
            .ok_or(NetError::HandshakeTimedOut(self.config.ack_timeout.as_secs()))?;
        if !response.is_ok() {
            return Err(NetError::AuthRejected(response.error_message()));
        }
        tracing::debug!(state = ?RunState::Authenticated, "gateway handshake complete");
        Ok(())
    }

    async fn wait_final(&self, ws: &mut WebSocket, run: Run) -> Result<ChatReply, NetError> {
        let deadline = Instant::now() + self.config.response_timeout;
        tracing::debug!(run_id = %run.run_id, state = ?RunState::WaitingFinal, "waiting for final event");
        loop {
            let frame = match next_frame(ws, deadline).await? {
                Some(frame) => frame,
                None => {
                    tracing::debug!(run_id = %run.run_id, state = ?RunState::Failed, "response deadline elapsed");
                    return Err(NetError::ResponseTimedOut(
                        self.config.response_timeout.as_secs(),
                    ));
                }
            };
            if !frame.is_event() {
                continue;
            }
            let Some(data) = frame.event_data() else {
                continue;
            };
            match data.for_run(&run.run_id) {
                Some(RunEvent::Final(text)) => {
                    tracing::debug!(run_id = %run.run_id, state = ?RunState::Completed, "run completed");
                    return Ok(ChatReply {
                        text,
                        session_key: run.session_key,
                        run_id: run.run_id,
                    });
                }
                Some(RunEvent::Error(message)) => {
                    tracing::debug!(run_id = %run.run_id, state = ?RunState::Failed, "run failed");
                    return Err(NetError::AgentError(message));
                }
                Some(RunEvent::Delta { .. }) | None => continue,
            }
        }
    }
}

/// Next parseable frame, or `None` once `deadline` passes. Unparseable text
/// is skipped.
pub(crate) async fn next_frame(
    ws: &mut WebSocket,
    deadline: Instant,
) -> Result<Option<InboundFrame>, NetError> {
    loop {
        let text = match timeout_at(deadline, ws.recv_text()).await {
            Err(_) => return Ok(None),
            Ok(Ok(Some(text))) => text,
            Ok(Ok(None)) => return Err(NetError::ConnectionClosed),
            Ok(Err(e)) => return Err(e),
        };
        match InboundFrame::parse(&text) {
            Ok(frame) => return Ok(Some(frame)),
            Err(e) => tracing::trace!(error = %e, "skipping unparseable gateway frame"),
        }
    }
}

/// Skip frames until the response to `request_id` arrives.
async fn await_response(
    ws: &mut WebSocket,
    request_id: &str,
    deadline: Instant,
) -> Result<Option<InboundFrame>, NetError> {
    while let Some(frame) = next_frame(ws, deadline).await? {
        if frame.is_response_to(request_id) {
            return Ok(Some(frame));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = ChatRequest::new("hello").memory_id("m").agent_id("a");
        assert_eq!(request.message, "hello");
        assert_eq!(request.memory_id.as_deref(), Some("m"));
        assert_eq!(request.agent_id.as_deref(), Some("a"));

        let request: ChatRequest = "plain".into();
        assert!(request.memory_id.is_none());
    }

    #[test]
    fn test_client_session_key_uses_config() {
        let client = GatewayClient::new(
            GatewayConfig::default()
                .with_session_prefix("study")
                .with_default_agent("tutor"),
        );
        assert_eq!(
            client.session_key(None, None).as_str(),
            "agent:tutor:study-default"
        );
        assert_eq!(
            client.session_key(Some("42"), Some("coach")).as_str(),
            "agent:coach:study-42"
        );
    }
}
