//! Gateway wire frames.
//!
//! Outbound requests are typed structs. Inbound frames are parsed into
//! [`InboundFrame`], a flat all-optional view of the three frame shapes
//! (`res`, `event`, and the bare challenge). Event bodies arrive under either
//! `data` or `payload`; [`InboundFrame::event_data`] prefers `data` and falls
//! back to `payload`, so the rest of the client never looks at raw keys.

use crate::base::neterror::NetError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: u32 = 3;
pub const CHALLENGE_EVENT: &str = "connect.challenge";
pub const CLIENT_ID: &str = "gateway-client";
pub const CLIENT_MODE: &str = "backend";
pub const CLIENT_ROLE: &str = "operator";

/// Produced when a final event carries no text blocks.
pub const NO_RESPONSE_TEXT: &str = "No response generated";

pub const METHOD_CONNECT: &str = "connect";
pub const METHOD_CHAT_SEND: &str = "chat.send";

/// `{type:"req", method, id, params}`
#[derive(Debug, Serialize)]
pub struct RequestFrame<'a, P: Serialize> {
    #[serde(rename = "type")]
    kind: &'static str,
    pub method: &'a str,
    pub id: &'a str,
    pub params: P,
}

impl<'a, P: Serialize> RequestFrame<'a, P> {
    pub fn new(method: &'a str, id: &'a str, params: P) -> Self {
        Self {
            kind: "req",
            method,
            id,
            params,
        }
    }

    pub fn to_json(&self) -> Result<String, NetError> {
        serde_json::to_string(self).map_err(|e| NetError::MalformedFrame(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    pub min_protocol: u32,
    pub max_protocol: u32,
    pub role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthParams>,
    pub client: ClientInfo,
}

impl ConnectParams {
    pub fn new(token: Option<&str>, display_name: &str) -> Self {
        Self {
            min_protocol: PROTOCOL_VERSION,
            max_protocol: PROTOCOL_VERSION,
            role: CLIENT_ROLE,
            auth: token.map(|token| AuthParams {
                token: token.to_string(),
            }),
            client: ClientInfo {
                id: CLIENT_ID,
                display_name: display_name.to_string(),
                mode: CLIENT_MODE,
                version: env!("CARGO_PKG_VERSION"),
                platform: std::env::consts::OS,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthParams {
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub id: &'static str,
    pub display_name: String,
    pub mode: &'static str,
    pub version: &'static str,
    pub platform: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSendParams<'a> {
    pub session_key: &'a str,
    pub message: &'a str,
    pub idempotency_key: &'a str,
}

/// Any frame received from the gateway.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundFrame {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub ok: Option<bool>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub payload: Option<Value>,
}

impl InboundFrame {
    pub fn parse(text: &str) -> Result<Self, NetError> {
        serde_json::from_str(text).map_err(|e| NetError::MalformedFrame(e.to_string()))
    }

    pub fn is_event(&self) -> bool {
        match self.kind.as_deref() {
            Some(kind) => kind == "event",
            None => self.event.is_some(),
        }
    }

    pub fn is_challenge(&self) -> bool {
        self.event.as_deref() == Some(CHALLENGE_EVENT)
    }

    /// A non-event frame whose id equals `request_id`.
    pub fn is_response_to(&self, request_id: &str) -> bool {
        if self.is_event() {
            return false;
        }
        match &self.id {
            Some(Value::String(id)) => id == request_id,
            Some(other) => other.to_string() == request_id,
            None => false,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.ok.unwrap_or(false)
    }

    /// Peer error message, accepting `{error:{message}}` or `{error:"..."}`.
    pub fn error_message(&self) -> String {
        match &self.error {
            Some(Value::Object(map)) => map
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
            Some(Value::String(message)) => message.clone(),
            _ => "unknown error".to_string(),
        }
    }

    /// The event body from `data`, or from `payload` when `data` is absent.
    pub fn event_data(&self) -> Option<EventData> {
        let body = self.data.as_ref().or(self.payload.as_ref())?;
        EventData::deserialize(body).ok()
    }
}

/// Body of a run event.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub stream: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub data: Option<StreamChunk>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub message: Option<ChatMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub delta: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub content: Option<Value>,
}

/// What a run event means for the active run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Delta { delta: String, text: String },
    Final(String),
    Error(String),
}

impl EventData {
    /// Interpret this event for `run_id`. Events for other runs, and events
    /// that carry nothing actionable, yield `None`.
    pub fn for_run(&self, run_id: &str) -> Option<RunEvent> {
        if self.run_id.as_deref() != Some(run_id) {
            return None;
        }
        match self.state.as_deref() {
            Some("error") => {
                let message = self
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "Unknown agent error".to_string());
                return Some(RunEvent::Error(message));
            }
            Some("final") => return Some(RunEvent::Final(extract_text(self.message.as_ref()))),
            _ => {}
        }
        if self.stream.as_deref() == Some("assistant") {
            let chunk = self.data.as_ref()?;
            if chunk.delta.is_none() && chunk.text.is_none() {
                return None;
            }
            return Some(RunEvent::Delta {
                delta: chunk.delta.clone().unwrap_or_default(),
                text: chunk.text.clone().unwrap_or_default(),
            });
        }
        None
    }
}

/// Join the `text` blocks of a message with a blank line between them.
///
/// Returns [`NO_RESPONSE_TEXT`] when there are none. A bare string `content`
/// counts as a single text block.
pub fn extract_text(message: Option<&ChatMessage>) -> String {
    let parts: Vec<&str> = match message.and_then(|m| m.content.as_ref()) {
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect(),
        Some(Value::String(text)) => vec![text.as_str()],
        _ => Vec::new(),
    };

    if parts.is_empty() {
        NO_RESPONSE_TEXT.to_string()
    } else {
        parts.join("\n\n")
    }
}
