//! Command/response correlation on a per-tab DevTools socket.

use crate::base::neterror::NetError;
use crate::ws::RawWebSocket;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

#[derive(Debug, Deserialize)]
struct CdpReply {
    id: Option<u64>,
    method: Option<String>,
    result: Option<Value>,
    error: Option<CdpError>,
}

#[derive(Debug, Deserialize)]
struct CdpError {
    #[serde(default)]
    message: String,
}

/// One tab's socket. Exactly one command is in flight at a time.
pub struct CdpSession {
    socket: RawWebSocket,
    next_id: u64,
    command_timeout: Duration,
}

impl CdpSession {
    /// Open the tab's socket. The upgrade is bounded by `command_timeout`.
    pub async fn connect(debugger_url: &str, command_timeout: Duration) -> Result<Self, NetError> {
        let socket = RawWebSocket::connect_with_timeout(debugger_url, command_timeout).await?;
        Ok(Self {
            socket,
            next_id: 0,
            command_timeout,
        })
    }

    pub fn url(&self) -> &str {
        self.socket.url().as_str()
    }

    /// Send `method` and wait for the reply with the same id.
    ///
    /// Events and replies to other ids are skipped. After a
    /// [`NetError::CommandTimedOut`] the socket may hold a partly read
    /// frame; callers should discard the session.
    pub async fn call(&mut self, method: &str, params: Value) -> Result<Value, NetError> {
        self.next_id += 1;
        let id = self.next_id;
        let message = json!({ "id": id, "method": method, "params": params });
        self.socket.send_text(&message.to_string()).await?;
        tracing::debug!(id, method, "cdp command sent");

        let deadline = Instant::now() + self.command_timeout;
        loop {
            let text = match timeout_at(deadline, self.socket.recv()).await {
                Err(_) => {
                    return Err(NetError::CommandTimedOut {
                        method: method.to_string(),
                        secs: self.command_timeout.as_secs(),
                    })
                }
                Ok(Ok(Some(text))) => text,
                Ok(Ok(None)) => {
                    return Err(NetError::WsProtocolError(format!(
                        "connection closed while waiting for {}",
                        method
                    )))
                }
                Ok(Err(e)) => return Err(e),
            };

            let reply: CdpReply = match serde_json::from_str(&text) {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::trace!(error = %e, "skipping unparseable cdp message");
                    continue;
                }
            };
            match reply.id {
                Some(reply_id) if reply_id == id => {
                    if let Some(error) = reply.error {
                        return Err(NetError::CommandFailed {
                            method: method.to_string(),
                            message: error.message,
                        });
                    }
                    return Ok(reply.result.unwrap_or(Value::Null));
                }
                Some(other) => tracing::trace!(id = other, "skipping stale cdp reply"),
                None => tracing::trace!(event = ?reply.method, "skipping cdp event"),
            }
        }
    }

    pub async fn close(mut self) {
        if let Err(e) = self.socket.close().await {
            tracing::warn!(error = %e, "cdp socket close failed");
        }
    }
}

impl std::fmt::Debug for CdpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdpSession")
            .field("url", &self.url())
            .field("next_id", &self.next_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_shapes() {
        let reply: CdpReply = serde_json::from_str(r#"{"id":3,"result":{"frameId":"F"}}"#).unwrap();
        assert_eq!(reply.id, Some(3));
        assert!(reply.error.is_none());

        let reply: CdpReply =
            serde_json::from_str(r#"{"id":4,"error":{"code":-32000,"message":"No target"}}"#)
                .unwrap();
        assert_eq!(reply.error.unwrap().message, "No target");

        let event: CdpReply =
            serde_json::from_str(r#"{"method":"Page.loadEventFired","params":{}}"#).unwrap();
        assert!(event.id.is_none());
        assert_eq!(event.method.as_deref(), Some("Page.loadEventFired"));
    }
}
