//! WebSocket connection with tokio-tungstenite.
//!
//! Used for the agent gateway, which may sit behind TLS (`wss://`). Control
//! frames are handled by tungstenite; callers only see text messages.

use crate::base::neterror::NetError;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};
use tokio_tungstenite::{connect_async, tungstenite, MaybeTlsStream, WebSocketStream};
use url::Url;

/// Type alias for the WebSocket stream.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket connection to the gateway.
///
/// Owned by a single call; dropping it drops the underlying TCP stream.
pub struct WebSocket {
    sink: SplitSink<WsStream, tungstenite::Message>,
    stream: SplitStream<WsStream>,
    url: Url,
    closed: bool,
}

impl WebSocket {
    /// Connect to a WebSocket server. The TCP connect, TLS and the HTTP
    /// upgrade together must finish within `timeout`.
    ///
    /// # Example
    /// ```ignore
    /// let ws = WebSocket::connect("ws://127.0.0.1:18789", Duration::from_secs(10)).await?;
    /// ```
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, NetError> {
        let parsed = Url::parse(url).map_err(|_| NetError::InvalidUrl(url.to_string()))?;

        // Validate scheme
        if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
            return Err(NetError::InvalidUrl(url.to_string()));
        }

        let deadline = Instant::now() + timeout;
        let (ws_stream, _response) = timeout_at(deadline, connect_async(parsed.as_str()))
            .await
            .map_err(|_| {
                tracing::debug!(url = %parsed, "gateway connect timed out");
                NetError::ConnectTimedOut(timeout.as_secs())
            })?
            .map_err(|e| {
                tracing::debug!(url = %parsed, error = %e, "gateway connect error");
                NetError::ConnectionFailed(format!("{}: {}", parsed, e))
            })?;

        let (sink, stream) = ws_stream.split();

        Ok(Self {
            sink,
            stream,
            url: parsed,
            closed: false,
        })
    }

    /// Get the URL this WebSocket is connected to.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Send a text message.
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<(), NetError> {
        self.sink
            .send(tungstenite::Message::Text(text.into()))
            .await
            .map_err(|e| {
                tracing::debug!(error = %e, "gateway send error");
                NetError::ConnectionClosed
            })
    }

    /// Receive the next text message.
    ///
    /// Returns `None` if the connection is closed. Binary and control frames
    /// are skipped.
    pub async fn recv_text(&mut self) -> Result<Option<String>, NetError> {
        loop {
            match self.stream.next().await {
                Some(Ok(tungstenite::Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(tungstenite::Message::Close(frame))) => {
                    tracing::debug!(?frame, "gateway closed the connection");
                    self.closed = true;
                    return Ok(None);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "gateway recv error");
                    return Err(NetError::ConnectionClosed);
                }
                None => {
                    self.closed = true;
                    return Ok(None);
                }
            }
        }
    }

    /// Close the connection. Errors are logged, not returned, so this can sit
    /// on every exit path.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.sink.send(tungstenite::Message::Close(None)).await {
            tracing::debug!(error = %e, "gateway close frame not sent");
        }
        let _ = self.sink.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_scheme() {
        let result = WebSocket::connect("http://example.com", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(NetError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_unparseable_url() {
        let result = WebSocket::connect("not a url", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(NetError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_refused_is_connection_error() {
        // Bind then drop to get a port that is very likely closed.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = WebSocket::connect(&format!("ws://127.0.0.1:{}", port), Duration::from_secs(5))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), crate::base::neterror::ErrorKind::Connection);
    }

    #[tokio::test]
    async fn test_silent_upgrade_times_out() {
        use tokio::io::AsyncReadExt;

        // Accepts and reads the upgrade request but never answers it.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            while stream.read(&mut buf).await.unwrap_or(0) > 0 {}
        });

        let err = WebSocket::connect(
            &format!("ws://127.0.0.1:{}", port),
            Duration::from_millis(200),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err, NetError::ConnectTimedOut(0));
        assert!(err.is_timeout());
        assert_eq!(err.kind(), crate::base::neterror::ErrorKind::Connection);
    }
}
