//! Raw WebSocket client over a plain TCP stream.
//!
//! Performs its own HTTP/1.1 Upgrade handshake and speaks the frame codec in
//! [`super::frame`] directly. Used for the per-tab DevTools socket, where the
//! peer is a local browser and no TLS is involved.

use super::frame::{self, Frame, OpCode, CLOSE_NORMAL, DEFAULT_MAX_PAYLOAD};
use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use base64::Engine;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use url::Url;

/// Response header block larger than this is treated as a failed upgrade.
const MAX_HANDSHAKE_HEADER: usize = 16 * 1024;

/// Bound on connect plus upgrade when no timeout is given.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// A client-side WebSocket connection built on [`frame`].
///
/// Inbound pings are answered with a pong carrying the same payload before
/// [`recv`](Self::recv) returns. A close frame from the peer ends the
/// session; the close is echoed once.
#[derive(Debug)]
pub struct RawWebSocket {
    stream: BufReader<TcpStream>,
    url: Url,
    max_payload: u64,
    reject_masked: bool,
    closed: bool,
}

impl RawWebSocket {
    /// Connect and upgrade to `ws_url` (`ws://` only), giving up after
    /// [`DEFAULT_CONNECT_TIMEOUT`].
    pub async fn connect(ws_url: &str) -> Result<Self, NetError> {
        Self::connect_with_timeout(ws_url, DEFAULT_CONNECT_TIMEOUT).await
    }

    /// Connect and upgrade, bounding the TCP connect and the upgrade
    /// handshake together by `timeout`.
    pub async fn connect_with_timeout(ws_url: &str, timeout: Duration) -> Result<Self, NetError> {
        let invalid = || NetError::WsUpgradeFailed(format!("invalid debugger URL {}", ws_url));
        let url = Url::parse(ws_url).map_err(|_| invalid())?;
        if url.scheme() != "ws" {
            return Err(invalid());
        }
        let host = url.host_str().ok_or_else(invalid)?.to_string();
        let port = url.port_or_known_default().ok_or_else(invalid)?;

        let deadline = Instant::now() + timeout;
        let connect = async {
            let tcp = TcpStream::connect((host.as_str(), port))
                .await
                .unreachable_context(ws_url)?;
            let _ = tcp.set_nodelay(true);

            let mut socket = Self {
                stream: BufReader::new(tcp),
                url,
                max_payload: DEFAULT_MAX_PAYLOAD,
                reject_masked: false,
                closed: false,
            };
            socket.handshake(&host, port).await?;
            Ok::<_, NetError>(socket)
        };
        let socket = timeout_at(deadline, connect)
            .await
            .map_err(|_| NetError::browser_timed_out(format!("upgrade of {}", ws_url), timeout))??;
        tracing::debug!(url = %socket.url, "raw websocket connected");
        Ok(socket)
    }

    /// Treat masked frames from the server as a protocol error.
    pub fn reject_masked_frames(mut self, reject: bool) -> Self {
        self.reject_masked = reject;
        self
    }

    /// Cap the size of a single inbound frame payload.
    pub fn max_payload(mut self, max: u64) -> Self {
        self.max_payload = max;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    async fn handshake(&mut self, host: &str, port: u16) -> Result<(), NetError> {
        let key = base64::engine::general_purpose::STANDARD.encode(rand::random::<[u8; 16]>());
        let mut path = self.url.path().to_string();
        if let Some(query) = self.url.query() {
            path.push('?');
            path.push_str(query);
        }

        let request = format!(
            "GET {} HTTP/1.1\r\n\
             Host: {}:{}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {}\r\n\
             Sec-WebSocket-Version: 13\r\n\
             \r\n",
            path, host, port, key
        );
        self.stream
            .get_mut()
            .write_all(request.as_bytes())
            .await
            .map_err(|e| NetError::WsUpgradeFailed(format!("write upgrade request: {}", e)))?;

        let mut status_line = String::new();
        let n = self
            .stream
            .read_line(&mut status_line)
            .await
            .map_err(|e| NetError::WsUpgradeFailed(format!("read status line: {}", e)))?;
        if n == 0 {
            return Err(NetError::WsUpgradeFailed(
                "connection closed during upgrade".into(),
            ));
        }
        if status_line.split_whitespace().nth(1) != Some("101") {
            return Err(NetError::WsUpgradeFailed(format!(
                "unexpected status line: {}",
                status_line.trim_end()
            )));
        }

        let expected_accept = derive_accept_key(key.as_bytes());
        let mut accept: Option<String> = None;
        let mut consumed = status_line.len();
        loop {
            let mut line = String::new();
            let n = self
                .stream
                .read_line(&mut line)
                .await
                .map_err(|e| NetError::WsUpgradeFailed(format!("read headers: {}", e)))?;
            if n == 0 {
                return Err(NetError::WsUpgradeFailed(
                    "connection closed during upgrade".into(),
                ));
            }
            consumed += n;
            if consumed > MAX_HANDSHAKE_HEADER {
                return Err(NetError::WsUpgradeFailed("response headers too large".into()));
            }
            if line == "\r\n" || line == "\n" {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.trim().eq_ignore_ascii_case("sec-websocket-accept") {
                    accept = Some(value.trim().to_string());
                }
            }
        }

        match accept {
            Some(accept) if accept == expected_accept => Ok(()),
            Some(accept) => Err(NetError::WsUpgradeFailed(format!(
                "Sec-WebSocket-Accept mismatch: got {}",
                accept
            ))),
            None => Err(NetError::WsUpgradeFailed(
                "response has no Sec-WebSocket-Accept header".into(),
            )),
        }
    }

    /// Send one masked text frame.
    pub async fn send_text(&mut self, text: &str) -> Result<(), NetError> {
        self.send_frame(OpCode::Text, text.as_bytes()).await
    }

    async fn send_frame(&mut self, opcode: OpCode, payload: &[u8]) -> Result<(), NetError> {
        if self.closed {
            return Err(NetError::ConnectionClosed);
        }
        let bytes = frame::encode(opcode, payload, true);
        let stream = self.stream.get_mut();
        stream.write_all(&bytes).await.ws_context("write frame")?;
        stream.flush().await.ws_context("flush frame")
    }

    /// Receive the next complete text message.
    ///
    /// Returns `Ok(None)` once the peer closes the connection (close frame or
    /// EOF). Binary messages are discarded.
    pub async fn recv(&mut self) -> Result<Option<String>, NetError> {
        if self.closed {
            return Ok(None);
        }

        let mut message: Option<(OpCode, Vec<u8>)> = None;
        loop {
            let frame = match frame::read_frame(&mut self.stream, self.max_payload).await? {
                Some(frame) => frame,
                None => {
                    self.closed = true;
                    return Ok(None);
                }
            };
            self.check_mask(&frame)?;

            match frame.opcode {
                OpCode::Ping => {
                    tracing::trace!(len = frame.payload.len(), "answering ping");
                    self.send_frame(OpCode::Pong, &frame.payload).await?;
                }
                OpCode::Pong => {}
                OpCode::Close => {
                    tracing::debug!(url = %self.url, "peer sent close frame");
                    let _ = self.send_frame(OpCode::Close, &frame.payload).await;
                    self.closed = true;
                    let _ = self.stream.get_mut().shutdown().await;
                    return Ok(None);
                }
                OpCode::Text | OpCode::Binary => {
                    if message.is_some() {
                        return Err(NetError::WsProtocolError(
                            "new data frame inside a fragmented message".into(),
                        ));
                    }
                    message = Some((frame.opcode, frame.payload.to_vec()));
                }
                OpCode::Continuation => match message.as_mut() {
                    Some((_, buf)) => {
                        if (buf.len() + frame.payload.len()) as u64 > self.max_payload {
                            return Err(NetError::MsgTooBig(
                                (buf.len() + frame.payload.len()) as u64,
                            ));
                        }
                        buf.extend_from_slice(&frame.payload);
                    }
                    None => {
                        return Err(NetError::WsProtocolError(
                            "continuation frame without a message".into(),
                        ))
                    }
                },
            }

            if frame.fin && !frame.opcode.is_control() {
                match message.take() {
                    Some((OpCode::Text, data)) => {
                        return String::from_utf8(data).map(Some).map_err(|_| {
                            NetError::WsProtocolError("text message is not UTF-8".into())
                        });
                    }
                    Some((_, data)) => {
                        tracing::trace!(len = data.len(), "skipping binary message");
                    }
                    None => {}
                }
            }
        }
    }

    fn check_mask(&self, frame: &Frame) -> Result<(), NetError> {
        if frame.masked {
            if self.reject_masked {
                return Err(NetError::WsProtocolError(
                    "server sent a masked frame".into(),
                ));
            }
            tracing::warn!(url = %self.url, "server sent a masked frame, accepting");
        }
        Ok(())
    }

    /// Graceful close: send a close frame (1000), then shut the TCP stream.
    pub async fn close(&mut self) -> Result<(), NetError> {
        if self.closed {
            return Ok(());
        }
        let result = self
            .send_frame(OpCode::Close, &CLOSE_NORMAL.to_be_bytes())
            .await;
        self.closed = true;
        let _ = self.stream.get_mut().shutdown().await;
        result
    }
}
