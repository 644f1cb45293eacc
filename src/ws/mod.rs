//! WebSocket client support.
//!
//! Two transports live here:
//! - [`WebSocket`]: tokio-tungstenite backed, used for the agent gateway
//! - [`RawWebSocket`]: hand-rolled RFC 6455 client built on [`frame`], used
//!   for per-tab DevTools sockets
//!
//! # Example
//! ```ignore
//! use clawnet::ws::RawWebSocket;
//!
//! let mut ws = RawWebSocket::connect("ws://127.0.0.1:9222/devtools/page/ABC").await?;
//! ws.send_text(r#"{"id":1,"method":"Page.enable"}"#).await?;
//! let reply = ws.recv().await?;
//! ws.close().await?;
//! ```

mod connection;
pub mod frame;
mod raw;

pub use connection::WebSocket;
pub use frame::{Frame, OpCode};
pub use raw::RawWebSocket;
