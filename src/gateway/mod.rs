//! Agent gateway protocol.
//!
//! A run walks `Connecting → NonceReceived → Authenticated → RequestSent`
//! and then either `WaitingFinal` (one-shot) or `Streaming`, ending in
//! `Completed` or `Failed`. See [`RunState`].

mod client;
pub mod frames;
mod session;
mod state;
mod stream;

pub use client::{ChatReply, ChatRequest, GatewayClient, Run};
pub use session::{SessionKey, DEFAULT_MEMORY_SUFFIX};
pub use state::RunState;
pub use stream::{ChatStream, StreamEvent};
