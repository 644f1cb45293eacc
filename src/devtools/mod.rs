//! Browser remote-debugging (CDP) client.
//!
//! Discovery goes over plain HTTP ([`crate::http`]); each tab's command
//! channel is a [`RawWebSocket`](crate::ws::RawWebSocket).

mod client;
pub mod discovery;
mod session;
mod target;

pub use client::{BrowserClient, Screenshot};
pub use discovery::{BrowserVersion, Discovery};
pub use session::CdpSession;
pub use target::Target;
