//! # clawnet
//!
//! Client library for an AI agent gateway and a headless browser.
//!
//! `clawnet` talks to two WebSocket peers:
//!
//! - an **agent gateway**, which keeps memory per session key and answers
//!   chat messages either in one piece or as a stream of deltas;
//! - a **browser** exposing the DevTools remote-debugging protocol, used to
//!   open pages and capture screenshots.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use clawnet::config::{BrowserConfig, GatewayConfig};
//! use clawnet::devtools::BrowserClient;
//! use clawnet::gateway::{ChatRequest, GatewayClient, StreamEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), clawnet::base::neterror::NetError> {
//!     let gateway = GatewayClient::new(GatewayConfig::from_env());
//!     let mut stream = gateway
//!         .stream_message(ChatRequest::new("Explain ownership").memory_id("rust-101"))
//!         .await?;
//!     while let Some(event) = stream.next_event().await {
//!         if let StreamEvent::Delta { delta, .. } = event {
//!             print!("{}", delta);
//!         }
//!     }
//!
//!     let mut browser = BrowserClient::new(BrowserConfig::from_env())?;
//!     browser.open("https://doc.rust-lang.org/book/").await?;
//!     browser.screenshot(Some("book.png".as_ref()), true).await?;
//!     browser.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error type and I/O context helpers
//! - [`config`] - Gateway and browser settings
//! - [`gateway`] - Agent gateway protocol client
//! - [`devtools`] - Browser remote-debugging client
//! - [`http`] - HTTP/1.1 client for browser discovery
//! - [`ws`] - WebSocket frame codec and connections

pub mod base;
pub mod config;
pub mod devtools;
pub mod gateway;
pub mod http;
pub mod ws;
