//! Ergonomic error context helpers.
//!
//! Provides extension traits for adding context to `Result` types,
//! converting IO errors into context-rich `NetError` variants.

use crate::base::neterror::NetError;
use std::io;

/// Extension trait for adding context to IO Results.
pub trait IoResultExt<T> {
    /// Report a failed connect to a browser endpoint.
    ///
    /// # Example
    /// ```ignore
    /// use clawnet::base::context::IoResultExt;
    ///
    /// let stream = TcpStream::connect(("127.0.0.1", 9222)).await
    ///     .unreachable_context("http://127.0.0.1:9222/")?;
    /// // Error: "Browser unreachable at http://127.0.0.1:9222/ (connection refused)"
    /// ```
    fn unreachable_context(self, endpoint: &str) -> Result<T, NetError>;

    /// Map an IO error on an established raw WebSocket to a protocol error.
    fn ws_context(self, what: &str) -> Result<T, NetError>;
}

impl<T> IoResultExt<T> for Result<T, io::Error> {
    fn unreachable_context(self, endpoint: &str) -> Result<T, NetError> {
        self.map_err(|e| NetError::browser_unreachable(endpoint, e))
    }

    fn ws_context(self, what: &str) -> Result<T, NetError> {
        self.map_err(|e| NetError::WsProtocolError(format!("{}: {}", what, e)))
    }
}
