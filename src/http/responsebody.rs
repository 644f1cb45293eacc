//! Response body collection.

use crate::base::neterror::NetError;
use bytes::Bytes;
use hyper::body::Incoming;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

#[derive(Debug)]
pub struct ResponseBody {
    inner: Incoming,
    what: String,
    deadline: Instant,
    timeout: Duration,
}

impl ResponseBody {
    pub fn new(inner: Incoming, what: String, deadline: Instant, timeout: Duration) -> Self {
        Self {
            inner,
            what,
            deadline,
            timeout,
        }
    }

    /// Read entire body as bytes, failing once the request deadline passes.
    pub async fn bytes(self) -> Result<Bytes, NetError> {
        use http_body_util::BodyExt;
        let collected = timeout_at(self.deadline, self.inner.collect())
            .await
            .map_err(|_| NetError::browser_timed_out(self.what, self.timeout))?
            .map_err(|e| NetError::InvalidResponse(format!("body read failed: {}", e)))?;
        Ok(collected.to_bytes())
    }

    /// Read body as JSON, deserializing to type T.
    pub async fn json<T: serde::de::DeserializeOwned>(self) -> Result<T, NetError> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| NetError::InvalidResponse(e.to_string()))
    }
}
