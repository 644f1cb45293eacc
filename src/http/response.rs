//! HTTP response with body access.

use crate::base::neterror::NetError;
use crate::http::ResponseBody;
use http::StatusCode;
use hyper::body::Incoming;
use std::time::Duration;
use tokio::time::Instant;

/// Response that owns its body.
#[derive(Debug)]
pub struct HttpResponse {
    status: StatusCode,
    body: Option<ResponseBody>,
}

impl HttpResponse {
    /// Wrap a hyper response. The body must be read before `deadline`;
    /// `what` and `timeout` describe the request if it is not.
    pub fn from_hyper(
        resp: http::Response<Incoming>,
        what: String,
        deadline: Instant,
        timeout: Duration,
    ) -> Self {
        let (parts, body) = resp.into_parts();
        Self {
            status: parts.status,
            body: Some(ResponseBody::new(body, what, deadline, timeout)),
        }
    }

    /// Fail with [`NetError::InvalidResponse`] unless the status is 2xx.
    pub fn error_for_status(self, what: &str) -> Result<Self, NetError> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(NetError::InvalidResponse(format!(
                "{} returned {}",
                what, self.status
            )))
        }
    }

    /// Take the response body. Only the first call returns it.
    pub fn take_body(&mut self) -> Option<ResponseBody> {
        self.body.take()
    }

    pub async fn json<T: serde::de::DeserializeOwned>(mut self) -> Result<T, NetError> {
        self.take_body().ok_or_else(body_taken)?.json().await
    }
}

fn body_taken() -> NetError {
    NetError::InvalidResponse("body already consumed".to_string())
}
