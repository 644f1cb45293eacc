//! HTTP/1.1 connections to the browser's discovery endpoint.
//!
//! One connection per request: discovery traffic is a handful of small
//! GET/PUT calls, so there is nothing to pool.

use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::http::HttpResponse;
use bytes::Bytes;
use http::{header, Method, Request, Response};
use http_body_util::Empty;
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::spawn;
use tokio::time::{timeout_at, Instant};
use url::Url;

/// Bound on one request, body included, unless set with
/// [`HttpStreamFactory::with_timeout`].
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A handshaken HTTP/1.1 connection.
pub struct HttpStream {
    sender: http1::SendRequest<Empty<Bytes>>,
}

impl HttpStream {
    pub async fn send_request(
        &mut self,
        req: Request<Empty<Bytes>>,
    ) -> Result<Response<Incoming>, NetError> {
        self.sender.send_request(req).await.map_err(|e| {
            tracing::debug!(error = %e, "discovery request failed");
            NetError::InvalidResponse(e.to_string())
        })
    }
}

/// Opens [`HttpStream`]s to one `http://host:port` endpoint.
#[derive(Debug, Clone)]
pub struct HttpStreamFactory {
    base: Url,
    host: String,
    port: u16,
    timeout: Duration,
}

impl HttpStreamFactory {
    pub fn new(endpoint: &str) -> Result<Self, NetError> {
        let base = Url::parse(endpoint).map_err(|_| NetError::InvalidUrl(endpoint.to_string()))?;
        if base.scheme() != "http" {
            return Err(NetError::InvalidUrl(endpoint.to_string()));
        }
        let host = base
            .host_str()
            .ok_or_else(|| NetError::InvalidUrl(endpoint.to_string()))?
            .to_string();
        let port = base.port_or_known_default().unwrap_or(80);
        Ok(Self {
            base,
            host,
            port,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub async fn request_stream(&self) -> Result<HttpStream, NetError> {
        let socket = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .unreachable_context(self.base.as_str())?;

        let io = TokioIo::new(socket);
        let (sender, conn) = http1::handshake(io)
            .await
            .map_err(|e| NetError::browser_unreachable(self.base.as_str(), e))?;

        spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!(error = %e, "discovery connection ended with error");
            }
        });

        Ok(HttpStream { sender })
    }

    /// Issue `method path_and_query` with an empty body.
    ///
    /// Connect, response head and body share one deadline; the returned
    /// response carries it for the body read.
    pub async fn request(
        &self,
        method: Method,
        path_and_query: &str,
    ) -> Result<HttpResponse, NetError> {
        let req = Request::builder()
            .method(method.clone())
            .uri(path_and_query)
            .header(header::HOST, format!("{}:{}", self.host, self.port))
            .body(Empty::<Bytes>::new())
            .map_err(|e| NetError::InvalidUrl(format!("{}: {}", path_and_query, e)))?;

        tracing::debug!(%method, path = path_and_query, "discovery request");
        let what = format!("{} {}", method, path_and_query);
        let deadline = Instant::now() + self.timeout;
        let resp = timeout_at(deadline, async {
            let mut stream = self.request_stream().await?;
            stream.send_request(req).await
        })
        .await
        .map_err(|_| NetError::browser_timed_out(what.clone(), self.timeout))??;
        Ok(HttpResponse::from_hyper(resp, what, deadline, self.timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_rejects_non_http() {
        assert!(matches!(
            HttpStreamFactory::new("ws://127.0.0.1:9222"),
            Err(NetError::InvalidUrl(_))
        ));
        assert!(HttpStreamFactory::new("not a url").is_err());
    }

    #[test]
    fn test_factory_default_port() {
        let factory = HttpStreamFactory::new("http://chrome").unwrap();
        assert_eq!(factory.port, 80);
        let factory = HttpStreamFactory::new("http://127.0.0.1:9222").unwrap();
        assert_eq!(factory.host, "127.0.0.1");
        assert_eq!(factory.port, 9222);
        assert_eq!(factory.timeout, DEFAULT_REQUEST_TIMEOUT);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let factory = HttpStreamFactory::new(&format!("http://127.0.0.1:{}", port)).unwrap();
        let err = factory.request(Method::GET, "/json").await.unwrap_err();
        assert!(matches!(err, NetError::BrowserUnreachable(_)));
    }

    #[tokio::test]
    async fn test_silent_endpoint_times_out() {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            while stream.read(&mut buf).await.unwrap_or(0) > 0 {}
        });

        let factory = HttpStreamFactory::new(&format!("http://127.0.0.1:{}", port))
            .unwrap()
            .with_timeout(Duration::from_millis(200));
        let err = factory.request(Method::GET, "/json").await.unwrap_err();
        assert_eq!(
            err,
            NetError::BrowserTimedOut {
                what: "GET /json".to_string(),
                secs: 0
            }
        );
    }

    #[tokio::test]
    async fn test_stalled_body_times_out() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // Head arrives, the promised body never does.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n[")
                .await
                .unwrap();
            while stream.read(&mut buf).await.unwrap_or(0) > 0 {}
        });

        let factory = HttpStreamFactory::new(&format!("http://127.0.0.1:{}", port))
            .unwrap()
            .with_timeout(Duration::from_millis(300));
        let resp = factory.request(Method::GET, "/json").await.unwrap();
        let err = resp.json::<serde_json::Value>().await.unwrap_err();
        assert!(err.is_timeout());
        assert!(matches!(err, NetError::BrowserTimedOut { ref what, .. } if what == "GET /json"));
    }
}
