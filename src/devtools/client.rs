//! Headless-browser control over the DevTools protocol.
//!
//! The client tracks at most one tab. `open` prefers a tab already showing
//! the same host; otherwise it creates one. The tab's socket is opened
//! lazily and kept until the tab changes, a command times out, or
//! [`BrowserClient::close`] is called.

use super::discovery::Discovery;
use super::session::CdpSession;
use super::target::Target;
use crate::base::neterror::NetError;
use crate::config::BrowserConfig;
use base64::Engine;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio::time::sleep;

/// Result of [`BrowserClient::screenshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screenshot {
    /// PNG written to this path.
    Saved(PathBuf),
    /// Base64 PNG data, when no path was given.
    Base64(String),
}

struct ActiveTarget {
    target: Target,
    session: Option<CdpSession>,
}

pub struct BrowserClient {
    config: BrowserConfig,
    discovery: Discovery,
    current: Option<ActiveTarget>,
}

impl BrowserClient {
    pub fn new(config: BrowserConfig) -> Result<Self, NetError> {
        let discovery = Discovery::new(&config.endpoint)?.with_timeout(config.command_timeout);
        Ok(Self {
            config,
            discovery,
            current: None,
        })
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    pub fn current_target(&self) -> Option<&Target> {
        self.current.as_ref().map(|active| &active.target)
    }

    /// Debuggable page tabs currently open in the browser.
    pub async fn list_tabs(&self) -> Result<Vec<Target>, NetError> {
        self.discovery.list().await
    }

    /// Show `url`, reusing a tab on the same host when there is one.
    /// Returns the target id.
    pub async fn open(&mut self, url: &str) -> Result<String, NetError> {
        let tabs = self.discovery.list().await?;

        if let Some(tab) = tabs.into_iter().find(|tab| tab.same_host(url)) {
            let id = tab.id.clone();
            let needs_navigate = tab.url != url;
            tracing::debug!(target_id = %id, needs_navigate, "reusing tab");
            self.adopt(tab).await;
            if needs_navigate {
                self.navigate(url).await?;
            }
            return Ok(id);
        }

        let tab = self.discovery.create(url).await?;
        let id = tab.id.clone();
        self.adopt(tab).await;
        self.wait_for_ready().await?;
        Ok(id)
    }

    /// Navigate the current tab and wait for the page to load.
    pub async fn navigate(&mut self, url: &str) -> Result<(), NetError> {
        if self.current.is_none() {
            return Err(NetError::NoTabOpen);
        }
        let result = self.call("Page.navigate", json!({ "url": url })).await?;
        if let Some(error) = result.get("errorText").and_then(Value::as_str) {
            return Err(NetError::CommandFailed {
                method: "Page.navigate".to_string(),
                message: error.to_string(),
            });
        }
        self.wait_for_ready().await?;
        if let Some(active) = self.current.as_mut() {
            active.target.url = url.to_string();
        }
        Ok(())
    }

    /// Capture the current tab as PNG.
    ///
    /// With `full_page` the capture is clipped to the larger of the content
    /// size and the viewport in each dimension.
    pub async fn screenshot(
        &mut self,
        path: Option<&Path>,
        full_page: bool,
    ) -> Result<Screenshot, NetError> {
        if self.current.is_none() {
            return Err(NetError::NoTabOpen);
        }

        let mut params = json!({ "format": "png" });
        if full_page {
            let metrics = self.call("Page.getLayoutMetrics", json!({})).await?;
            let (width, height) = full_page_size(&metrics)?;
            params["captureBeyondViewport"] = json!(true);
            params["clip"] = json!({
                "x": 0,
                "y": 0,
                "width": width,
                "height": height,
                "scale": 1,
            });
        }

        let result = self.call("Page.captureScreenshot", params).await?;
        let data = result
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| NetError::InvalidResponse("screenshot returned no data".to_string()))?
            .to_string();

        let Some(path) = path else {
            return Ok(Screenshot::Base64(data));
        };
        let png = base64::engine::general_purpose::STANDARD
            .decode(data.as_bytes())
            .map_err(|e| NetError::InvalidResponse(format!("screenshot data: {}", e)))?;
        tokio::fs::write(path, &png)
            .await
            .map_err(|e| NetError::ScreenshotWriteFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        tracing::debug!(path = %path.display(), bytes = png.len(), "screenshot saved");
        Ok(Screenshot::Saved(path.to_path_buf()))
    }

    /// Evaluate `expression` in the current tab and return its value.
    /// Promises are awaited.
    pub async fn evaluate(&mut self, expression: &str) -> Result<Value, NetError> {
        if self.current.is_none() {
            return Err(NetError::NoTabOpen);
        }
        let result = self
            .call(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            let message = details
                .pointer("/exception/description")
                .or_else(|| details.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("script threw")
                .to_string();
            return Err(NetError::CommandFailed {
                method: "Runtime.evaluate".to_string(),
                message,
            });
        }
        Ok(result.pointer("/result/value").cloned().unwrap_or(Value::Null))
    }

    /// True if the discovery endpoint answers within the probe timeout.
    pub async fn test_connection(&self) -> bool {
        match tokio::time::timeout(self.config.probe_timeout, self.discovery.version()).await {
            Ok(Ok(version)) => {
                tracing::debug!(browser = %version.browser, "browser reachable");
                true
            }
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "browser probe failed");
                false
            }
            Err(_) => {
                tracing::debug!(endpoint = self.discovery.endpoint(), "browser probe timed out");
                false
            }
        }
    }

    /// Close the current tab's socket and the tab itself.
    pub async fn close(&mut self) -> Result<(), NetError> {
        let Some(active) = self.current.take() else {
            return Ok(());
        };
        if let Some(session) = active.session {
            session.close().await;
        }
        self.discovery.close(&active.target.id).await
    }

    async fn adopt(&mut self, target: Target) {
        if let Some(active) = self.current.as_mut() {
            if active.target.id == target.id {
                active.target = target;
                return;
            }
        }
        if let Some(old) = self.current.take() {
            if let Some(session) = old.session {
                session.close().await;
            }
        }
        tracing::debug!(target_id = %target.id, "adopted tab");
        self.current = Some(ActiveTarget {
            target,
            session: None,
        });
    }

    /// Pause briefly, then poll `document.readyState` in the page until it
    /// is `complete` or the page-load timeout passes.
    async fn wait_for_ready(&mut self) -> Result<(), NetError> {
        sleep(self.config.settle_delay).await;
        let script = ready_state_script(self.config.page_load_timeout.as_millis());
        let state = self.evaluate(&script).await?;
        tracing::debug!(ready_state = %state, "page ready");
        Ok(())
    }

    async fn session(&mut self) -> Result<&mut CdpSession, NetError> {
        let command_timeout = self.config.command_timeout;
        let active = self.current.as_mut().ok_or(NetError::NoTabOpen)?;
        if active.session.is_none() {
            let session = CdpSession::connect(&active.target.debugger_url, command_timeout).await?;
            active.session = Some(session);
        }
        active.session.as_mut().ok_or(NetError::NoTabOpen)
    }

    async fn call(&mut self, method: &str, params: Value) -> Result<Value, NetError> {
        let result = self.session().await?.call(method, params).await;
        if let Err(e) = &result {
            if session_is_broken(e) {
                tracing::debug!(method, error = %e, "dropping cdp session");
                if let Some(active) = self.current.as_mut() {
                    active.session = None;
                }
            }
        }
        result
    }
}

impl std::fmt::Debug for BrowserClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserClient")
            .field("endpoint", &self.config.endpoint)
            .field("current", &self.current_target())
            .finish()
    }
}

fn session_is_broken(err: &NetError) -> bool {
    matches!(
        err,
        NetError::CommandTimedOut { .. } | NetError::WsProtocolError(_) | NetError::MsgTooBig(_)
    )
}

fn ready_state_script(timeout_ms: u128) -> String {
    format!(
        "new Promise((resolve) => {{\
           const deadline = Date.now() + {};\
           const check = () => {{\
             if (document.readyState === 'complete' || Date.now() > deadline) {{\
               resolve(document.readyState);\
             }} else {{\
               setTimeout(check, 100);\
             }}\
           }};\
           check();\
         }})",
        timeout_ms
    )
}

/// Clip size for a full-page capture from `Page.getLayoutMetrics`.
///
/// Newer browsers report CSS-pixel metrics under `css*` keys; older ones
/// only have the legacy names.
pub(crate) fn full_page_size(metrics: &Value) -> Result<(f64, f64), NetError> {
    let content = metrics
        .get("cssContentSize")
        .or_else(|| metrics.get("contentSize"));
    let viewport = metrics
        .get("cssLayoutViewport")
        .or_else(|| metrics.get("layoutViewport"));

    let number = |v: Option<&Value>, key: &str| v.and_then(|v| v.get(key)).and_then(Value::as_f64);

    let content_width = number(content, "width");
    let content_height = number(content, "height");
    let viewport_width = number(viewport, "clientWidth");
    let viewport_height = number(viewport, "clientHeight");

    if content_width.is_none() && viewport_width.is_none() {
        return Err(NetError::InvalidResponse(
            "layout metrics without content or viewport size".to_string(),
        ));
    }

    let width = content_width.unwrap_or(0.0).max(viewport_width.unwrap_or(0.0));
    let height = content_height.unwrap_or(0.0).max(viewport_height.unwrap_or(0.0));
    Ok((width, height))
}
