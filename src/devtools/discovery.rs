//! The browser's HTTP discovery endpoints (`/json/*`).

use super::target::{Target, TargetInfo};
use crate::base::neterror::NetError;
use crate::http::HttpStreamFactory;
use http::Method;
use serde::Deserialize;
use std::time::Duration;

/// Response of `GET /json/version`.
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserVersion {
    #[serde(rename = "Browser", default)]
    pub browser: String,
    #[serde(rename = "Protocol-Version", default)]
    pub protocol_version: String,
    #[serde(rename = "User-Agent", default)]
    pub user_agent: String,
    #[serde(rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Discovery {
    factory: HttpStreamFactory,
}

impl Discovery {
    pub fn new(endpoint: &str) -> Result<Self, NetError> {
        Ok(Self {
            factory: HttpStreamFactory::new(endpoint)?,
        })
    }

    /// Bound each discovery request, body included.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.factory = self.factory.with_timeout(timeout);
        self
    }

    pub fn endpoint(&self) -> &str {
        self.factory.base().as_str()
    }

    /// Page targets that can be attached to.
    pub async fn list(&self) -> Result<Vec<Target>, NetError> {
        let infos: Vec<TargetInfo> = self
            .factory
            .request(Method::GET, "/json")
            .await?
            .error_for_status("GET /json")?
            .json()
            .await?;
        Ok(infos
            .into_iter()
            .filter(TargetInfo::is_page)
            .filter_map(TargetInfo::into_target)
            .collect())
    }

    /// Open a new tab at `url`.
    pub async fn create(&self, url: &str) -> Result<Target, NetError> {
        let encoded: String = url::form_urlencoded::byte_serialize(url.as_bytes()).collect();
        let info: TargetInfo = self
            .factory
            .request(Method::PUT, &format!("/json/new?{}", encoded))
            .await?
            .error_for_status("PUT /json/new")?
            .json()
            .await?;
        let id = info.id.clone();
        let target = info.into_target().ok_or_else(|| {
            NetError::InvalidResponse(format!("new target {} has no debugger URL", id))
        })?;
        tracing::debug!(target_id = %target.id, "created tab");
        Ok(target)
    }

    pub async fn close(&self, target_id: &str) -> Result<(), NetError> {
        self.factory
            .request(Method::GET, &format!("/json/close/{}", target_id))
            .await?
            .error_for_status("GET /json/close")?;
        tracing::debug!(target_id, "closed tab");
        Ok(())
    }

    pub async fn version(&self) -> Result<BrowserVersion, NetError> {
        self.factory
            .request(Method::GET, "/json/version")
            .await?
            .error_for_status("GET /json/version")?
            .json()
            .await
    }
}
