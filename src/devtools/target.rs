//! Browser tabs as reported by the discovery endpoint.

use serde::Deserialize;
use url::Url;

/// One entry of `GET /json` or the body of `PUT /json/new`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TargetInfo {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    pub web_socket_debugger_url: Option<String>,
}

impl TargetInfo {
    pub fn is_page(&self) -> bool {
        self.kind == "page"
    }

    /// `None` when the target has no debugger socket (already attached
    /// elsewhere, or not a debuggable type).
    pub fn into_target(self) -> Option<Target> {
        let debugger_url = self.web_socket_debugger_url?;
        Some(Target {
            host: host_of(&self.url),
            id: self.id,
            url: self.url,
            title: self.title,
            debugger_url,
        })
    }
}

/// A debuggable page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub id: String,
    pub url: String,
    pub title: String,
    /// Host name of `url`, without port.
    pub host: Option<String>,
    pub debugger_url: String,
}

impl Target {
    pub fn same_host(&self, url: &str) -> bool {
        match (&self.host, host_of(url)) {
            (Some(ours), Some(theirs)) => ours.eq_ignore_ascii_case(&theirs),
            _ => false,
        }
    }
}

pub(crate) fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(str::to_string)
}
