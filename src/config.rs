//! Client configuration.
//!
//! Both configs are plain values with builder-style setters. The host owns
//! where values come from; [`GatewayConfig::from_env`] and
//! [`BrowserConfig::from_env`] cover the common case of environment
//! variables.

use std::time::Duration;

pub const DEFAULT_GATEWAY_URL: &str = "ws://127.0.0.1:18789";
pub const DEFAULT_BROWSER_URL: &str = "http://127.0.0.1:9222";
pub const DEFAULT_AGENT: &str = "main";
pub const DEFAULT_SESSION_PREFIX: &str = "app";
pub const DEFAULT_CLIENT_NAME: &str = "clawnet";

/// Settings for [`GatewayClient`](crate::gateway::GatewayClient).
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Gateway WebSocket URL (`ws://` or `wss://`).
    pub url: String,
    /// Bearer token sent in the `connect` request.
    pub token: Option<String>,
    /// Overall deadline for an agent response, per call.
    pub response_timeout: Duration,
    /// Namespace segment of derived session keys.
    pub session_prefix: String,
    /// Agent used when a request does not name one.
    pub default_agent: String,
    /// Display name reported in the client identity.
    pub client_name: String,
    /// Bounds opening the socket and, separately, the wait for
    /// `connect.challenge`.
    pub challenge_timeout: Duration,
    pub ack_timeout: Duration,
    /// Silence on a stream longer than this yields an idle tick.
    pub idle_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_GATEWAY_URL.to_string(),
            token: None,
            response_timeout: Duration::from_secs(600),
            session_prefix: DEFAULT_SESSION_PREFIX.to_string(),
            default_agent: DEFAULT_AGENT.to_string(),
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            challenge_timeout: Duration::from_secs(10),
            ack_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(30),
        }
    }
}

impl GatewayConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Build from environment variables.
    ///
    /// Reads `OPENCLAW_GATEWAY_URL`, `OPENCLAW_GATEWAY_TOKEN`,
    /// `OPENCLAW_RESPONSE_TIMEOUT` (seconds), `OPENCLAW_SESSION_PREFIX`,
    /// `OPENCLAW_DEFAULT_AGENT` and `OPENCLAW_CLIENT_NAME`. Missing or
    /// unparseable values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(url) = non_empty(lookup("OPENCLAW_GATEWAY_URL")) {
            config.url = url;
        }
        config.token = non_empty(lookup("OPENCLAW_GATEWAY_TOKEN"));
        if let Some(secs) = lookup("OPENCLAW_RESPONSE_TIMEOUT").and_then(|v| v.trim().parse().ok())
        {
            config.response_timeout = Duration::from_secs(secs);
        }
        if let Some(prefix) = non_empty(lookup("OPENCLAW_SESSION_PREFIX")) {
            config.session_prefix = prefix;
        }
        if let Some(agent) = non_empty(lookup("OPENCLAW_DEFAULT_AGENT")) {
            config.default_agent = agent;
        }
        if let Some(name) = non_empty(lookup("OPENCLAW_CLIENT_NAME")) {
            config.client_name = name;
        }
        config
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_session_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.session_prefix = prefix.into();
        self
    }

    pub fn with_default_agent(mut self, agent: impl Into<String>) -> Self {
        self.default_agent = agent.into();
        self
    }

    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    pub fn with_challenge_timeout(mut self, timeout: Duration) -> Self {
        self.challenge_timeout = timeout;
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }
}

/// Settings for [`BrowserClient`](crate::devtools::BrowserClient).
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Remote-debugging HTTP endpoint, e.g. `http://127.0.0.1:9222`.
    pub endpoint: String,
    /// Reply deadline per CDP command. Also bounds each discovery request
    /// and each per-tab socket upgrade.
    pub command_timeout: Duration,
    /// Timeout for the reachability probe.
    pub probe_timeout: Duration,
    /// Upper bound on the in-page `document.readyState` poll.
    pub page_load_timeout: Duration,
    /// Pause after navigation before polling readiness.
    pub settle_delay: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_BROWSER_URL.to_string(),
            command_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(3),
            page_load_timeout: Duration::from_secs(10),
            settle_delay: Duration::from_millis(500),
        }
    }
}

impl BrowserConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Build from `OPENCLAW_BROWSER_URL`, falling back to the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        match non_empty(lookup("OPENCLAW_BROWSER_URL")) {
            Some(endpoint) => Self::new(endpoint),
            None => Self::default(),
        }
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_page_load_timeout(mut self, timeout: Duration) -> Self {
        self.page_load_timeout = timeout;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
