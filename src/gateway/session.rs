//! Session key derivation.
//!
//! The gateway remembers a conversation per session key, so the key must be
//! byte-identical whenever the caller means "the same conversation".

use std::fmt;

/// Suffix used when the caller supplies no memory id.
pub const DEFAULT_MEMORY_SUFFIX: &str = "default";

/// Peer-visible conversation identifier: `agent:{agent}:{prefix}-{memory}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    /// Derive the key for a memory id / agent pair.
    ///
    /// ```
    /// use clawnet::gateway::SessionKey;
    ///
    /// let key = SessionKey::derive(None, None, "main", "ns");
    /// assert_eq!(key.as_str(), "agent:main:ns-default");
    /// ```
    pub fn derive(
        memory_id: Option<&str>,
        agent_id: Option<&str>,
        default_agent: &str,
        prefix: &str,
    ) -> Self {
        let agent = agent_id.unwrap_or(default_agent);
        let memory = memory_id.unwrap_or(DEFAULT_MEMORY_SUFFIX);
        SessionKey(format!("agent:{}:{}-{}", agent, prefix, memory))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
