//! Agent types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::target::GroupId;

/// Pool-assigned ordinal. Stable for the lifetime of the pool, so it doubles
/// as the index used by round-robin assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub usize);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent-{}", self.0)
    }
}

/// Connectivity state of one agent.
///
/// `Failed` and `Closed` are terminal. A failed agent is never handed work
/// again for the remainder of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Disconnected,
    Connecting,
    Ready,
    Degraded,
    Closed,
    Failed,
}

impl AgentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentState::Closed | AgentState::Failed)
    }

    /// Whether the session has been established at least once.
    pub fn is_connected(&self) -> bool {
        matches!(self, AgentState::Ready | AgentState::Degraded)
    }
}

/// Opaque secret identifying one session. Debug output is redacted.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential(String);

impl Credential {
    const PREVIEW_LEN: usize = 8;

    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Short prefix safe to log and persist.
    pub fn preview(&self) -> String {
        if self.0.is_empty() {
            return "(empty)".to_string();
        }
        let prefix: String = self.0.chars().take(Self::PREVIEW_LEN).collect();
        format!("{prefix}...")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&self.preview()).finish()
    }
}

/// What a session negotiated at connect time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub account_id: u64,
    pub display_name: String,
    pub can_list_members: bool,
    pub can_open_direct: bool,
}

/// Point-in-time view of an agent, used for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: AgentId,
    pub credential_preview: String,
    pub state: AgentState,
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub capabilities: Option<Capabilities>,
    pub memberships: BTreeMap<GroupId, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_preview_never_leaks_secret() {
        let credential = Credential::new("abcdefghijklmnop");
        assert_eq!(credential.preview(), "abcdefgh...");
        assert!(!format!("{credential:?}").contains("ijklmnop"));
    }

    #[test]
    fn test_short_and_empty_credential_preview() {
        assert_eq!(Credential::new("abc").preview(), "abc...");
        assert_eq!(Credential::new("").preview(), "(empty)");
    }

    #[test]
    fn test_terminal_states() {
        assert!(AgentState::Failed.is_terminal());
        assert!(AgentState::Closed.is_terminal());
        assert!(!AgentState::Degraded.is_terminal());
        assert!(AgentState::Degraded.is_connected());
        assert!(!AgentState::Connecting.is_connected());
    }
}
