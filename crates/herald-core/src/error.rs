//! Error types for Herald

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::agent::AgentId;
use crate::target::GroupId;

pub type Result<T> = std::result::Result<T, HeraldError>;

#[derive(Error, Debug)]
pub enum HeraldError {
    #[error("Authentication failed for {agent_id}: {reason}")]
    AuthFailure { agent_id: AgentId, reason: String },

    #[error("Connection failed for {agent_id}: {reason}")]
    ConnectFailure { agent_id: AgentId, reason: String },

    #[error("{agent_id} timed out after {elapsed:?} during {operation}")]
    Timeout {
        agent_id: AgentId,
        operation: &'static str,
        elapsed: Duration,
    },

    #[error("No agents reached ready state ({attempted} attempted)")]
    NoAgentsReady { attempted: usize },

    #[error("No healthy agents available")]
    NoHealthyAgents,

    #[error("Agent not found: {agent_id}")]
    AgentNotFound { agent_id: AgentId },

    #[error("A campaign is already running")]
    CampaignBusy,

    #[error("Pool cannot {operation} while {state}")]
    InvalidPoolState {
        operation: &'static str,
        state: String,
    },

    #[error("Roster fetch for group {group} via {agent_id} failed: {reason}")]
    RosterFetch {
        agent_id: AgentId,
        group: GroupId,
        reason: String,
    },

    #[error("Credential source error: {reason}")]
    CredentialSource { reason: String },

    #[error("Invalid identifier: {input:?} is not a decimal id")]
    InvalidIdentifier { input: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Serialization error: {source}")]
    SerializationError {
        #[from]
        source: serde_json::Error,
    },
}

/// Why a single recipient could not be reached. Terminal for that recipient
/// within one campaign.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryError {
    #[error("agent offline")]
    AgentOffline,

    #[error("recipient has delivery disabled")]
    Forbidden,

    #[error("rate limited (retry after {retry_after_ms}ms) after exhausting retries")]
    RateLimited { retry_after_ms: u64 },

    #[error("send timed out")]
    Timeout,

    #[error("send failed: {detail}")]
    SendFailed { detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_agent() {
        let error = HeraldError::AuthFailure {
            agent_id: AgentId(3),
            reason: "bad secret".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Authentication failed for agent-3: bad secret"
        );
    }

    #[test]
    fn test_delivery_error_serializes_with_kind_tag() {
        let json = serde_json::to_value(DeliveryError::RateLimited {
            retry_after_ms: 1500,
        })
        .unwrap();
        assert_eq!(json["kind"], "rate_limited");
        assert_eq!(json["retry_after_ms"], 1500);
    }
}
