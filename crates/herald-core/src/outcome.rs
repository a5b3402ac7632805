//! Campaign outcome types, streamed to report aggregators

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::agent::AgentId;
use crate::error::DeliveryError;
use crate::policy::PartitionPolicy;
use crate::target::TargetId;

pub type CampaignId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    NoHealthyAgents,
    AllAgentsFailed,
    HighFailureRate,
    Cancelled,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AbortReason::NoHealthyAgents => "no healthy agents",
            AbortReason::AllAgentsFailed => "all agents failed",
            AbortReason::HighFailureRate => "high failure rate",
            AbortReason::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum CampaignState {
    Idle,
    Running,
    Completed,
    Aborted(AbortReason),
}

impl CampaignState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CampaignState::Completed | CampaignState::Aborted(_))
    }
}

impl fmt::Display for CampaignState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CampaignState::Idle => f.write_str("idle"),
            CampaignState::Running => f.write_str("running"),
            CampaignState::Completed => f.write_str("completed"),
            CampaignState::Aborted(reason) => write!(f, "aborted: {reason}"),
        }
    }
}

/// Incremental progress of a running campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OutcomeEvent {
    Started {
        campaign_id: CampaignId,
        total_targets: usize,
        policy: PartitionPolicy,
        agents: Vec<AgentId>,
        /// Bucket size per agent. Only the static policy fixes buckets up front.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        assigned: Vec<(AgentId, usize)>,
    },
    Delivered {
        agent: AgentId,
        target: TargetId,
    },
    Failed {
        agent: Option<AgentId>,
        target: TargetId,
        reason: DeliveryError,
    },
    Finished {
        campaign_id: CampaignId,
        state: CampaignState,
        sent: u64,
        failed: u64,
    },
}
