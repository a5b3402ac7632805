//! Outcome events in, one [`RunReport`] out.

use chrono::{DateTime, Utc};
use herald_core::{
    AgentId, AgentSnapshot, CampaignId, CampaignState, GroupId, OutcomeEvent, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: AgentId,
    pub credential_preview: String,
    pub connected: bool,
    pub can_list_members: bool,
    /// Whether the agent saw the roster of the campaign's group. `None` when
    /// the campaign had no group.
    pub group_member: Option<bool>,
    /// Bucket size under the static policy. `None` under the dynamic policy.
    pub assigned: Option<usize>,
    pub sent: u64,
    pub failed: u64,
    /// One line per failed target, in the order they failed.
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub generator: String,
    pub campaign_id: Option<CampaignId>,
    pub state: CampaignState,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_targets: usize,
    pub sent: u64,
    pub failed: u64,
    /// Failures not attributed to any agent.
    pub unattributed_failures: u64,
    pub agents: Vec<AgentRecord>,
}

impl RunReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        info!(path = %path.display(), agents = self.agents.len(), "run report written");
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
struct Tally {
    assigned: Option<usize>,
    sent: u64,
    failed: u64,
    errors: Vec<String>,
}

/// Accumulates [`OutcomeEvent`]s for one campaign.
#[derive(Debug)]
pub struct ReportAggregator {
    group: Option<GroupId>,
    campaign_id: Option<CampaignId>,
    state: CampaignState,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    total_targets: usize,
    sent: u64,
    failed: u64,
    unattributed_failures: u64,
    tallies: BTreeMap<AgentId, Tally>,
}

impl Default for ReportAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportAggregator {
    pub fn new() -> Self {
        Self {
            group: None,
            campaign_id: None,
            state: CampaignState::Idle,
            started_at: Utc::now(),
            finished_at: None,
            total_targets: 0,
            sent: 0,
            failed: 0,
            unattributed_failures: 0,
            tallies: BTreeMap::new(),
        }
    }

    pub fn with_group(mut self, group: GroupId) -> Self {
        self.group = Some(group);
        self
    }

    pub fn observe(&mut self, event: &OutcomeEvent) {
        match event {
            OutcomeEvent::Started {
                campaign_id,
                total_targets,
                agents,
                assigned,
                ..
            } => {
                self.campaign_id = Some(*campaign_id);
                self.state = CampaignState::Running;
                self.started_at = Utc::now();
                self.total_targets = *total_targets;
                for agent in agents {
                    self.tallies.entry(*agent).or_default();
                }
                for (agent, size) in assigned {
                    self.tallies.entry(*agent).or_default().assigned = Some(*size);
                }
            }
            OutcomeEvent::Delivered { agent, .. } => {
                self.sent += 1;
                self.tallies.entry(*agent).or_default().sent += 1;
            }
            OutcomeEvent::Failed {
                agent,
                target,
                reason,
            } => {
                self.failed += 1;
                match agent {
                    Some(agent) => {
                        let tally = self.tallies.entry(*agent).or_default();
                        tally.failed += 1;
                        tally.errors.push(format!("{target}: {reason}"));
                    }
                    None => self.unattributed_failures += 1,
                }
            }
            OutcomeEvent::Finished {
                state, sent, failed, ..
            } => {
                self.state = *state;
                self.finished_at = Some(Utc::now());
                if (*sent, *failed) != (self.sent, self.failed) {
                    debug!(
                        reported_sent = sent,
                        reported_failed = failed,
                        observed_sent = self.sent,
                        observed_failed = self.failed,
                        "final counts differ from observed events"
                    );
                    self.sent = *sent;
                    self.failed = *failed;
                }
            }
        }
    }

    /// Build the report. `snapshots` supply the per-agent connection
    /// details; agents seen only in events get a bare record.
    pub fn finish(self, snapshots: &[AgentSnapshot]) -> RunReport {
        let mut tallies = self.tallies;
        let mut agents: Vec<AgentRecord> = snapshots
            .iter()
            .map(|snapshot| {
                let tally = tallies.remove(&snapshot.id).unwrap_or_default();
                AgentRecord {
                    agent_id: snapshot.id,
                    credential_preview: snapshot.credential_preview.clone(),
                    connected: snapshot.state.is_connected(),
                    can_list_members: snapshot
                        .capabilities
                        .as_ref()
                        .is_some_and(|caps| caps.can_list_members),
                    group_member: self
                        .group
                        .map(|group| snapshot.memberships.contains_key(&group)),
                    assigned: tally.assigned,
                    sent: tally.sent,
                    failed: tally.failed,
                    errors: tally.errors,
                }
            })
            .collect();

        agents.extend(tallies.into_iter().map(|(agent_id, tally)| AgentRecord {
            agent_id,
            credential_preview: String::new(),
            connected: false,
            can_list_members: false,
            group_member: None,
            assigned: tally.assigned,
            sent: tally.sent,
            failed: tally.failed,
            errors: tally.errors,
        }));
        agents.sort_by_key(|record| record.agent_id);

        RunReport {
            generator: herald_core::BUILD_INFO.to_string(),
            campaign_id: self.campaign_id,
            state: self.state,
            started_at: self.started_at,
            finished_at: self.finished_at.unwrap_or_else(Utc::now),
            total_targets: self.total_targets,
            sent: self.sent,
            failed: self.failed,
            unattributed_failures: self.unattributed_failures,
            agents,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::{
        AbortReason, AgentState, Capabilities, DeliveryError, PartitionPolicy, TargetId,
    };

    fn snapshot(id: usize, state: AgentState) -> AgentSnapshot {
        AgentSnapshot {
            id: AgentId(id),
            credential_preview: format!("secret{id}..."),
            state,
            healthy: state == AgentState::Ready,
            consecutive_failures: 0,
            capabilities: Some(Capabilities {
                can_list_members: id == 0,
                ..Capabilities::default()
            }),
            memberships: BTreeMap::from([(GroupId(5), 3)]),
        }
    }

    fn started() -> OutcomeEvent {
        OutcomeEvent::Started {
            campaign_id: CampaignId::nil(),
            total_targets: 3,
            policy: PartitionPolicy::Dynamic,
            agents: vec![AgentId(0), AgentId(1)],
            assigned: Vec::new(),
        }
    }

    #[test]
    fn test_counts_per_agent() {
        let mut aggregator = ReportAggregator::new();
        aggregator.observe(&started());
        aggregator.observe(&OutcomeEvent::Delivered {
            agent: AgentId(0),
            target: TargetId(10),
        });
        aggregator.observe(&OutcomeEvent::Failed {
            agent: Some(AgentId(1)),
            target: TargetId(11),
            reason: DeliveryError::Forbidden,
        });
        aggregator.observe(&OutcomeEvent::Finished {
            campaign_id: CampaignId::nil(),
            state: CampaignState::Completed,
            sent: 1,
            failed: 1,
        });

        let report = aggregator.finish(&[
            snapshot(0, AgentState::Ready),
            snapshot(1, AgentState::Failed),
        ]);

        assert_eq!(report.state, CampaignState::Completed);
        assert_eq!((report.sent, report.failed), (1, 1));
        assert_eq!(report.agents.len(), 2);
        assert!(report.agents[0].connected);
        assert!(report.agents[0].can_list_members);
        assert_eq!(report.agents[0].group_member, None);
        assert!(!report.agents[1].connected);
        assert_eq!(
            report.agents[1].errors,
            vec!["11: recipient has delivery disabled".to_string()]
        );
    }

    #[test]
    fn test_group_membership_comes_from_snapshots() {
        let aggregator = ReportAggregator::new().with_group(GroupId(5));
        let mut other = snapshot(1, AgentState::Ready);
        other.memberships.clear();

        let report = aggregator.finish(&[snapshot(0, AgentState::Ready), other]);

        assert_eq!(report.agents[0].group_member, Some(true));
        assert_eq!(report.agents[1].group_member, Some(false));
    }

    #[test]
    fn test_every_error_line_is_kept() {
        let mut aggregator = ReportAggregator::new();
        for target in 0..60 {
            aggregator.observe(&OutcomeEvent::Failed {
                agent: Some(AgentId(0)),
                target: TargetId(target),
                reason: DeliveryError::Timeout,
            });
        }
        aggregator.observe(&OutcomeEvent::Failed {
            agent: None,
            target: TargetId(999),
            reason: DeliveryError::AgentOffline,
        });

        let report = aggregator.finish(&[]);
        assert_eq!(report.agents[0].failed, 60);
        assert_eq!(report.agents[0].errors.len(), 60);
        assert_eq!(report.agents[0].errors[0], "0: send timed out");
        assert_eq!(report.agents[0].errors[59], "59: send timed out");
        assert_eq!(report.unattributed_failures, 1);
        assert_eq!(report.state, CampaignState::Idle);
    }

    #[test]
    fn test_static_bucket_sizes_reach_agent_records() {
        let mut aggregator = ReportAggregator::new();
        aggregator.observe(&OutcomeEvent::Started {
            campaign_id: CampaignId::nil(),
            total_targets: 5,
            policy: PartitionPolicy::Static,
            agents: vec![AgentId(0), AgentId(1)],
            assigned: vec![(AgentId(0), 3), (AgentId(1), 2)],
        });

        let report = aggregator.finish(&[snapshot(0, AgentState::Ready)]);
        assert_eq!(report.agents[0].assigned, Some(3));
        assert_eq!(report.agents[1].assigned, Some(2));

        let mut aggregator = ReportAggregator::new();
        aggregator.observe(&started());
        let report = aggregator.finish(&[snapshot(0, AgentState::Ready)]);
        assert_eq!(report.agents[0].assigned, None);
    }

    #[test]
    fn test_aborted_state_serializes_with_reason() {
        let mut aggregator = ReportAggregator::new();
        aggregator.observe(&OutcomeEvent::Finished {
            campaign_id: CampaignId::nil(),
            state: CampaignState::Aborted(AbortReason::HighFailureRate),
            sent: 0,
            failed: 21,
        });
        let json: serde_json::Value =
            serde_json::from_str(&aggregator.finish(&[]).to_json().unwrap()).unwrap();

        assert_eq!(json["state"]["state"], "aborted");
        assert_eq!(json["failed"], 21);
    }
}
