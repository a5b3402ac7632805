//! Target distribution
//!
//! Both policies use the same round-robin rule: the k-th target goes to
//! `agents[k mod n]`. They differ in which agent list `n` counts.

use agent_pool::{Agent, AgentPool};
use herald_core::{AgentId, PartitionPolicy, TargetId};
use std::sync::Arc;

/// Round-robin buckets: one per agent, sizes differ by at most one, and
/// each bucket keeps input order.
pub fn partition<T: Clone>(targets: &[T], agents: usize) -> Vec<Vec<T>> {
    if agents == 0 {
        return Vec::new();
    }
    let mut buckets: Vec<Vec<T>> = vec![Vec::new(); agents];
    for (position, target) in targets.iter().enumerate() {
        if let Some(bucket) = buckets.get_mut(position % agents) {
            bucket.push(target.clone());
        }
    }
    buckets
}

/// The agent at `position mod len`, or `None` for an empty list.
pub fn pick<A>(position: usize, agents: &[A]) -> Option<&A> {
    if agents.is_empty() {
        return None;
    }
    agents.get(position % agents.len())
}

/// Where the next send should go.
#[derive(Debug)]
pub enum Assignment {
    Agent(Arc<Agent>),
    /// Static policy only: the bucket owner is no longer healthy.
    Offline(AgentId),
    /// No agent is left to carry the campaign.
    Exhausted,
}

#[derive(Debug)]
pub struct Distributor {
    policy: PartitionPolicy,
    snapshot: Vec<Arc<Agent>>,
}

impl Distributor {
    /// `snapshot` is the healthy agent list taken at campaign start.
    pub fn new(policy: PartitionPolicy, snapshot: Vec<Arc<Agent>>) -> Self {
        Self { policy, snapshot }
    }

    pub fn policy(&self) -> PartitionPolicy {
        self.policy
    }

    pub fn snapshot(&self) -> &[Arc<Agent>] {
        &self.snapshot
    }

    /// Bucket size each snapshot agent owns for `targets` recipients. Empty
    /// under the dynamic policy, where ownership is decided per send.
    pub fn bucket_sizes(&self, targets: usize) -> Vec<(AgentId, usize)> {
        if self.policy != PartitionPolicy::Static || self.snapshot.is_empty() {
            return Vec::new();
        }
        let agents = self.snapshot.len();
        self.snapshot
            .iter()
            .enumerate()
            .map(|(slot, agent)| {
                let extra = usize::from(slot < targets % agents);
                (agent.id(), targets / agents + extra)
            })
            .collect()
    }

    /// Whether any agent of the start snapshot is still healthy.
    pub fn snapshot_alive(&self) -> bool {
        self.snapshot.iter().any(|agent| agent.is_healthy())
    }

    /// Decide the agent for the target at `position`.
    pub fn assign(&self, position: usize, pool: &AgentPool) -> Assignment {
        match self.policy {
            PartitionPolicy::Static => {
                if !self.snapshot_alive() {
                    return Assignment::Exhausted;
                }
                match pick(position, &self.snapshot) {
                    Some(agent) if agent.is_healthy() => Assignment::Agent(Arc::clone(agent)),
                    Some(agent) => Assignment::Offline(agent.id()),
                    None => Assignment::Exhausted,
                }
            }
            PartitionPolicy::Dynamic => {
                let healthy = pool.healthy_agents();
                match pick(position, &healthy) {
                    Some(agent) => Assignment::Agent(Arc::clone(agent)),
                    None => Assignment::Exhausted,
                }
            }
        }
    }

    /// Static buckets paired with the snapshot agent that owns them.
    pub fn buckets(&self, targets: &[TargetId]) -> Vec<(Arc<Agent>, Vec<TargetId>)> {
        self.snapshot
            .iter()
            .cloned()
            .zip(partition(targets, self.snapshot.len()))
            .collect()
    }
}
