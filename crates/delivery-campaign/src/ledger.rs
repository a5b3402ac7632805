//! Per-target status for one campaign.
//!
//! `claim` is the single mutation point that moves a target out of
//! `unassigned`; a target can be claimed once, so it is attempted once, even
//! when several workers share the ledger.

use dashmap::DashMap;
use herald_core::{dedup_preserving_order, AgentId, DeliveryError, TargetId, TargetStatus};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

#[derive(Debug)]
pub struct Ledger {
    order: Vec<TargetId>,
    statuses: DashMap<TargetId, TargetStatus>,
    sent: AtomicU64,
    failed: AtomicU64,
}

impl Ledger {
    pub fn new(targets: &[TargetId]) -> Self {
        let order = dedup_preserving_order(targets.iter().copied());
        let statuses = order
            .iter()
            .map(|target| (*target, TargetStatus::Unassigned))
            .collect();
        Self {
            order,
            statuses,
            sent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn is_unassigned(&self, target: TargetId) -> bool {
        self.statuses
            .get(&target)
            .is_some_and(|status| *status == TargetStatus::Unassigned)
    }

    /// Move `target` from `unassigned` to `assigned(agent)`. Returns false if
    /// the target is unknown or was already claimed.
    pub fn claim(&self, target: TargetId, agent: AgentId) -> bool {
        match self.statuses.get_mut(&target) {
            Some(mut status) if *status == TargetStatus::Unassigned => {
                *status = TargetStatus::Assigned { agent };
                true
            }
            _ => {
                debug!(%target, "target already claimed, skipping");
                false
            }
        }
    }

    /// Record the attempt result for a claimed target and return the running
    /// `(sent, failed)` counts.
    pub fn settle(
        &self,
        target: TargetId,
        agent: AgentId,
        result: &Result<(), DeliveryError>,
    ) -> (u64, u64) {
        let status = match result {
            Ok(()) => TargetStatus::Sent { agent },
            Err(reason) => TargetStatus::Failed {
                agent: Some(agent),
                reason: reason.clone(),
            },
        };
        match self.statuses.get_mut(&target) {
            Some(mut entry) if !entry.is_final() => *entry = status,
            _ => return self.counts(),
        }
        match result {
            Ok(()) => {
                let sent = self.sent.fetch_add(1, Ordering::AcqRel) + 1;
                (sent, self.failed.load(Ordering::Acquire))
            }
            Err(_) => {
                let failed = self.failed.fetch_add(1, Ordering::AcqRel) + 1;
                (self.sent.load(Ordering::Acquire), failed)
            }
        }
    }

    pub fn counts(&self) -> (u64, u64) {
        (
            self.sent.load(Ordering::Acquire),
            self.failed.load(Ordering::Acquire),
        )
    }

    pub fn status(&self, target: TargetId) -> Option<TargetStatus> {
        self.statuses.get(&target).map(|entry| entry.value().clone())
    }

    /// Statuses in first-seen input order.
    pub fn statuses(&self) -> Vec<(TargetId, TargetStatus)> {
        self.order
            .iter()
            .map(|target| {
                let status = self.status(*target).unwrap_or(TargetStatus::Unassigned);
                (*target, status)
            })
            .collect()
    }

    pub fn unprocessed(&self) -> usize {
        self.statuses
            .iter()
            .filter(|entry| !entry.value().is_final())
            .count()
    }
}
