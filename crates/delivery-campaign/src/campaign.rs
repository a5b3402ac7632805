//! Delivery campaign
//!
//! A campaign walks its recipients in input order, hands each one to an
//! agent chosen by the [`Distributor`], and records exactly one outcome per
//! recipient. Per-target and per-agent failures only feed the counters; the
//! run stops early only when the pool runs dry, the circuit breaker trips,
//! or it is cancelled.

use agent_pool::{Agent, AgentPool};
use herald_core::{
    dedup_preserving_order, AbortReason, AgentId, CampaignId, CampaignSettings, CampaignState,
    DeliveryError, HeraldError, Message, OutcomeEvent, PartitionPolicy, Result, TargetId,
    TargetStatus,
};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::breaker::CircuitBreaker;
use crate::distributor::{Assignment, Distributor};
use crate::ledger::Ledger;
use crate::pacing::Pacer;

const PROGRESS_LOG_EVERY: u64 = 25;

/// Where incremental outcome events go. Dropped receivers are ignored.
#[derive(Debug, Clone, Default)]
pub struct OutcomeSink(Option<mpsc::UnboundedSender<OutcomeEvent>>);

impl OutcomeSink {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutcomeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(Some(tx)), rx)
    }

    pub fn emit(&self, event: OutcomeEvent) {
        if let Some(tx) = &self.0 {
            let _ = tx.send(event);
        }
    }
}

/// One delivery run: recipients, payload and partition policy.
#[derive(Debug, Clone)]
pub struct Campaign {
    id: CampaignId,
    targets: Vec<TargetId>,
    message: Message,
    policy: PartitionPolicy,
    parallel: bool,
}

impl Campaign {
    /// Repeated recipients are dropped, keeping the first occurrence.
    pub fn new(targets: Vec<TargetId>, message: Message) -> Self {
        Self {
            id: Uuid::new_v4(),
            targets: dedup_preserving_order(targets),
            message,
            policy: PartitionPolicy::default(),
            parallel: false,
        }
    }

    pub fn from_settings(
        targets: Vec<TargetId>,
        message: Message,
        settings: &CampaignSettings,
    ) -> Self {
        Self::new(targets, message)
            .with_policy(settings.policy)
            .with_parallel(settings.parallel)
    }

    pub fn with_policy(mut self, policy: PartitionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// One worker per static bucket. Ignored under the dynamic policy, whose
    /// assignment is only known at send time.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn id(&self) -> CampaignId {
        self.id
    }

    pub fn targets(&self) -> &[TargetId] {
        &self.targets
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn policy(&self) -> PartitionPolicy {
        self.policy
    }

    fn runs_parallel(&self) -> bool {
        self.parallel && self.policy == PartitionPolicy::Static
    }
}

/// Final result of a run.
#[derive(Debug, Clone)]
pub struct CampaignOutcome {
    pub id: CampaignId,
    pub state: CampaignState,
    pub policy: PartitionPolicy,
    pub sent: u64,
    pub failed: u64,
    /// Every recipient in input order.
    pub statuses: Vec<(TargetId, TargetStatus)>,
}

impl CampaignOutcome {
    /// Recipients never attempted because the run aborted first.
    pub fn unprocessed(&self) -> usize {
        self.statuses
            .iter()
            .filter(|(_, status)| !status.is_final())
            .count()
    }
}

/// Cancellation sources a run listens to.
#[derive(Clone)]
struct Stop {
    caller: CancellationToken,
    shutdown: CancellationToken,
    /// Set by the run itself to stop sibling workers.
    halt: CancellationToken,
}

impl Stop {
    fn is_set(&self) -> bool {
        self.caller.is_cancelled() || self.shutdown.is_cancelled() || self.halt.is_cancelled()
    }

    fn is_external(&self) -> bool {
        self.caller.is_cancelled() || self.shutdown.is_cancelled()
    }

    /// Sleep for the pacing delay. Returns false if stopped meanwhile.
    async fn pace(&self, pacer: &Pacer) -> bool {
        tokio::select! {
            _ = self.caller.cancelled() => false,
            _ = self.shutdown.cancelled() => false,
            _ = self.halt.cancelled() => false,
            _ = tokio::time::sleep(pacer.next_delay()) => true,
        }
    }
}

/// Ledger, event stream and breaker shared by every worker of one run.
struct Progress {
    ledger: Ledger,
    sink: OutcomeSink,
    breaker: CircuitBreaker,
}

impl Progress {
    /// Record one attempt. Returns true if the breaker trips.
    fn settle(
        &self,
        target: TargetId,
        agent: AgentId,
        result: std::result::Result<(), DeliveryError>,
    ) -> bool {
        let (sent, failed) = self.ledger.settle(target, agent, &result);
        match result {
            Ok(()) => {
                debug!(%target, agent_id = %agent, "delivered");
                self.sink.emit(OutcomeEvent::Delivered { agent, target });
            }
            Err(reason) => {
                debug!(%target, agent_id = %agent, %reason, "delivery failed");
                self.sink.emit(OutcomeEvent::Failed {
                    agent: Some(agent),
                    target,
                    reason,
                });
            }
        }

        let settled = sent + failed;
        if settled % PROGRESS_LOG_EVERY == 0 {
            info!(sent, failed, remaining = self.ledger.unprocessed(), "campaign progress");
        }
        self.breaker.should_trip(sent, failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerExit {
    Drained,
    Tripped,
    Exhausted,
    Stopped,
}

/// Runs campaigns against one pool. The pool admits one campaign at a time,
/// across every runner sharing it.
pub struct CampaignRunner {
    pool: Arc<AgentPool>,
    breaker: CircuitBreaker,
    pacer: Pacer,
    state: RwLock<CampaignState>,
}

impl std::fmt::Debug for CampaignRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CampaignRunner")
            .field("state", &self.state())
            .field("breaker", &self.breaker)
            .field("pacer", &self.pacer)
            .finish()
    }
}

impl CampaignRunner {
    pub fn new(pool: Arc<AgentPool>, settings: &CampaignSettings) -> Self {
        Self {
            pool,
            breaker: CircuitBreaker::from(settings),
            pacer: Pacer::from(settings),
            state: RwLock::new(CampaignState::Idle),
        }
    }

    pub fn pool(&self) -> &Arc<AgentPool> {
        &self.pool
    }

    /// `running` while a campaign is active, otherwise the last terminal
    /// state (or `idle`).
    pub fn state(&self) -> CampaignState {
        *self.state.read()
    }

    pub fn is_busy(&self) -> bool {
        self.pool.is_campaign_active()
    }

    pub async fn run(&self, campaign: Campaign, sink: OutcomeSink) -> Result<CampaignOutcome> {
        self.run_until(campaign, sink, CancellationToken::new())
            .await
    }

    /// Run `campaign` to completion or abort. Fails only with
    /// [`HeraldError::CampaignBusy`]; every other ending is an outcome.
    #[instrument(skip_all, fields(campaign_id = %campaign.id(), targets = campaign.targets().len(), policy = %campaign.policy()))]
    pub async fn run_until(
        &self,
        campaign: Campaign,
        sink: OutcomeSink,
        cancel: CancellationToken,
    ) -> Result<CampaignOutcome> {
        let Some(_slot) = self.pool.begin_campaign() else {
            warn!("campaign rejected, another campaign is running");
            return Err(HeraldError::CampaignBusy);
        };
        *self.state.write() = CampaignState::Running;

        let stop = Stop {
            caller: cancel,
            shutdown: self.pool.shutdown_token(),
            halt: CancellationToken::new(),
        };
        let distributor = Arc::new(Distributor::new(
            campaign.policy(),
            self.pool.healthy_agents(),
        ));
        let snapshot = distributor.snapshot();
        let progress = Arc::new(Progress {
            ledger: Ledger::new(campaign.targets()),
            sink: sink.clone(),
            breaker: self.breaker,
        });

        sink.emit(OutcomeEvent::Started {
            campaign_id: campaign.id(),
            total_targets: campaign.targets().len(),
            policy: campaign.policy(),
            agents: snapshot.iter().map(|agent| agent.id()).collect(),
            assigned: distributor.bucket_sizes(campaign.targets().len()),
        });
        info!(agents = snapshot.len(), "campaign started");

        let state = if snapshot.is_empty() {
            CampaignState::Aborted(AbortReason::NoHealthyAgents)
        } else if campaign.runs_parallel() {
            self.run_parallel(&campaign, Arc::clone(&distributor), &progress, &stop)
                .await
        } else {
            self.run_sequential(&campaign, &distributor, &progress, &stop)
                .await
        };

        let (sent, failed) = progress.ledger.counts();
        *self.state.write() = state;
        sink.emit(OutcomeEvent::Finished {
            campaign_id: campaign.id(),
            state,
            sent,
            failed,
        });
        match state {
            CampaignState::Aborted(reason) => {
                warn!(%reason, sent, failed, unprocessed = progress.ledger.unprocessed(), "campaign aborted");
            }
            _ => info!(sent, failed, "campaign completed"),
        }

        Ok(CampaignOutcome {
            id: campaign.id(),
            state,
            policy: campaign.policy(),
            sent,
            failed,
            statuses: progress.ledger.statuses(),
        })
    }

    async fn run_sequential(
        &self,
        campaign: &Campaign,
        distributor: &Distributor,
        progress: &Progress,
        stop: &Stop,
    ) -> CampaignState {
        let total = campaign.targets().len();

        for (position, &target) in campaign.targets().iter().enumerate() {
            if stop.is_set() {
                return CampaignState::Aborted(AbortReason::Cancelled);
            }
            if !progress.ledger.is_unassigned(target) {
                continue;
            }

            let (agent_id, agent) = match distributor.assign(position, &self.pool) {
                Assignment::Exhausted => {
                    return CampaignState::Aborted(AbortReason::AllAgentsFailed);
                }
                Assignment::Offline(agent_id) => (agent_id, None),
                Assignment::Agent(agent) => (agent.id(), Some(agent)),
            };
            if !progress.ledger.claim(target, agent_id) {
                continue;
            }

            let result = match &agent {
                Some(agent) => agent.send_to(target, campaign.message()).await,
                None => Err(DeliveryError::AgentOffline),
            };
            if progress.settle(target, agent_id, result) {
                return CampaignState::Aborted(AbortReason::HighFailureRate);
            }

            if agent.is_some() && position + 1 < total && !stop.pace(&self.pacer).await {
                return CampaignState::Aborted(AbortReason::Cancelled);
            }
        }

        CampaignState::Completed
    }

    async fn run_parallel(
        &self,
        campaign: &Campaign,
        distributor: Arc<Distributor>,
        progress: &Arc<Progress>,
        stop: &Stop,
    ) -> CampaignState {
        let mut workers = JoinSet::new();
        for (agent, bucket) in distributor.buckets(campaign.targets()) {
            workers.spawn(drain_bucket(
                agent,
                bucket,
                Arc::clone(&distributor),
                Arc::clone(progress),
                campaign.message().clone(),
                self.pacer,
                stop.clone(),
            ));
        }

        let mut exits = Vec::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(exit) => {
                    if matches!(exit, WorkerExit::Tripped | WorkerExit::Exhausted) {
                        stop.halt.cancel();
                    }
                    exits.push(exit);
                }
                Err(e) => warn!(error = %e, "campaign worker panicked"),
            }
        }

        if exits.contains(&WorkerExit::Tripped) {
            CampaignState::Aborted(AbortReason::HighFailureRate)
        } else if exits.contains(&WorkerExit::Exhausted) {
            CampaignState::Aborted(AbortReason::AllAgentsFailed)
        } else if stop.is_external() || exits.contains(&WorkerExit::Stopped) {
            CampaignState::Aborted(AbortReason::Cancelled)
        } else {
            CampaignState::Completed
        }
    }
}

/// Send one static bucket through its owning agent.
async fn drain_bucket(
    agent: Arc<Agent>,
    bucket: Vec<TargetId>,
    distributor: Arc<Distributor>,
    progress: Arc<Progress>,
    message: Message,
    pacer: Pacer,
    stop: Stop,
) -> WorkerExit {
    let total = bucket.len();

    for (index, target) in bucket.into_iter().enumerate() {
        if stop.is_set() {
            return WorkerExit::Stopped;
        }
        if !progress.ledger.is_unassigned(target) {
            continue;
        }

        let healthy = agent.is_healthy();
        if !healthy && !distributor.snapshot_alive() {
            return WorkerExit::Exhausted;
        }
        if !progress.ledger.claim(target, agent.id()) {
            continue;
        }

        let result = if healthy {
            agent.send_to(target, &message).await
        } else {
            Err(DeliveryError::AgentOffline)
        };
        if progress.settle(target, agent.id(), result) {
            return WorkerExit::Tripped;
        }

        if healthy && index + 1 < total && !stop.pace(&pacer).await {
            return WorkerExit::Stopped;
        }
    }

    WorkerExit::Drained
}
