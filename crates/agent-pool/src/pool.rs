//! Agent pool: staggered startup, live health view, background health
//! monitor and graceful shutdown.
//!
//! Agents are only ever appended, during `start_all`. A failed agent stays in
//! place so ordinals remain valid indices for round-robin assignment.

use herald_core::{
    AgentId, AgentSnapshot, AgentState, Credential, HeraldConfig, HeraldError, PoolState, Result,
    SessionConnector, Timings,
};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::agent::Agent;
use crate::retry::RetryPolicy;

const DRAIN_POLL: Duration = Duration::from_millis(25);

/// Held while a campaign runs on the pool. Dropping it frees the pool for
/// the next campaign.
#[derive(Debug)]
pub struct CampaignSlot<'a>(&'a AtomicBool);

impl Drop for CampaignSlot<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct AgentPool {
    agents: RwLock<Vec<Arc<Agent>>>,
    state: RwLock<PoolState>,
    started: AtomicBool,
    campaign_active: AtomicBool,
    connector: Arc<dyn SessionConnector>,
    timings: Timings,
    retry: RetryPolicy,
    shutdown: CancellationToken,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for AgentPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentPool")
            .field("state", &self.state())
            .field("agents", &self.len())
            .field("healthy", &self.healthy_agents().len())
            .field("monitor_running", &self.monitor.lock().is_some())
            .finish()
    }
}

impl AgentPool {
    pub fn new(connector: Arc<dyn SessionConnector>, config: &HeraldConfig) -> Self {
        Self {
            agents: RwLock::new(Vec::new()),
            state: RwLock::new(PoolState::Starting),
            started: AtomicBool::new(false),
            campaign_active: AtomicBool::new(false),
            connector,
            timings: config.timings.clone(),
            retry: RetryPolicy::from(&config.retry),
            shutdown: CancellationToken::new(),
            monitor: Mutex::new(None),
        }
    }

    pub fn state(&self) -> PoolState {
        *self.state.read()
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.read().is_empty()
    }

    pub fn timings(&self) -> &Timings {
        &self.timings
    }

    /// Claim the pool for one campaign. `None` while another campaign,
    /// from any runner, holds it.
    pub fn begin_campaign(&self) -> Option<CampaignSlot<'_>> {
        self.campaign_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CampaignSlot(&self.campaign_active))
    }

    pub fn is_campaign_active(&self) -> bool {
        self.campaign_active.load(Ordering::Acquire)
    }

    /// Cancelled when the pool begins shutting down. Campaigns derive their
    /// own tokens from it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Start one agent per credential, one at a time, pausing between starts.
    /// Agents that fail to start are kept as `failed` and startup moves on.
    /// Returns how many agents reached `ready`.
    #[instrument(skip_all, fields(credentials = credentials.len()))]
    pub async fn start_all(&self, credentials: Vec<Credential>) -> Result<usize> {
        if self.started.swap(true, Ordering::AcqRel) || self.state() != PoolState::Starting {
            return Err(HeraldError::InvalidPoolState {
                operation: "start agents",
                state: self.state().to_string(),
            });
        }

        let attempted = credentials.len();
        let mut ready = 0;

        for (ordinal, credential) in credentials.into_iter().enumerate() {
            if ordinal > 0 {
                tokio::select! {
                    _ = self.shutdown.cancelled() => {
                        warn!(remaining = attempted - ordinal, "startup interrupted by shutdown");
                        break;
                    }
                    _ = tokio::time::sleep(self.timings.start_stagger()) => {}
                }
            }

            let agent = Arc::new(Agent::new(
                AgentId(ordinal),
                credential,
                self.timings.clone(),
                self.retry.clone(),
            ));
            self.agents.write().push(Arc::clone(&agent));

            match agent.start(self.connector.as_ref()).await {
                Ok(()) => ready += 1,
                Err(e) => {
                    warn!(agent_id = %agent.id(), error = %e, "agent failed to start, continuing");
                }
            }
        }

        {
            let mut state = self.state.write();
            if *state == PoolState::Starting {
                *state = PoolState::Running;
            }
        }

        if ready == 0 {
            error!(attempted, "no agent reached ready state");
            return Err(HeraldError::NoAgentsReady { attempted });
        }
        info!(ready, attempted, "agent pool running");
        Ok(ready)
    }

    /// Every agent, in ordinal order, regardless of health.
    pub fn agents(&self) -> Vec<Arc<Agent>> {
        self.agents.read().clone()
    }

    pub fn agent(&self, id: AgentId) -> Option<Arc<Agent>> {
        self.agents.read().get(id.0).cloned()
    }

    /// Agents passing the health predicate right now, in ordinal order.
    pub fn healthy_agents(&self) -> Vec<Arc<Agent>> {
        self.agents
            .read()
            .iter()
            .filter(|agent| agent.is_healthy())
            .cloned()
            .collect()
    }

    pub fn snapshots(&self) -> Vec<AgentSnapshot> {
        self.agents().iter().map(|agent| agent.snapshot()).collect()
    }

    /// Sum of sends currently in progress across all agents.
    pub fn in_flight(&self) -> usize {
        self.agents.read().iter().map(|agent| agent.in_flight()).sum()
    }

    /// Demote every connected agent that has gone quiet for the staleness
    /// window. A freshly degraded agent is left alone so its session can
    /// resume. Returns the number of agents demoted.
    pub async fn sweep(&self) -> usize {
        let mut demoted = 0;
        for agent in self.agents() {
            let state = agent.state();
            if !state.is_connected() {
                continue;
            }
            if agent.is_stale() {
                let idle = agent.idle_for().unwrap_or_default();
                let reason = format!("no activity for {}s while {:?}", idle.as_secs(), state);
                if agent.fail(&reason).await {
                    demoted += 1;
                }
            } else if state == AgentState::Degraded {
                debug!(agent_id = %agent.id(), "agent degraded, waiting for resume");
            }
        }
        if demoted > 0 {
            info!(demoted, healthy = self.healthy_agents().len(), "health sweep demoted agents");
        }
        demoted
    }

    /// Spawn the recurring health sweep. Runs until shutdown.
    pub fn spawn_health_monitor(self: &Arc<Self>) {
        let pool = Arc::clone(self);
        let period = self.timings.health_interval();

        let handle = tokio::spawn(async move {
            let mut timer = tokio::time::interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = pool.shutdown.cancelled() => break,
                    _ = timer.tick() => {}
                }
                pool.sweep().await;
            }
            debug!("health monitor stopped");
        });

        if let Some(previous) = self.monitor.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stop the monitor, let in-flight sends finish (bounded by the send
    /// timeout), close every session, then wait out the grace period.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        {
            let mut state = self.state.write();
            if matches!(*state, PoolState::ShuttingDown | PoolState::Closed) {
                return;
            }
            *state = PoolState::ShuttingDown;
        }
        info!("agent pool shutting down");
        self.shutdown.cancel();

        let monitor = self.monitor.lock().take();
        if let Some(handle) = monitor {
            let _ = handle.await;
        }

        let drain = async {
            while self.in_flight() > 0 {
                tokio::time::sleep(DRAIN_POLL).await;
            }
        };
        if tokio::time::timeout(self.timings.send_timeout(), drain)
            .await
            .is_err()
        {
            warn!(
                in_flight = self.in_flight(),
                "sends still in flight after drain window"
            );
        }

        for agent in self.agents() {
            agent.close().await;
        }
        tokio::time::sleep(self.timings.shutdown_grace()).await;

        *self.state.write() = PoolState::Closed;
        info!("agent pool closed");
    }
}
