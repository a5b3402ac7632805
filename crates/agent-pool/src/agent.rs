//! Agent runtime
//!
//! One agent owns one session. Its state machine is driven by two inputs:
//! lifecycle events pushed by the session (applied synchronously through
//! [`Agent::apply`]) and demotions issued by the pool's health monitor.

use dashmap::DashMap;
use herald_core::{
    AgentId, AgentSnapshot, AgentState, Capabilities, ChannelId, Credential, DeliveryError,
    GroupId, HeraldError, Member, Message, Result, Session, SessionConnector, SessionError,
    SessionEvent, TargetId, Timings,
};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, instrument, warn};

use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Copy)]
struct Vitals {
    state: AgentState,
    last_heartbeat: Option<Instant>,
}

pub struct Agent {
    id: AgentId,
    credential: Credential,
    /// State and heartbeat change together so `ready` never pairs with a
    /// heartbeat from a previous connection.
    vitals: Mutex<Vitals>,
    consecutive_failures: AtomicU32,
    in_flight: AtomicUsize,
    session: RwLock<Option<Arc<dyn Session>>>,
    capabilities: RwLock<Option<Capabilities>>,
    channels: DashMap<TargetId, ChannelId>,
    memberships: DashMap<GroupId, usize>,
    timings: Timings,
    retry: RetryPolicy,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("credential", &self.credential)
            .field("state", &self.state())
            .field("in_flight", &self.in_flight())
            .field("open_channels", &self.channels.len())
            .finish()
    }
}

/// Decrements the in-flight counter when a send finishes or is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Agent {
    pub fn new(id: AgentId, credential: Credential, timings: Timings, retry: RetryPolicy) -> Self {
        Self {
            id,
            credential,
            vitals: Mutex::new(Vitals {
                state: AgentState::Disconnected,
                last_heartbeat: None,
            }),
            consecutive_failures: AtomicU32::new(0),
            in_flight: AtomicUsize::new(0),
            session: RwLock::new(None),
            capabilities: RwLock::new(None),
            channels: DashMap::new(),
            memberships: DashMap::new(),
            timings,
            retry,
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn state(&self) -> AgentState {
        self.vitals.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn capabilities(&self) -> Option<Capabilities> {
        self.capabilities.read().clone()
    }

    /// Time since the last proof of liveness, if the agent ever connected.
    pub fn idle_for(&self) -> Option<Duration> {
        self.vitals.lock().last_heartbeat.map(|at| at.elapsed())
    }

    /// `ready` and active within the staleness window. Evaluated on every
    /// call.
    pub fn is_healthy(&self) -> bool {
        let vitals = *self.vitals.lock();
        vitals.state == AgentState::Ready && self.is_fresh(vitals.last_heartbeat)
    }

    /// No activity within the staleness window.
    pub fn is_stale(&self) -> bool {
        !self.is_fresh(self.vitals.lock().last_heartbeat)
    }

    fn is_fresh(&self, last_heartbeat: Option<Instant>) -> bool {
        last_heartbeat.is_some_and(|at| at.elapsed() < self.timings.staleness())
    }

    /// Apply one session lifecycle event. Events arriving after the agent
    /// reached a terminal state are ignored.
    pub fn apply(&self, event: SessionEvent) {
        let mut vitals = self.vitals.lock();
        if vitals.state.is_terminal() {
            debug!(agent_id = %self.id, ?event, "ignoring event for terminal agent");
            return;
        }

        match event {
            SessionEvent::Ready | SessionEvent::Resumed => {
                if vitals.state != AgentState::Ready {
                    info!(agent_id = %self.id, from = ?vitals.state, "agent ready");
                }
                vitals.state = AgentState::Ready;
                vitals.last_heartbeat = Some(Instant::now());
                self.consecutive_failures.store(0, Ordering::Release);
            }
            SessionEvent::Activity => {
                if vitals.state.is_connected() {
                    vitals.last_heartbeat = Some(Instant::now());
                }
            }
            SessionEvent::Disconnected { reason } => {
                if vitals.state == AgentState::Ready {
                    warn!(agent_id = %self.id, %reason, "agent disconnected, degraded");
                    vitals.state = AgentState::Degraded;
                }
            }
            SessionEvent::Error { detail } => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
                if vitals.state == AgentState::Ready {
                    vitals.state = AgentState::Degraded;
                }
                warn!(agent_id = %self.id, %detail, failures, "session error");
            }
            SessionEvent::LoggedOut => {
                warn!(agent_id = %self.id, "session logged out, closing agent");
                vitals.state = AgentState::Closed;
                // Closing the session itself happens on pool shutdown.
                drop(vitals);
                self.channels.clear();
            }
        }
    }

    /// Connect the session, retrying connect failures per the retry policy.
    /// Authentication failures are never retried. On failure the agent is
    /// marked failed.
    #[instrument(skip(self, connector), fields(agent_id = %self.id, credential = %self.credential.preview()))]
    pub async fn start(self: &Arc<Self>, connector: &dyn SessionConnector) -> Result<()> {
        self.vitals.lock().state = AgentState::Connecting;

        let attempts = self.retry.startup_attempts();
        let mut backoff = self.retry.backoff();
        let mut last_error = None;

        for attempt in 1..=attempts {
            let (events_tx, events_rx) = mpsc::unbounded_channel();
            let connecting = connector.connect(&self.credential, events_tx);

            match timeout(self.timings.startup_timeout(), connecting).await {
                Ok(Ok(connected)) => {
                    *self.capabilities.write() = Some(connected.capabilities);
                    *self.session.write() = Some(connected.session);
                    // Ready first, so events queued during connect land on a live agent.
                    self.apply(SessionEvent::Ready);
                    tokio::spawn(pump_events(Arc::downgrade(self), events_rx));
                    info!(attempt, "agent started");
                    return Ok(());
                }
                Ok(Err(SessionError::Unauthorized(reason))) => {
                    let error = HeraldError::AuthFailure {
                        agent_id: self.id,
                        reason,
                    };
                    self.fail(&error.to_string()).await;
                    return Err(error);
                }
                Ok(Err(e)) => {
                    last_error = Some(HeraldError::ConnectFailure {
                        agent_id: self.id,
                        reason: e.to_string(),
                    });
                }
                Err(_) => {
                    last_error = Some(HeraldError::Timeout {
                        agent_id: self.id,
                        operation: "startup",
                        elapsed: self.timings.startup_timeout(),
                    });
                }
            }

            if attempt < attempts {
                let delay = backoff.next_delay();
                debug!(attempt, ?delay, "connect attempt failed, backing off");
                tokio::time::sleep(delay).await;
            }
        }

        let error = last_error.unwrap_or(HeraldError::ConnectFailure {
            agent_id: self.id,
            reason: "no connect attempt made".to_string(),
        });
        self.fail(&error.to_string()).await;
        Err(error)
    }

    /// Permanently exclude this agent and close its session. Returns false
    /// if the agent was already terminal.
    pub async fn fail(&self, reason: &str) -> bool {
        {
            let mut vitals = self.vitals.lock();
            if vitals.state.is_terminal() {
                return false;
            }
            vitals.state = AgentState::Failed;
        }
        warn!(agent_id = %self.id, %reason, "agent marked failed");
        self.close_session().await;
        true
    }

    /// Explicit shutdown. Terminal.
    pub async fn close(&self) {
        {
            let mut vitals = self.vitals.lock();
            if vitals.state != AgentState::Failed {
                vitals.state = AgentState::Closed;
            }
        }
        self.close_session().await;
    }

    async fn close_session(&self) {
        let session = self.session.write().take();
        self.channels.clear();
        if let Some(session) = session {
            session.close().await;
        }
    }

    fn touch(&self) {
        let mut vitals = self.vitals.lock();
        if vitals.state.is_connected() {
            vitals.last_heartbeat = Some(Instant::now());
        }
    }

    fn current_session(&self) -> Option<Arc<dyn Session>> {
        self.session.read().clone()
    }

    /// Deliver `message` to one recipient.
    ///
    /// A rate-limit response suspends this agent for the advertised interval
    /// and retries, at most as many times as the retry policy allows. Every
    /// attempt is bounded by the send timeout.
    #[instrument(skip(self, message), fields(agent_id = %self.id, %target))]
    pub async fn send_to(
        &self,
        target: TargetId,
        message: &Message,
    ) -> std::result::Result<(), DeliveryError> {
        if !self.is_healthy() {
            return Err(DeliveryError::AgentOffline);
        }
        let Some(session) = self.current_session() else {
            return Err(DeliveryError::AgentOffline);
        };
        if self
            .capabilities
            .read()
            .as_ref()
            .is_some_and(|caps| !caps.can_open_direct)
        {
            return Err(DeliveryError::Forbidden);
        }

        let _in_flight = InFlight::enter(&self.in_flight);
        let mut rate_limit_retries = 0;

        loop {
            let attempt = timeout(
                self.timings.send_timeout(),
                self.deliver(session.as_ref(), target, message),
            )
            .await;

            match attempt {
                Err(_) => {
                    warn!("send timed out");
                    return Err(DeliveryError::Timeout);
                }
                Ok(Ok(())) => {
                    self.touch();
                    self.consecutive_failures.store(0, Ordering::Release);
                    return Ok(());
                }
                Ok(Err(SessionError::Forbidden)) => {
                    self.touch();
                    return Err(DeliveryError::Forbidden);
                }
                Ok(Err(SessionError::RateLimited { retry_after })) => {
                    self.touch();
                    match self.retry.rate_limit_delay(rate_limit_retries, retry_after) {
                        Some(delay) => {
                            rate_limit_retries += 1;
                            warn!(?delay, "rate limited, suspending agent before retry");
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            return Err(DeliveryError::RateLimited {
                                retry_after_ms: retry_after.as_millis() as u64,
                            });
                        }
                    }
                }
                Ok(Err(e)) => {
                    self.consecutive_failures.fetch_add(1, Ordering::AcqRel);
                    return Err(DeliveryError::SendFailed {
                        detail: e.to_string(),
                    });
                }
            }
        }
    }

    async fn deliver(
        &self,
        session: &dyn Session,
        target: TargetId,
        message: &Message,
    ) -> std::result::Result<(), SessionError> {
        let cached = self.channels.get(&target).map(|entry| *entry.value());
        let channel = match cached {
            Some(channel) => channel,
            None => {
                let channel = session.open_direct(target).await?;
                self.channels.insert(target, channel);
                channel
            }
        };
        session.send(channel, message).await
    }

    /// Fetch the membership roster of `group` through this agent's session.
    #[instrument(skip(self), fields(agent_id = %self.id, %group))]
    pub async fn fetch_roster(&self, group: GroupId) -> Result<Vec<Member>> {
        let failure = |reason: String| HeraldError::RosterFetch {
            agent_id: self.id,
            group,
            reason,
        };

        if !self.is_healthy() {
            return Err(failure("agent offline".to_string()));
        }
        let session = self
            .current_session()
            .ok_or_else(|| failure("agent offline".to_string()))?;
        if !self
            .capabilities
            .read()
            .as_ref()
            .is_some_and(|caps| caps.can_list_members)
        {
            return Err(failure("session cannot list members".to_string()));
        }

        let members = timeout(self.timings.send_timeout(), session.fetch_roster(group))
            .await
            .map_err(|_| failure("roster fetch timed out".to_string()))?
            .map_err(|e| failure(e.to_string()))?;

        self.touch();
        self.memberships.insert(group, members.len());
        info!(members = members.len(), "roster fetched");
        Ok(members)
    }

    /// Cached roster size for `group`, if this agent fetched it.
    pub fn membership(&self, group: GroupId) -> Option<usize> {
        self.memberships.get(&group).map(|entry| *entry.value())
    }

    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            id: self.id,
            credential_preview: self.credential.preview(),
            state: self.state(),
            healthy: self.is_healthy(),
            consecutive_failures: self.consecutive_failures(),
            capabilities: self.capabilities(),
            memberships: self
                .memberships
                .iter()
                .map(|entry| (*entry.key(), *entry.value()))
                .collect(),
        }
    }
}

async fn pump_events(agent: Weak<Agent>, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        let Some(agent) = agent.upgrade() else {
            break;
        };
        agent.apply(event);
    }
}
