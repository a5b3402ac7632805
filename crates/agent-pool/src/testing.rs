//! Scripted in-memory sessions for tests.
//!
//! Connect and send outcomes are scripted per credential secret. Every send
//! attempt lands in a shared log so tests can check which recipients were
//! reached, and how often.

use async_trait::async_trait;
use herald_core::{
    Capabilities, ChannelId, Connected, Credential, GroupId, Member, Message, Session,
    SessionConnector, SessionError, SessionEvent, SessionEvents, TargetId,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectScript {
    Ready,
    Unauthorized,
    Refuse,
    /// Refuse this many attempts, then connect.
    RefuseTimes(u32),
    /// Connect, but report a disconnect before `connect` returns.
    DropAfterConnect,
    Hang,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendScript {
    Deliver,
    Forbidden,
    RateLimited(Duration),
    Transport(String),
    Hang,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRecord {
    pub credential: String,
    pub target: TargetId,
    pub delivered: bool,
}

#[derive(Default)]
struct ScriptState {
    connect: HashMap<String, ConnectScript>,
    connect_attempts: HashMap<String, u32>,
    send_default: HashMap<String, SendScript>,
    send_queue: HashMap<(String, TargetId), VecDeque<SendScript>>,
    rosters: HashMap<GroupId, Vec<Member>>,
    roster_failures: HashSet<String>,
    open_direct_calls: HashMap<String, usize>,
    log: Vec<SendRecord>,
    events: HashMap<String, SessionEvents>,
    closed: HashSet<String>,
}

#[derive(Clone, Default)]
pub struct ScriptedConnector {
    state: Arc<Mutex<ScriptState>>,
    capabilities: Option<Capabilities>,
}

impl std::fmt::Debug for ScriptedConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ScriptedConnector")
            .field("sessions", &state.events.len())
            .field("send_attempts", &state.log.len())
            .finish()
    }
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    pub fn script_connect(&self, secret: &str, script: ConnectScript) {
        self.state.lock().connect.insert(secret.to_string(), script);
    }

    /// Outcome of every send through `secret` once its queue is empty.
    pub fn set_send_default(&self, secret: &str, script: SendScript) {
        self.state
            .lock()
            .send_default
            .insert(secret.to_string(), script);
    }

    pub fn queue_sends(&self, secret: &str, target: TargetId, scripts: Vec<SendScript>) {
        self.state
            .lock()
            .send_queue
            .entry((secret.to_string(), target))
            .or_default()
            .extend(scripts);
    }

    pub fn set_roster(&self, group: GroupId, members: Vec<Member>) {
        self.state.lock().rosters.insert(group, members);
    }

    pub fn fail_roster(&self, secret: &str) {
        self.state.lock().roster_failures.insert(secret.to_string());
    }

    /// Push a lifecycle event into the session opened for `secret`.
    pub fn emit(&self, secret: &str, event: SessionEvent) -> bool {
        self.state
            .lock()
            .events
            .get(secret)
            .is_some_and(|events| events.send(event).is_ok())
    }

    pub fn connect_attempts(&self, secret: &str) -> u32 {
        self.state
            .lock()
            .connect_attempts
            .get(secret)
            .copied()
            .unwrap_or(0)
    }

    pub fn open_direct_calls(&self, secret: &str) -> usize {
        self.state
            .lock()
            .open_direct_calls
            .get(secret)
            .copied()
            .unwrap_or(0)
    }

    pub fn send_log(&self) -> Vec<SendRecord> {
        self.state.lock().log.clone()
    }

    pub fn attempts_to(&self, target: TargetId) -> usize {
        self.state
            .lock()
            .log
            .iter()
            .filter(|record| record.target == target)
            .count()
    }

    pub fn deliveries_to(&self, target: TargetId) -> usize {
        self.state
            .lock()
            .log
            .iter()
            .filter(|record| record.target == target && record.delivered)
            .count()
    }

    pub fn is_closed(&self, secret: &str) -> bool {
        self.state.lock().closed.contains(secret)
    }
}

#[async_trait]
impl SessionConnector for ScriptedConnector {
    async fn connect(
        &self,
        credential: &Credential,
        events: SessionEvents,
    ) -> Result<Connected, SessionError> {
        let secret = credential.expose().to_string();
        let outcome = {
            let mut state = self.state.lock();
            let attempt = state.connect_attempts.entry(secret.clone()).or_insert(0);
            *attempt += 1;
            let attempt = *attempt;
            match state.connect.get(&secret).cloned().unwrap_or(ConnectScript::Ready) {
                ConnectScript::Ready => Some(Ok(false)),
                ConnectScript::DropAfterConnect => Some(Ok(true)),
                ConnectScript::RefuseTimes(n) if attempt > n => Some(Ok(false)),
                ConnectScript::RefuseTimes(_) | ConnectScript::Refuse => Some(Err(
                    SessionError::Connect("connection refused".to_string()),
                )),
                ConnectScript::Unauthorized => Some(Err(SessionError::Unauthorized(
                    "invalid credential".to_string(),
                ))),
                ConnectScript::Hang => None,
            }
        };

        let drops = match outcome {
            Some(result) => result?,
            None => std::future::pending::<bool>().await,
        };

        if drops {
            let _ = events.send(SessionEvent::Disconnected {
                reason: "dropped while connecting".to_string(),
            });
        }
        self.state.lock().events.insert(secret.clone(), events);
        let capabilities = self.capabilities.clone().unwrap_or(Capabilities {
            account_id: 1,
            display_name: format!("scripted-{}", credential.preview()),
            can_list_members: true,
            can_open_direct: true,
        });

        Ok(Connected {
            session: Arc::new(ScriptedSession {
                secret,
                state: Arc::clone(&self.state),
            }),
            capabilities,
        })
    }
}

struct ScriptedSession {
    secret: String,
    state: Arc<Mutex<ScriptState>>,
}

#[async_trait]
impl Session for ScriptedSession {
    async fn open_direct(&self, target: TargetId) -> Result<ChannelId, SessionError> {
        let mut state = self.state.lock();
        if state.closed.contains(&self.secret) {
            return Err(SessionError::Closed);
        }
        *state
            .open_direct_calls
            .entry(self.secret.clone())
            .or_insert(0) += 1;
        Ok(ChannelId(target.0))
    }

    async fn send(&self, channel: ChannelId, _message: &Message) -> Result<(), SessionError> {
        let target = TargetId(channel.0);
        let script = {
            let mut state = self.state.lock();
            let queued = state
                .send_queue
                .get_mut(&(self.secret.clone(), target))
                .and_then(|queue| queue.pop_front());
            let script = queued
                .or_else(|| state.send_default.get(&self.secret).cloned())
                .unwrap_or(SendScript::Deliver);
            state.log.push(SendRecord {
                credential: self.secret.clone(),
                target,
                delivered: script == SendScript::Deliver,
            });
            script
        };

        match script {
            SendScript::Deliver => Ok(()),
            SendScript::Forbidden => Err(SessionError::Forbidden),
            SendScript::RateLimited(retry_after) => Err(SessionError::RateLimited { retry_after }),
            SendScript::Transport(detail) => Err(SessionError::Transport(detail)),
            SendScript::Hang => std::future::pending().await,
        }
    }

    async fn fetch_roster(&self, group: GroupId) -> Result<Vec<Member>, SessionError> {
        let state = self.state.lock();
        if state.roster_failures.contains(&self.secret) {
            return Err(SessionError::Forbidden);
        }
        state
            .rosters
            .get(&group)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(format!("group {group}")))
    }

    async fn close(&self) {
        let mut state = self.state.lock();
        state.closed.insert(self.secret.clone());
        state.events.remove(&self.secret);
    }
}
