//! Loopback sessions for dry runs.
//!
//! Every credential connects, every send succeeds after a short simulated
//! latency, and rosters are synthesised from the group id. Sessions emit
//! keepalive activity so agents stay healthy while idle.

use async_trait::async_trait;
use herald_core::{
    Capabilities, ChannelId, Connected, Credential, GroupId, Member, Message, Session,
    SessionConnector, SessionError, SessionEvent, SessionEvents, TargetId,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct LoopbackConnector {
    keepalive: Duration,
    latency: Duration,
    roster_size: u64,
}

impl Default for LoopbackConnector {
    fn default() -> Self {
        Self {
            keepalive: Duration::from_secs(30),
            latency: Duration::from_millis(50),
            roster_size: 10,
        }
    }
}

impl LoopbackConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keepalive(mut self, keepalive: Duration) -> Self {
        self.keepalive = keepalive;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Members per synthesised roster, one of which is automated.
    pub fn with_roster_size(mut self, roster_size: u64) -> Self {
        self.roster_size = roster_size;
        self
    }
}

/// Stable pseudo account id for a credential.
fn account_id(credential: &Credential) -> u64 {
    credential
        .expose()
        .bytes()
        .fold(17u64, |acc, byte| acc.wrapping_mul(31).wrapping_add(u64::from(byte)))
}

#[async_trait]
impl SessionConnector for LoopbackConnector {
    async fn connect(
        &self,
        credential: &Credential,
        events: SessionEvents,
    ) -> Result<Connected, SessionError> {
        let closed = CancellationToken::new();
        let keepalive = self.keepalive;
        let stopped = closed.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stopped.cancelled() => break,
                    _ = tokio::time::sleep(keepalive) => {}
                }
                if events.send(SessionEvent::Activity).is_err() {
                    break;
                }
            }
        });

        Ok(Connected {
            session: Arc::new(LoopbackSession {
                latency: self.latency,
                roster_size: self.roster_size,
                closed,
            }),
            capabilities: Capabilities {
                account_id: account_id(credential),
                display_name: format!("loopback-{}", credential.preview()),
                can_list_members: true,
                can_open_direct: true,
            },
        })
    }
}

struct LoopbackSession {
    latency: Duration,
    roster_size: u64,
    closed: CancellationToken,
}

impl LoopbackSession {
    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.closed.is_cancelled() {
            return Err(SessionError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl Session for LoopbackSession {
    async fn open_direct(&self, target: TargetId) -> Result<ChannelId, SessionError> {
        self.ensure_open()?;
        Ok(ChannelId(target.0))
    }

    async fn send(&self, channel: ChannelId, message: &Message) -> Result<(), SessionError> {
        self.ensure_open()?;
        tokio::time::sleep(self.latency).await;
        debug!(channel = channel.0, bytes = message.content.len(), "loopback send");
        Ok(())
    }

    async fn fetch_roster(&self, group: GroupId) -> Result<Vec<Member>, SessionError> {
        self.ensure_open()?;
        let base = group.0.wrapping_mul(1_000);
        Ok((1..=self.roster_size)
            .map(|offset| Member {
                id: TargetId(base.wrapping_add(offset)),
                automated: offset == 1,
            })
            .collect())
    }

    async fn close(&self) {
        self.closed.cancel();
    }
}
