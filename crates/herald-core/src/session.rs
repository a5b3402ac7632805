//! Network session capability
//!
//! Herald never speaks a wire protocol itself. A session client implements
//! [`SessionConnector`] and [`Session`]; everything above it (agents, pool,
//! campaigns) only sees these traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::agent::{Capabilities, Credential};
use crate::target::{GroupId, TargetId};

/// Direct channel handle returned by the session for one recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub u64);

/// Message payload delivered by a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub content: String,
}

impl Message {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// One roster entry returned by a membership fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: TargetId,
    pub automated: bool,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("forbidden")]
    Forbidden,

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("session closed")]
    Closed,
}

/// Lifecycle notifications pushed by a session after connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Ready,
    Resumed,
    Activity,
    Disconnected { reason: String },
    Error { detail: String },
    /// The remote side revoked the session; not recoverable.
    LoggedOut,
}

pub type SessionEvents = mpsc::UnboundedSender<SessionEvent>;

/// An established session.
#[async_trait]
pub trait Session: Send + Sync {
    /// Resolve or open the direct channel to a recipient.
    async fn open_direct(&self, target: TargetId) -> Result<ChannelId, SessionError>;

    async fn send(&self, channel: ChannelId, message: &Message) -> Result<(), SessionError>;

    async fn fetch_roster(&self, group: GroupId) -> Result<Vec<Member>, SessionError>;

    async fn close(&self);
}

pub struct Connected {
    pub session: Arc<dyn Session>,
    pub capabilities: Capabilities,
}

impl std::fmt::Debug for Connected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connected")
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

/// Opens sessions. Lifecycle events for the new session are sent on `events`
/// for as long as the session lives.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(
        &self,
        credential: &Credential,
        events: SessionEvents,
    ) -> Result<Connected, SessionError>;
}
