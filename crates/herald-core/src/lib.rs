//! # Herald Core
//!
//! Core types and traits shared by the Herald delivery crates.
//!
//! ## Agent Pool
//! - Independently authenticated sessions tracked through an explicit state machine
//! - Health predicate re-evaluated on every use, never cached
//!
//! ## Delivery Campaign
//! - Exactly one send attempt per recipient per run
//! - Failure-rate circuit breaker and pool-exhaustion aborts instead of crashes

pub mod agent;
pub mod config;
pub mod error;
pub mod outcome;
pub mod policy;
pub mod pool;
pub mod session;
pub mod target;

pub use agent::{AgentId, AgentSnapshot, AgentState, Capabilities, Credential};
pub use config::{CampaignSettings, HeraldConfig, RetrySettings, Timings};
pub use error::{DeliveryError, HeraldError, Result};
pub use outcome::{AbortReason, CampaignId, CampaignState, OutcomeEvent};
pub use policy::PartitionPolicy;
pub use pool::PoolState;
pub use session::{
    ChannelId, Connected, Member, Message, Session, SessionConnector, SessionError, SessionEvent,
    SessionEvents,
};
pub use target::{dedup_preserving_order, GroupId, TargetId, TargetStatus};

/// Current Herald version for compatibility checks
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Herald build information for logs and reports
pub const BUILD_INFO: &str = concat!(
    "Herald ",
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("CARGO_PKG_NAME"),
    ")"
);
