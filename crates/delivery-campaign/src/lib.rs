//! # Delivery Campaign
//!
//! Sends one message to a list of recipients through an [`AgentPool`],
//! attempting each recipient exactly once.
//!
//! ## Features
//! - Static (snapshot buckets) or dynamic (live healthy set) partitioning
//! - Randomised pacing between sends
//! - Failure-rate circuit breaker
//! - Incremental outcome events and a final per-target ledger
//!
//! [`AgentPool`]: agent_pool::AgentPool

mod breaker;
mod campaign;
mod distributor;
mod ledger;
mod pacing;
mod roster;

pub use breaker::CircuitBreaker;
pub use campaign::{Campaign, CampaignOutcome, CampaignRunner, OutcomeSink};
pub use distributor::{partition, pick, Assignment, Distributor};
pub use ledger::Ledger;
pub use pacing::Pacer;
pub use roster::fetch_recipients;

pub use herald_core::{AbortReason, CampaignState, OutcomeEvent, PartitionPolicy, TargetId};
