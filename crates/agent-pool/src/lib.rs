//! # Agent Pool
//!
//! Owns the agents of one process: starts them one at a time, keeps a live
//! view of which are healthy, and demotes the ones that go quiet.

pub use herald_core;

mod agent;
mod pool;
mod retry;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use agent::Agent;
pub use pool::{AgentPool, CampaignSlot};
pub use retry::{Backoff, RetryPolicy};

// Re-export core types for convenience
pub use herald_core::{AgentId, AgentState, Credential, HeraldError, PoolState, Result};
