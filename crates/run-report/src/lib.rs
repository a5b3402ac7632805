//! # Run Report
//!
//! Folds the outcome events of one campaign, plus the final agent
//! snapshots, into a JSON report written next to the run.

mod aggregator;

pub use aggregator::{AgentRecord, ReportAggregator, RunReport};
