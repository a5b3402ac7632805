//! Partition policy types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::HeraldError;

/// How recipients are mapped onto agents for one campaign.
///
/// Exactly one policy is used for the whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionPolicy {
    /// Buckets are computed once from the healthy agents at campaign start.
    /// Recipients of an agent that later goes offline are failed, not moved.
    Static,
    /// The healthy list is recomputed before every send and the recipient's
    /// position is taken modulo its length.
    #[default]
    Dynamic,
}

impl fmt::Display for PartitionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionPolicy::Static => f.write_str("static"),
            PartitionPolicy::Dynamic => f.write_str("dynamic"),
        }
    }
}

impl FromStr for PartitionPolicy {
    type Err = HeraldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(PartitionPolicy::Static),
            "dynamic" => Ok(PartitionPolicy::Dynamic),
            other => Err(HeraldError::InvalidConfig {
                reason: format!("unknown partition policy {other:?}"),
            }),
        }
    }
}
