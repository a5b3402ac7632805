//! Recipient and group identifiers

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use crate::agent::AgentId;
use crate::error::{DeliveryError, HeraldError};

fn parse_decimal(input: &str) -> Result<u64, HeraldError> {
    let trimmed = input.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(HeraldError::InvalidIdentifier {
            input: input.to_string(),
        });
    }
    trimmed.parse().map_err(|_| HeraldError::InvalidIdentifier {
        input: input.to_string(),
    })
}

/// One addressable recipient.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TargetId(pub u64);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TargetId {
    type Err = HeraldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_decimal(s).map(TargetId)
    }
}

/// A group whose membership roster can be fetched.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct GroupId(pub u64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GroupId {
    type Err = HeraldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_decimal(s).map(GroupId)
    }
}

/// Delivery status of a target within one campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TargetStatus {
    Unassigned,
    Assigned { agent: AgentId },
    Sent { agent: AgentId },
    Failed {
        agent: Option<AgentId>,
        reason: DeliveryError,
    },
}

impl TargetStatus {
    pub fn is_final(&self) -> bool {
        matches!(self, TargetStatus::Sent { .. } | TargetStatus::Failed { .. })
    }
}

/// Drops repeated items, keeping the first occurrence of each.
pub fn dedup_preserving_order<T, I>(items: I) -> Vec<T>
where
    T: Eq + Hash + Clone,
    I: IntoIterator<Item = T>,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_rejects_non_digits() {
        assert!("12a".parse::<TargetId>().is_err());
        assert!("-5".parse::<TargetId>().is_err());
        assert!("".parse::<GroupId>().is_err());
        assert!("  ".parse::<GroupId>().is_err());
        assert_eq!(" 42 ".parse::<TargetId>().unwrap(), TargetId(42));
    }

    #[test]
    fn test_parse_rejects_overflow() {
        assert!("99999999999999999999999".parse::<TargetId>().is_err());
    }

    #[test]
    fn test_dedup_keeps_first_seen_order() {
        let ids = dedup_preserving_order(vec![3, 1, 3, 2, 1]);
        assert_eq!(ids, vec![3, 1, 2]);
    }

    proptest! {
        #[test]
        fn dedup_output_is_unique_subset(input in proptest::collection::vec(0u64..50, 0..200)) {
            let out = dedup_preserving_order(input.clone());
            let unique: HashSet<_> = out.iter().copied().collect();
            prop_assert_eq!(unique.len(), out.len());
            prop_assert_eq!(unique, input.iter().copied().collect::<HashSet<_>>());
        }
    }
}
