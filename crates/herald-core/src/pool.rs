//! Pool lifecycle types

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolState {
    Starting,
    Running,
    ShuttingDown,
    Closed,
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PoolState::Starting => "starting",
            PoolState::Running => "running",
            PoolState::ShuttingDown => "shutting down",
            PoolState::Closed => "closed",
        };
        f.write_str(label)
    }
}
