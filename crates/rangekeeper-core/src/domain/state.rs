//! Lifecycle stage shared by every task kind.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Task state.
///
/// State transitions (forward only):
/// - Start -> WaitConfReady -> WaitRangeCreated -> WaitDataSynced -> Finished
///
/// Expiry is not a state: the driver abandons a task whose deadline passed,
/// whatever stage it was in.
///
/// Variant order is lifecycle order, so `Ord` can be used to check that a
/// transition moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Just created; nothing allocated yet.
    Start,

    /// Membership change issued, waiting to observe the peer in the range.
    WaitConfReady,

    /// Peer is a raft member, its data has not been bootstrapped on the node.
    WaitRangeCreated,

    /// Bootstrapped learner, waiting for promotion to voter.
    WaitDataSynced,

    /// Done.
    Finished,
}

impl TaskState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Finished)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Start => "start",
            TaskState::WaitConfReady => "wait_conf_ready",
            TaskState::WaitRangeCreated => "wait_range_created",
            TaskState::WaitDataSynced => "wait_data_synced",
            TaskState::Finished => "finished",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
