//! Commands dispatched toward storage nodes, and the result of one `step`.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::RangeId;
use super::topology::Peer;

/// A command carried to a storage node in a heartbeat response.
///
/// Delivery is at-most-once, possibly lost, possibly duplicated. Receivers
/// must treat a command whose effect is already visible as a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Add `peer` to the raft group of `range_id` (as a learner).
    AddRaftMember { range_id: RangeId, peer: Peer },
}

impl Command {
    pub fn range_id(&self) -> RangeId {
        match self {
            Command::AddRaftMember { range_id, .. } => *range_id,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::AddRaftMember { range_id, peer } => {
                write!(f, "add_raft_member({range_id}, {peer})")
            }
        }
    }
}

/// What one `step` call produced.
///
/// `done == true` means the task reached its terminal state and should be
/// dropped; `command` is the next thing to send, if any.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StepResult {
    pub done: bool,
    pub command: Option<Command>,
}

impl StepResult {
    /// Not done, nothing to send this tick.
    pub fn pending() -> Self {
        Self::default()
    }

    /// Not done, send `command`.
    pub fn dispatch(command: Command) -> Self {
        Self {
            done: false,
            command: Some(command),
        }
    }

    pub fn finished() -> Self {
        Self {
            done: true,
            command: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NodeId, PeerId};

    #[test]
    fn add_raft_member_is_tagged_on_the_wire() {
        let cmd = Command::AddRaftMember {
            range_id: RangeId::new(5),
            peer: Peer::learner(PeerId::new(9), NodeId::new(2)),
        };
        let v = serde_json::to_value(&cmd).unwrap();
        assert_eq!(v["type"], "add_raft_member");
        assert_eq!(v["range_id"], 5);
        assert_eq!(v["peer"]["id"], 9);
        assert_eq!(v["peer"]["node_id"], 2);
        assert_eq!(v["peer"]["role"], "learner");
    }

    #[test]
    fn step_result_constructors() {
        assert_eq!(StepResult::pending(), StepResult { done: false, command: None });
        assert!(StepResult::finished().done);
        assert!(StepResult::finished().command.is_none());
    }
}
