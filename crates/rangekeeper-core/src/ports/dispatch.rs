//! CommandSink port - outbound heartbeat-response queue.
//!
//! A command handed to the sink is picked up by the target node on its next
//! heartbeat. Nothing confirms delivery: the only way to learn a command
//! landed is to observe its effect in a later range snapshot.

use crate::domain::{Command, NodeId};

pub trait CommandSink: Send + Sync {
    /// Queue `command` for `node_id`. Never blocks.
    fn dispatch(&self, node_id: NodeId, command: Command);
}
