//! InMemoryOutbox - per-node command queues picked up on heartbeat.
//!
//! # 実装詳細
//! - HashMap<NodeId, VecDeque<Command>> で node ごとにキューを管理
//! - Mutex で排他制御（dispatch は await しないので std Mutex で十分）

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::{Command, NodeId};
use crate::ports::CommandSink;

#[derive(Debug, Default)]
pub struct InMemoryOutbox {
    queues: Mutex<HashMap<NodeId, VecDeque<Command>>>,
}

impl InMemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<NodeId, VecDeque<Command>>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take everything queued for `node_id`, oldest first (heartbeat pickup).
    pub fn drain(&self, node_id: NodeId) -> Vec<Command> {
        self.lock()
            .get_mut(&node_id)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn pending(&self, node_id: NodeId) -> usize {
        self.lock().get(&node_id).map_or(0, VecDeque::len)
    }

    /// Discard every queued command, returning how many were lost.
    pub fn drop_all(&self) -> usize {
        let mut queues = self.lock();
        let lost = queues.values().map(VecDeque::len).sum();
        queues.clear();
        lost
    }
}

impl CommandSink for InMemoryOutbox {
    fn dispatch(&self, node_id: NodeId, command: Command) {
        self.lock().entry(node_id).or_default().push_back(command);
    }
}
