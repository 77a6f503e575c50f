//! InMemoryCluster - cluster metadata held in process.
//!
//! Plays both sides of the protocol:
//! - placement side (`Cluster` port): snapshots, allocation, bootstrap
//! - storage-node side: applying `AddRaftMember` and promoting caught-up learners
//!
//! Storage-node operations are idempotent: re-applying a command whose effect
//! is already visible changes nothing. The driver relies on this because it
//! re-sends commands it cannot confirm.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::domain::{ClusterError, Command, NodeId, Peer, PeerId, PeerRole, Range, RangeId};
use crate::ports::Cluster;

#[derive(Debug, Clone, Copy)]
struct NodeInfo {
    alive: bool,
}

#[derive(Debug, Default)]
struct ClusterState {
    nodes: BTreeMap<NodeId, NodeInfo>,
    ranges: BTreeMap<RangeId, Range>,

    /// (range, node) pairs whose data exists on the node.
    bootstrapped: HashSet<(RangeId, NodeId)>,

    next_peer_id: u64,
}

impl ClusterState {
    fn allocate_peer_id(&mut self) -> PeerId {
        self.next_peer_id += 1;
        PeerId::new(self.next_peer_id)
    }

    /// Replicas hosted per node, across all ranges.
    fn load_of(&self, node_id: NodeId) -> usize {
        self.ranges
            .values()
            .filter(|r| r.has_replica_on(node_id))
            .count()
    }

    fn range_mut(&mut self, range_id: RangeId) -> Result<&mut Range, ClusterError> {
        self.ranges
            .get_mut(&range_id)
            .ok_or(ClusterError::RangeNotFound(range_id))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCluster {
    state: Mutex<ClusterState>,
    alloc_failures: AtomicU32,
    bootstrap_failures: AtomicU32,
}

/// Consume one injected failure, if any are left.
fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_node(&self, node_id: NodeId) {
        self.lock().nodes.insert(node_id, NodeInfo { alive: true });
    }

    pub fn set_node_alive(&self, node_id: NodeId, alive: bool) -> Result<(), ClusterError> {
        let mut state = self.lock();
        let node = state
            .nodes
            .get_mut(&node_id)
            .ok_or(ClusterError::NodeNotFound(node_id))?;
        node.alive = alive;
        Ok(())
    }

    pub fn alive_nodes(&self) -> Vec<NodeId> {
        self.lock()
            .nodes
            .iter()
            .filter(|(_, info)| info.alive)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Create a range with one voter on each of `nodes`, already bootstrapped.
    /// The first voter leads.
    pub fn create_range(&self, range_id: RangeId, nodes: &[NodeId]) -> Result<Range, ClusterError> {
        let mut state = self.lock();
        if let Some(missing) = nodes.iter().find(|n| !state.nodes.contains_key(*n)) {
            return Err(ClusterError::NodeNotFound(*missing));
        }

        let mut range = Range::new(range_id);
        for &node_id in nodes {
            let peer_id = state.allocate_peer_id();
            range.peers.push(Peer::voter(peer_id, node_id));
            state.bootstrapped.insert((range_id, node_id));
        }
        range.leader = range.peers.first().map(|p| p.id);

        state.ranges.insert(range_id, range.clone());
        Ok(range)
    }

    pub fn set_leader(&self, range_id: RangeId, leader: Option<PeerId>) -> Result<(), ClusterError> {
        let mut state = self.lock();
        state.range_mut(range_id)?.leader = leader;
        Ok(())
    }

    pub fn is_bootstrapped(&self, range_id: RangeId, node_id: NodeId) -> bool {
        self.lock().bootstrapped.contains(&(range_id, node_id))
    }

    /// Every learner in every range.
    pub fn learners(&self) -> Vec<(RangeId, Peer)> {
        self.lock()
            .ranges
            .values()
            .flat_map(|r| {
                r.peers
                    .iter()
                    .filter(|p| p.is_learner())
                    .map(move |p| (r.id, p.clone()))
            })
            .collect()
    }

    /// Make the next `n` allocations fail.
    pub fn fail_next_allocations(&self, n: u32) {
        self.alloc_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` bootstraps fail.
    pub fn fail_next_bootstraps(&self, n: u32) {
        self.bootstrap_failures.store(n, Ordering::SeqCst);
    }

    /// Apply a command as the raft group leader on `node_id` would.
    ///
    /// Returns `Ok(true)` if membership changed, `Ok(false)` for a no-op
    /// (already applied, or `node_id` does not host the leader).
    pub fn apply_command(&self, node_id: NodeId, command: &Command) -> Result<bool, ClusterError> {
        let mut state = self.lock();
        match command {
            Command::AddRaftMember { range_id, peer } => {
                let range = state.range_mut(*range_id)?;

                if range.leader_peer().map(|p| p.node_id) != Some(node_id) {
                    debug!(range = %range_id, node = %node_id, "not leader, ignoring add raft member");
                    return Ok(false);
                }
                if range.get_peer(peer.id).is_some() {
                    debug!(range = %range_id, peer = %peer, "peer already a member");
                    return Ok(false);
                }

                range.peers.push(Peer::learner(peer.id, peer.node_id));
                Ok(true)
            }
        }
    }

    /// Promote a learner whose data exists on its node.
    ///
    /// Returns `Ok(true)` if the role changed.
    pub fn promote(&self, range_id: RangeId, peer_id: PeerId) -> Result<bool, ClusterError> {
        let mut state = self.lock();
        let range = state
            .ranges
            .get(&range_id)
            .ok_or(ClusterError::RangeNotFound(range_id))?;
        let Some(node_id) = range.get_peer(peer_id).filter(|p| p.is_learner()).map(|p| p.node_id)
        else {
            return Ok(false);
        };
        if !state.bootstrapped.contains(&(range_id, node_id)) {
            return Ok(false);
        }

        let range = state.range_mut(range_id)?;
        if let Some(peer) = range.peers.iter_mut().find(|p| p.id == peer_id) {
            peer.role = PeerRole::Voter;
        }
        Ok(true)
    }
}

impl Cluster for InMemoryCluster {
    fn get_range(&self, range_id: RangeId) -> Option<Range> {
        self.lock().ranges.get(&range_id).cloned()
    }

    fn alloc_peer_and_select_node(&self, range: &Range) -> Result<Peer, ClusterError> {
        if take_failure(&self.alloc_failures) {
            return Err(ClusterError::AllocationFailed {
                range: range.id,
                reason: "injected failure".into(),
            });
        }

        let mut state = self.lock();
        let current = state
            .ranges
            .get(&range.id)
            .ok_or(ClusterError::RangeNotFound(range.id))?;

        let node_id = state
            .nodes
            .iter()
            .filter(|(id, info)| info.alive && !current.has_replica_on(**id))
            .map(|(id, _)| *id)
            .min_by_key(|id| (state.load_of(*id), *id))
            .ok_or(ClusterError::NoAvailableNode(range.id))?;

        let peer_id = state.allocate_peer_id();
        Ok(Peer::learner(peer_id, node_id))
    }

    fn prepare_add_peer(&self, range: &Range, peer: &Peer) -> Result<(), ClusterError> {
        if take_failure(&self.bootstrap_failures) {
            return Err(ClusterError::BootstrapFailed {
                range: range.id,
                node: peer.node_id,
                reason: "injected failure".into(),
            });
        }

        let mut state = self.lock();
        if !state.ranges.contains_key(&range.id) {
            return Err(ClusterError::RangeNotFound(range.id));
        }
        match state.nodes.get(&peer.node_id) {
            None => return Err(ClusterError::NodeNotFound(peer.node_id)),
            Some(info) if !info.alive => {
                return Err(ClusterError::BootstrapFailed {
                    range: range.id,
                    node: peer.node_id,
                    reason: "node is down".into(),
                });
            }
            Some(_) => {}
        }

        state.bootstrapped.insert((range.id, peer.node_id));
        Ok(())
    }
}
