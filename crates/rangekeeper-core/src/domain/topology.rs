//! Read snapshots of cluster membership.
//!
//! These are plain values: whoever hands one out (the `Cluster` port) copies
//! it from its own state, so a task can hold it without locks. A snapshot may
//! lag the real cluster by up to one heartbeat interval.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{NodeId, PeerId, RangeId};

/// Role of a replica inside its raft group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerRole {
    /// Non-voting member receiving catch-up data.
    Learner,

    /// Full consensus participant.
    Voter,
}

/// One replica of a range, hosted on one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub id: PeerId,
    pub node_id: NodeId,
    pub role: PeerRole,
}

impl Peer {
    pub fn new(id: PeerId, node_id: NodeId, role: PeerRole) -> Self {
        Self { id, node_id, role }
    }

    pub fn learner(id: PeerId, node_id: NodeId) -> Self {
        Self::new(id, node_id, PeerRole::Learner)
    }

    pub fn voter(id: PeerId, node_id: NodeId) -> Self {
        Self::new(id, node_id, PeerRole::Voter)
    }

    pub fn is_learner(&self) -> bool {
        self.role == PeerRole::Learner
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.node_id)
    }
}

/// Membership snapshot of one range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub id: RangeId,

    #[serde(default)]
    pub peers: Vec<Peer>,

    /// Peer currently leading the raft group, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader: Option<PeerId>,
}

impl Range {
    pub fn new(id: RangeId) -> Self {
        Self {
            id,
            peers: Vec::new(),
            leader: None,
        }
    }

    pub fn with_peer(mut self, peer: Peer) -> Self {
        self.peers.push(peer);
        self
    }

    pub fn with_leader(mut self, leader: PeerId) -> Self {
        self.leader = Some(leader);
        self
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    /// Membership lookup.
    pub fn get_peer(&self, peer_id: PeerId) -> Option<&Peer> {
        self.peers.iter().find(|p| p.id == peer_id)
    }

    pub fn leader_peer(&self) -> Option<&Peer> {
        self.leader.and_then(|id| self.get_peer(id))
    }

    pub fn has_replica_on(&self, node_id: NodeId) -> bool {
        self.peers.iter().any(|p| p.node_id == node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range() -> Range {
        Range::new(RangeId::new(1))
            .with_peer(Peer::voter(PeerId::new(10), NodeId::new(1)))
            .with_peer(Peer::learner(PeerId::new(11), NodeId::new(2)))
            .with_leader(PeerId::new(10))
    }

    #[test]
    fn get_peer_finds_members_only() {
        let r = range();
        assert_eq!(r.get_peer(PeerId::new(11)).map(|p| p.role), Some(PeerRole::Learner));
        assert!(r.get_peer(PeerId::new(99)).is_none());
    }

    #[test]
    fn leader_peer_requires_membership() {
        let r = range();
        assert_eq!(r.leader_peer().map(|p| p.node_id), Some(NodeId::new(1)));

        let orphan = Range::new(RangeId::new(2)).with_leader(PeerId::new(5));
        assert!(orphan.leader_peer().is_none());
    }

    #[test]
    fn has_replica_on_checks_hosting_node() {
        let r = range();
        assert!(r.has_replica_on(NodeId::new(2)));
        assert!(!r.has_replica_on(NodeId::new(3)));
    }

    #[test]
    fn peer_display_names_id_and_node() {
        let p = Peer::learner(PeerId::new(4), NodeId::new(8));
        assert_eq!(p.to_string(), "peer-4@node-8");
    }
}
