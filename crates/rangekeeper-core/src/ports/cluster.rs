//! Cluster port - topology and placement collaborator.
//!
//! The placement service's cluster metadata is shared by every task. Tasks
//! never touch it directly: they read snapshots and call the two narrow write
//! operations below. Implementations synchronize internally so that tasks for
//! different ranges can call in concurrently.

use crate::domain::{ClusterError, Peer, Range, RangeId};

pub trait Cluster: Send + Sync {
    /// Latest known membership snapshot of a range.
    ///
    /// May lag the real cluster by up to one heartbeat interval.
    fn get_range(&self, range_id: RangeId) -> Option<Range>;

    /// Allocate a new replica identity for `range` and choose its node.
    ///
    /// Callers invoke this at most once per successful allocation; if a
    /// result is lost before being recorded, calling again must be safe.
    fn alloc_peer_and_select_node(&self, range: &Range) -> Result<Peer, ClusterError>;

    /// Bootstrap the physical data of `range` on `peer`'s node.
    ///
    /// Must succeed as a no-op when the range already exists there.
    fn prepare_add_peer(&self, range: &Range, peer: &Peer) -> Result<(), ClusterError>;
}
