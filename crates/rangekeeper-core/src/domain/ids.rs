//! Domain identifiers (strongly-typed IDs).
//!
//! Two families live here:
//! - `Id<T>`: ULID-based ids minted by the placement service itself (tasks).
//!   Sortable by creation time and generated without coordination.
//! - `ClusterId<T>`: `u64` ids handed out by cluster metadata (ranges, peers, nodes).
//!
//! Both use a phantom marker so a `RangeId` can never be passed where a
//! `NodeId` is expected, while costing nothing at runtime.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Marker trait supplying the display prefix of an id family.
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ULID-backed id.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Numeric id assigned by cluster metadata.
///
/// Serialized as the bare number so it matches what storage nodes report.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId<T: IdMarker> {
    value: u64,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> ClusterId<T> {
    pub const fn new(value: u64) -> Self {
        Self {
            value,
            _marker: PhantomData,
        }
    }

    pub const fn get(&self) -> u64 {
        self.value
    }
}

impl<T: IdMarker> From<u64> for ClusterId<T> {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> fmt::Display for ClusterId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.value)
    }
}

// ========================================
// Markers
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "task-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RangeMarker {}

impl IdMarker for RangeMarker {
    fn prefix() -> &'static str {
        "range-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PeerMarker {}

impl IdMarker for PeerMarker {
    fn prefix() -> &'static str {
        "peer-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeMarker {}

impl IdMarker for NodeMarker {
    fn prefix() -> &'static str {
        "node-"
    }
}

/// Identifier of one in-flight reconciliation task.
pub type TaskId = Id<Task>;

/// Identifier of a range (keyspace partition).
pub type RangeId = ClusterId<RangeMarker>;

/// Identifier of one replica of a range.
pub type PeerId = ClusterId<PeerMarker>;

/// Identifier of a storage node.
pub type NodeId = ClusterId<NodeMarker>;
