//! Impls - in-process implementations of the ports.
//!
//! Used by the tests and the demo binary. A production deployment plugs its
//! metadata store and heartbeat transport into the same ports.
//!
//! # 含まれる実装
//! - **InMemoryCluster**: cluster metadata + storage-node side effects
//! - **InMemoryOutbox**: per-node outbound command queues
//! - **StorageNodeStub**: simulated heartbeat rounds

pub mod memory_cluster;
pub mod outbox;
pub mod storage_stub;

pub use self::memory_cluster::InMemoryCluster;
pub use self::outbox::InMemoryOutbox;
pub use self::storage_stub::{HeartbeatReport, StorageNodeStub};
