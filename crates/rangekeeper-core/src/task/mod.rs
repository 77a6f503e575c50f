//! Task framework: long-running, multi-step, retryable cluster operations.
//!
//! A task never talks to the network. Each `step` receives a fresh snapshot,
//! decides from that snapshot alone what (if anything) should be sent next,
//! and returns it to the driver as a `StepResult`. All apparent waiting is
//! just returning without reaching `Finished`; progress is discovered by
//! re-reading state on the next tick.
//!
//! # Layers
//! - **BaseTask**: identity, deadline, lifecycle state (shared)
//! - **ReconcileTask**: object-safe trait the driver drives
//! - **AddPeerTask**: the add-replica protocol

pub mod add_peer;
pub mod base;

pub use self::add_peer::{AddPeerTask, DEFAULT_ADD_PEER_TIMEOUT};
pub use self::base::BaseTask;

use chrono::{DateTime, Utc};
use std::fmt;

use crate::domain::{RangeId, Range, StepResult, TaskId, TaskState, TaskType};
use crate::ports::Cluster;

/// A task the driver can step.
///
/// Implementors embed a `BaseTask` and supply `step`. `step` must be safe to
/// call repeatedly without progress and must never block.
pub trait ReconcileTask: fmt::Display + Send {
    fn base(&self) -> &BaseTask;

    /// Advance as far as the snapshot allows.
    fn step(&mut self, cluster: &dyn Cluster, range: &Range) -> StepResult;

    /// Kind-specific diagnostics (retry counters, target peer, ...).
    fn detail(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    fn id(&self) -> TaskId {
        self.base().id()
    }

    fn task_type(&self) -> TaskType {
        self.base().task_type()
    }

    fn range_id(&self) -> RangeId {
        self.base().range_id()
    }

    fn state(&self) -> TaskState {
        self.base().state()
    }

    fn is_timeout(&self, now: DateTime<Utc>) -> bool {
        self.base().is_timeout(now)
    }
}
