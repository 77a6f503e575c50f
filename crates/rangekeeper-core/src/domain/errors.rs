//! Error types.
//!
//! Inside a task's `step` every `ClusterError` is absorbed and logged; the
//! task simply stays in its phase until the next tick. Only registration with
//! the driver and configuration loading surface errors to a caller.

use thiserror::Error;

use super::ids::{NodeId, RangeId};

/// Failures reported by the cluster collaborator.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("no node available to host a new replica of {0}")]
    NoAvailableNode(RangeId),

    #[error("{0} not found")]
    RangeNotFound(RangeId),

    #[error("{0} is not registered")]
    NodeNotFound(NodeId),

    #[error("allocation failed for {range}: {reason}")]
    AllocationFailed { range: RangeId, reason: String },

    #[error("bootstrap of {range} on {node} failed: {reason}")]
    BootstrapFailed {
        range: RangeId,
        node: NodeId,
        reason: String,
    },
}

/// Failures registering work with the driver.
#[derive(Debug, Error)]
pub enum DriverError {
    /// At most one task may own a range at a time.
    #[error("{0} already has an active task")]
    RangeBusy(RangeId),
}

/// Invalid or unreadable driver configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
