//! Domain model (ids, task state, topology snapshots, commands, errors).

pub mod command;
pub mod errors;
pub mod ids;
pub mod state;
pub mod task_type;
pub mod topology;

pub use command::{Command, StepResult};
pub use errors::{ClusterError, ConfigError, DriverError};
pub use ids::{NodeId, PeerId, RangeId, TaskId};
pub use state::TaskState;
pub use task_type::TaskType;
pub use topology::{Peer, PeerRole, Range};
