use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag identifying the concrete kind of a task.
///
/// Every kind shares `BaseTask` and the driver; only the `step` logic differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum TaskType {
    /// Onboard one new replica of a range.
    AddPeer,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::AddPeer => "add_peer",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
