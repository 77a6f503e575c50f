//! Status views for monitoring: task age, stage and retry counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{RangeId, TaskId, TaskState, TaskType};
use crate::task::ReconcileTask;

/// Serializable snapshot of one active task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub task_type: TaskType,
    pub range_id: RangeId,
    pub state: TaskState,
    pub age_ms: u64,
    pub deadline: DateTime<Utc>,

    /// Kind-specific fields (target peer, retry counters, ...).
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub detail: serde_json::Value,
}

impl TaskStatus {
    pub fn of(task: &dyn ReconcileTask, now: DateTime<Utc>) -> Self {
        let base = task.base();
        Self {
            task_id: base.id(),
            task_type: base.task_type(),
            range_id: base.range_id(),
            state: base.state(),
            age_ms: u64::try_from(base.age(now).as_millis()).unwrap_or(u64::MAX),
            deadline: base.deadline(),
            detail: task.detail(),
        }
    }
}

/// Number of active tasks per stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    pub start: usize,
    pub wait_conf_ready: usize,
    pub wait_range_created: usize,
    pub wait_data_synced: usize,
    pub finished: usize,
}

impl StateCounts {
    pub fn record(&mut self, state: TaskState) {
        match state {
            TaskState::Start => self.start += 1,
            TaskState::WaitConfReady => self.wait_conf_ready += 1,
            TaskState::WaitRangeCreated => self.wait_range_created += 1,
            TaskState::WaitDataSynced => self.wait_data_synced += 1,
            TaskState::Finished => self.finished += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.start
            + self.wait_conf_ready
            + self.wait_range_created
            + self.wait_data_synced
            + self.finished
    }
}
