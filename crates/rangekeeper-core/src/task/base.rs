//! Fields and behavior every task kind embeds.

use chrono::{DateTime, TimeDelta, Utc};
use std::fmt;
use std::time::Duration;
use tracing::error;

use crate::domain::{RangeId, TaskId, TaskState, TaskType};

/// Identity, deadline and lifecycle stage of a task.
///
/// Design:
/// - `id`, `task_type`, `range_id` and `deadline` are fixed at creation.
/// - `state` is only moved by the owning task's `step`, and only forward.
#[derive(Debug, Clone)]
pub struct BaseTask {
    id: TaskId,
    task_type: TaskType,
    range_id: RangeId,
    state: TaskState,
    created_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
}

impl BaseTask {
    pub fn new(
        id: TaskId,
        task_type: TaskType,
        range_id: RangeId,
        created_at: DateTime<Utc>,
        timeout: Duration,
    ) -> Self {
        let timeout = TimeDelta::from_std(timeout).unwrap_or(TimeDelta::MAX);
        let deadline = created_at
            .checked_add_signed(timeout)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            id,
            task_type,
            range_id,
            state: TaskState::Start,
            created_at,
            deadline,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    pub fn range_id(&self) -> RangeId {
        self.range_id
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    /// True iff `now` is past the deadline, whatever the current state.
    pub fn is_timeout(&self, now: DateTime<Utc>) -> bool {
        now > self.deadline
    }

    /// Time since creation (zero if the clock went backwards).
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or_default()
    }

    /// Move to `next`. Returns false and leaves the state alone if `next` is
    /// not strictly later in the lifecycle.
    pub(crate) fn advance(&mut self, next: TaskState) -> bool {
        if next <= self.state {
            error!(task = %self, next = %next, "refusing backward task state transition");
            return false;
        }
        self.state = next;
        true
    }
}

impl fmt::Display for BaseTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id={} type={} range={} state={}",
            self.id, self.task_type, self.range_id, self.state
        )
    }
}
