//! TaskDriver - owns the active tasks and steps them once per tick.
//!
//! # フロー（1 tick）
//! 1. deadline を過ぎた task を破棄（state に関係なく）
//! 2. Cluster から最新の range snapshot を取得
//! 3. `step` を呼ぶ
//! 4. 返ってきた command を range leader の node に送る
//! 5. done になった task を破棄

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::status::{StateCounts, TaskStatus};
use crate::config::DriverConfig;
use crate::domain::{Command, DriverError, Range, RangeId, TaskId};
use crate::ports::{Clock, Cluster, CommandSink, IdGenerator};
use crate::task::{AddPeerTask, ReconcileTask};

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tasks whose `step` was called.
    pub stepped: usize,

    /// Commands handed to the sink.
    pub dispatched: usize,

    pub finished: Vec<TaskId>,
    pub expired: Vec<TaskId>,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        self.dispatched == 0 && self.finished.is_empty() && self.expired.is_empty()
    }
}

/// Driver of reconciliation tasks, at most one per range.
///
/// Design:
/// - Tasks are owned here exclusively; nothing else holds a reference.
/// - A task never sees the network; the driver routes what it returns.
/// - Expiry is the only failure path. An expired task is dropped without
///   cleanup (a half-added peer is left for a separate reconciliation pass).
pub struct TaskDriver {
    tasks: BTreeMap<RangeId, Box<dyn ReconcileTask>>,
    cluster: Arc<dyn Cluster>,
    sink: Arc<dyn CommandSink>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    config: DriverConfig,
}

impl TaskDriver {
    pub fn new(
        cluster: Arc<dyn Cluster>,
        sink: Arc<dyn CommandSink>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        config: DriverConfig,
    ) -> Self {
        Self {
            tasks: BTreeMap::new(),
            cluster,
            sink,
            clock,
            ids,
            config,
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Register a task for its range.
    pub fn submit(&mut self, task: Box<dyn ReconcileTask>) -> Result<TaskId, DriverError> {
        match self.tasks.entry(task.range_id()) {
            Entry::Occupied(_) => Err(DriverError::RangeBusy(task.range_id())),
            Entry::Vacant(slot) => {
                let id = task.id();
                info!(task = %task, "task submitted");
                slot.insert(task);
                Ok(id)
            }
        }
    }

    /// Create and register an add-peer task for `range_id`.
    pub fn add_peer(&mut self, range_id: RangeId) -> Result<TaskId, DriverError> {
        if self.tasks.contains_key(&range_id) {
            return Err(DriverError::RangeBusy(range_id));
        }
        let task = AddPeerTask::new(
            self.ids.generate_task_id(),
            range_id,
            self.clock.now(),
            self.config.add_peer_timeout(),
        );
        self.submit(Box::new(task))
    }

    /// Drop the task of `range_id` without any cleanup.
    pub fn cancel(&mut self, range_id: RangeId) -> Option<TaskId> {
        let task = self.tasks.remove(&range_id)?;
        info!(task = %task, "task cancelled");
        Some(task.id())
    }

    pub fn get(&self, range_id: RangeId) -> Option<&dyn ReconcileTask> {
        self.tasks.get(&range_id).map(|t| t.as_ref())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn statuses(&self) -> Vec<TaskStatus> {
        let now = self.clock.now();
        self.tasks
            .values()
            .map(|t| TaskStatus::of(t.as_ref(), now))
            .collect()
    }

    pub fn state_counts(&self) -> StateCounts {
        let mut counts = StateCounts::default();
        for task in self.tasks.values() {
            counts.record(task.state());
        }
        counts
    }

    /// Step every active task once, in range order.
    pub fn tick(&mut self) -> TickReport {
        let now = self.clock.now();
        let cluster = self.cluster.as_ref();
        let sink = self.sink.as_ref();
        let mut report = TickReport::default();

        self.tasks.retain(|range_id, task| {
            if task.is_timeout(now) {
                warn!(
                    task = %task,
                    age_ms = task.base().age(now).as_millis() as u64,
                    "task timed out, abandoning"
                );
                report.expired.push(task.id());
                return false;
            }

            let Some(range) = cluster.get_range(*range_id) else {
                warn!(task = %task, "range not found, will retry next tick");
                return true;
            };

            report.stepped += 1;
            let result = task.step(cluster, &range);

            if let Some(command) = result.command
                && route(sink, &range, command)
            {
                report.dispatched += 1;
            }

            if result.done {
                info!(
                    task = %task,
                    age_ms = task.base().age(now).as_millis() as u64,
                    "task finished"
                );
                report.finished.push(task.id());
                return false;
            }
            true
        });

        report
    }
}

/// Send `command` to the node hosting the range leader.
///
/// Without a known leader the command is dropped; the task re-issues it on a
/// later tick.
fn route(sink: &dyn CommandSink, range: &Range, command: Command) -> bool {
    match range.leader_peer() {
        Some(leader) => {
            debug!(range = %range.id, node = %leader.node_id, command = %command, "dispatching command");
            sink.dispatch(leader.node_id, command);
            true
        }
        None => {
            debug!(range = %range.id, command = %command, "no known leader, dropping command");
            false
        }
    }
}
