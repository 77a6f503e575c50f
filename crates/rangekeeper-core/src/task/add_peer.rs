//! Add-peer task: bring one new replica of a range from nothing to voter.
//!
//! Phases:
//! 1. `Start`: allocate a peer + node (once), emit `AddRaftMember`.
//! 2. `WaitConfReady`: until the peer shows up in range membership, re-emit
//!    the same `AddRaftMember`.
//! 3. `WaitRangeCreated`: bootstrap the range's data on the new node.
//! 4. `WaitDataSynced`: observe only; the storage node's raft layer promotes
//!    the learner once it has caught up.
//!
//! Every exit condition is read from the snapshot passed to `step`, never
//! from a "did I already send this" flag. The heartbeat channel gives no
//! delivery confirmation, so re-sending is how lost commands heal.

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info};

use super::{BaseTask, ReconcileTask};
use crate::domain::{Command, Peer, PeerRole, Range, RangeId, StepResult, TaskId, TaskState, TaskType};
use crate::ports::Cluster;

/// Default lifetime of an add-peer task.
pub const DEFAULT_ADD_PEER_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct AddPeerTask {
    base: BaseTask,

    /// Replica being added. Allocated once in `Start`; its id and node never
    /// change afterwards.
    peer: Option<Peer>,

    /// Times `AddRaftMember` was re-issued.
    conf_retries: u32,

    /// Failed bootstrap attempts.
    create_retries: u32,
}

impl AddPeerTask {
    pub fn new(id: TaskId, range_id: RangeId, now: DateTime<Utc>, timeout: Duration) -> Self {
        Self {
            base: BaseTask::new(id, TaskType::AddPeer, range_id, now, timeout),
            peer: None,
            conf_retries: 0,
            create_retries: 0,
        }
    }

    pub fn peer(&self) -> Option<&Peer> {
        self.peer.as_ref()
    }

    pub fn conf_retries(&self) -> u32 {
        self.conf_retries
    }

    pub fn create_retries(&self) -> u32 {
        self.create_retries
    }

    fn issue_command(&self, peer: &Peer) -> Command {
        Command::AddRaftMember {
            range_id: self.base.range_id(),
            peer: peer.clone(),
        }
    }

    fn step_start(&mut self, cluster: &dyn Cluster, range: &Range) -> StepResult {
        let peer = match self.peer.take() {
            Some(peer) => peer,
            None => match cluster.alloc_peer_and_select_node(range) {
                Ok(mut peer) => {
                    peer.role = PeerRole::Learner;
                    info!(task = %self, peer = %peer, "allocated new peer");
                    peer
                }
                Err(err) => {
                    error!(task = %self, error = %err, "alloc peer failed");
                    return StepResult::pending();
                }
            },
        };

        let command = self.issue_command(&peer);
        self.peer = Some(peer);
        self.base.advance(TaskState::WaitConfReady);
        StepResult::dispatch(command)
    }

    fn step_wait_conf(&mut self, cluster: &dyn Cluster, range: &Range) -> StepResult {
        let Some(peer) = self.peer.as_ref() else {
            error!(task = %self, "no peer allocated while waiting for raft conf");
            return StepResult::pending();
        };

        if range.get_peer(peer.id).is_none() {
            let command = self.issue_command(peer);
            self.conf_retries += 1;
            debug!(task = %self, retries = self.conf_retries, "peer not in membership yet, re-issuing add raft member");
            return StepResult::dispatch(command);
        }

        info!(task = %self, "add raft member finished");
        self.base.advance(TaskState::WaitRangeCreated);

        // No reason to burn a tick: try the bootstrap right away.
        self.step_create_range(cluster, range);
        StepResult::pending()
    }

    fn step_create_range(&mut self, cluster: &dyn Cluster, range: &Range) {
        let Some(peer) = self.peer.as_ref() else {
            error!(task = %self, "no peer allocated while creating range");
            return;
        };
        let node_id = peer.node_id;

        match cluster.prepare_add_peer(range, peer) {
            Ok(()) => {
                info!(task = %self, node = %node_id, "create range finished");
                self.base.advance(TaskState::WaitDataSynced);
            }
            Err(err) => {
                error!(
                    task = %self,
                    error = %err,
                    retries = self.create_retries,
                    "create new range failed"
                );
                self.create_retries += 1;
            }
        }
    }

    /// Returns true once the peer is observed as a voter.
    fn step_wait_sync(&mut self, range: &Range) -> bool {
        let Some(target) = self.peer.as_ref() else {
            error!(task = %self, "no peer allocated while waiting for data sync");
            return false;
        };

        let Some(observed) = range.get_peer(target.id) else {
            error!(task = %self, "could not find target peer when checking data sync");
            return false;
        };

        debug!(task = %self, role = ?observed.role, "checking data sync");
        if observed.is_learner() {
            return false;
        }

        info!(task = %self, "data sync finished");
        self.base.advance(TaskState::Finished);
        true
    }
}

impl ReconcileTask for AddPeerTask {
    fn base(&self) -> &BaseTask {
        &self.base
    }

    fn step(&mut self, cluster: &dyn Cluster, range: &Range) -> StepResult {
        match self.base.state() {
            TaskState::Start => self.step_start(cluster, range),
            TaskState::WaitConfReady => self.step_wait_conf(cluster, range),
            TaskState::WaitRangeCreated => {
                self.step_create_range(cluster, range);
                StepResult::pending()
            }
            TaskState::WaitDataSynced => {
                if self.step_wait_sync(range) {
                    StepResult::finished()
                } else {
                    StepResult::pending()
                }
            }
            TaskState::Finished => {
                error!(task = %self, "unexpected step on finished add peer task");
                StepResult::finished()
            }
        }
    }

    fn detail(&self) -> serde_json::Value {
        serde_json::json!({
            "to_add": self.peer,
            "conf_retries": self.conf_retries,
            "create_retries": self.create_retries,
        })
    }
}

impl fmt::Display for AddPeerTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.peer {
            Some(peer) => write!(f, "{{{} to_add={}}}", self.base, peer),
            None => write!(f, "{{{} to_add=none}}", self.base),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ClusterError, NodeId, PeerId};
    use chrono::{TimeDelta, TimeZone};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use ulid::Ulid;

    /// Cluster whose allocator and bootstrap results are scripted per call.
    #[derive(Default)]
    struct ScriptedCluster {
        allocations: Mutex<VecDeque<Result<Peer, ClusterError>>>,
        alloc_calls: AtomicU32,
        bootstrap_failures: AtomicU32,
        bootstrap_calls: AtomicU32,
    }

    impl ScriptedCluster {
        fn allocating(peer: Peer) -> Self {
            let cluster = Self::default();
            cluster.allocations.lock().unwrap().push_back(Ok(peer));
            cluster
        }

        fn fail_next_allocation(&self) {
            self.allocations
                .lock()
                .unwrap()
                .push_front(Err(ClusterError::NoAvailableNode(RangeId::new(1))));
        }

        fn fail_bootstraps(&self, n: u32) {
            self.bootstrap_failures.store(n, Ordering::SeqCst);
        }
    }

    impl Cluster for ScriptedCluster {
        fn get_range(&self, _range_id: RangeId) -> Option<Range> {
            None
        }

        fn alloc_peer_and_select_node(&self, range: &Range) -> Result<Peer, ClusterError> {
            self.alloc_calls.fetch_add(1, Ordering::SeqCst);
            self.allocations
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ClusterError::NoAvailableNode(range.id)))
        }

        fn prepare_add_peer(&self, range: &Range, peer: &Peer) -> Result<(), ClusterError> {
            self.bootstrap_calls.fetch_add(1, Ordering::SeqCst);
            let left = self.bootstrap_failures.load(Ordering::SeqCst);
            if left > 0 {
                self.bootstrap_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(ClusterError::BootstrapFailed {
                    range: range.id,
                    node: peer.node_id,
                    reason: format!("intentional failure (left={left})"),
                });
            }
            Ok(())
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn new_task() -> AddPeerTask {
        AddPeerTask::new(
            TaskId::from_ulid(Ulid::new()),
            RangeId::new(1),
            t0(),
            DEFAULT_ADD_PEER_TIMEOUT,
        )
    }

    fn p() -> Peer {
        Peer::learner(PeerId::new(100), NodeId::new(3))
    }

    /// Two voters, no sign of the new peer.
    fn empty_range() -> Range {
        Range::new(RangeId::new(1))
            .with_peer(Peer::voter(PeerId::new(10), NodeId::new(1)))
            .with_peer(Peer::voter(PeerId::new(11), NodeId::new(2)))
            .with_leader(PeerId::new(10))
    }

    fn range_with(peer: Peer) -> Range {
        empty_range().with_peer(peer)
    }

    fn add_member(peer: Peer) -> Command {
        Command::AddRaftMember {
            range_id: RangeId::new(1),
            peer,
        }
    }

    /// Drive a fresh task to `WaitDataSynced`.
    fn synced_task(cluster: &ScriptedCluster) -> AddPeerTask {
        let mut task = new_task();
        task.step(cluster, &empty_range());
        task.step(cluster, &range_with(p()));
        assert_eq!(task.state(), TaskState::WaitDataSynced);
        task
    }

    #[test]
    fn fresh_task_allocates_and_issues_add_member() {
        let cluster = ScriptedCluster::allocating(p());
        let mut task = new_task();

        let result = task.step(&cluster, &empty_range());

        assert_eq!(result, StepResult::dispatch(add_member(p())));
        assert_eq!(task.state(), TaskState::WaitConfReady);
        assert_eq!(task.peer(), Some(&p()));
    }

    #[test]
    fn allocated_peer_is_forced_to_learner() {
        let cluster = ScriptedCluster::allocating(Peer::voter(PeerId::new(100), NodeId::new(3)));
        let mut task = new_task();

        task.step(&cluster, &empty_range());

        assert_eq!(task.peer().map(|p| p.role), Some(PeerRole::Learner));
    }

    #[test]
    fn allocation_failure_stays_in_start_and_retries_next_step() {
        let cluster = ScriptedCluster::allocating(p());
        cluster.fail_next_allocation();
        let mut task = new_task();

        let first = task.step(&cluster, &empty_range());
        assert_eq!(first, StepResult::pending());
        assert_eq!(task.state(), TaskState::Start);
        assert!(task.peer().is_none());

        let second = task.step(&cluster, &empty_range());
        assert_eq!(second, StepResult::dispatch(add_member(p())));
        assert_eq!(task.state(), TaskState::WaitConfReady);
        assert_eq!(cluster.alloc_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn missing_member_reissues_identical_command() {
        let cluster = ScriptedCluster::allocating(p());
        let mut task = new_task();
        let range = empty_range();

        let first = task.step(&cluster, &range);
        for expected_retries in 1..=3 {
            let again = task.step(&cluster, &range);
            assert_eq!(again, first);
            assert_eq!(task.conf_retries(), expected_retries);
            assert_eq!(task.state(), TaskState::WaitConfReady);
        }

        assert_eq!(cluster.alloc_calls.load(Ordering::SeqCst), 1);
        assert_eq!(cluster.bootstrap_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn visible_member_bootstraps_in_the_same_step() {
        let cluster = ScriptedCluster::allocating(p());
        let mut task = new_task();
        task.step(&cluster, &empty_range());

        let result = task.step(&cluster, &range_with(p()));

        assert_eq!(result, StepResult::pending());
        assert_eq!(task.state(), TaskState::WaitDataSynced);
        assert_eq!(task.conf_retries(), 0);
        assert_eq!(cluster.bootstrap_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn bootstrap_failure_is_retried_without_escalating() {
        let cluster = ScriptedCluster::allocating(p());
        cluster.fail_bootstraps(2);
        let mut task = new_task();
        task.step(&cluster, &empty_range());

        let range = range_with(p());
        assert_eq!(task.step(&cluster, &range), StepResult::pending());
        assert_eq!(task.state(), TaskState::WaitRangeCreated);
        assert_eq!(task.create_retries(), 1);

        assert_eq!(task.step(&cluster, &range), StepResult::pending());
        assert_eq!(task.state(), TaskState::WaitRangeCreated);
        assert_eq!(task.create_retries(), 2);

        assert_eq!(task.step(&cluster, &range), StepResult::pending());
        assert_eq!(task.state(), TaskState::WaitDataSynced);
        assert_eq!(task.create_retries(), 2);
        assert_eq!(cluster.alloc_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn learner_keeps_waiting_for_sync() {
        let cluster = ScriptedCluster::allocating(p());
        let mut task = synced_task(&cluster);

        for _ in 0..3 {
            assert_eq!(task.step(&cluster, &range_with(p())), StepResult::pending());
            assert_eq!(task.state(), TaskState::WaitDataSynced);
        }
    }

    #[test]
    fn promoted_voter_finishes_without_command() {
        let cluster = ScriptedCluster::allocating(p());
        let mut task = synced_task(&cluster);

        let promoted = Peer::voter(PeerId::new(100), NodeId::new(3));
        let result = task.step(&cluster, &range_with(promoted));

        assert_eq!(result, StepResult::finished());
        assert_eq!(task.state(), TaskState::Finished);
        // Role is observed, never written back.
        assert_eq!(task.peer().map(|p| p.role), Some(PeerRole::Learner));
    }

    #[test]
    fn vanished_peer_during_sync_keeps_waiting() {
        let cluster = ScriptedCluster::allocating(p());
        let mut task = synced_task(&cluster);

        assert_eq!(task.step(&cluster, &empty_range()), StepResult::pending());
        assert_eq!(task.state(), TaskState::WaitDataSynced);
    }

    #[test]
    fn stepping_a_finished_task_is_done_and_silent() {
        let cluster = ScriptedCluster::allocating(p());
        let mut task = synced_task(&cluster);
        let promoted = range_with(Peer::voter(PeerId::new(100), NodeId::new(3)));
        task.step(&cluster, &promoted);

        assert_eq!(task.step(&cluster, &promoted), StepResult::finished());
        assert_eq!(task.state(), TaskState::Finished);
    }

    #[test]
    fn counters_never_decrease_and_grow_by_at_most_one() {
        let cluster = ScriptedCluster::allocating(p());
        cluster.fail_bootstraps(3);
        let mut task = new_task();

        let snapshots = [
            empty_range(),
            empty_range(),
            range_with(p()),
            range_with(p()),
            empty_range(),
            range_with(p()),
            range_with(p()),
            range_with(Peer::voter(PeerId::new(100), NodeId::new(3))),
        ];

        let (mut conf, mut create) = (0, 0);
        let mut state = task.state();
        for range in &snapshots {
            task.step(&cluster, range);
            assert!(task.conf_retries() >= conf && task.conf_retries() <= conf + 1);
            assert!(task.create_retries() >= create && task.create_retries() <= create + 1);
            assert!(task.state() >= state);
            conf = task.conf_retries();
            create = task.create_retries();
            state = task.state();
        }
        assert_eq!(task.state(), TaskState::Finished);
    }

    #[test]
    fn timeout_applies_in_start() {
        let task = new_task();
        assert_eq!(task.state(), TaskState::Start);
        assert!(!task.is_timeout(t0() + TimeDelta::seconds(300)));
        assert!(task.is_timeout(t0() + TimeDelta::seconds(301)));
    }

    #[test]
    fn description_names_id_type_and_peer() {
        let cluster = ScriptedCluster::allocating(p());
        let mut task = new_task();
        assert!(task.to_string().contains("to_add=none"));

        task.step(&cluster, &empty_range());
        let s = task.to_string();
        assert!(s.contains(&task.id().to_string()));
        assert!(s.contains("type=add_peer"));
        assert!(s.contains("to_add=peer-100@node-3"));
    }

    #[test]
    fn detail_exposes_retry_counters() {
        let cluster = ScriptedCluster::allocating(p());
        let mut task = new_task();
        task.step(&cluster, &empty_range());
        task.step(&cluster, &empty_range());

        let detail = task.detail();
        assert_eq!(detail["conf_retries"], 1);
        assert_eq!(detail["create_retries"], 0);
        assert_eq!(detail["to_add"]["id"], 100);
    }
}
