//! StorageNodeStub - simulated heartbeat rounds of every storage node.
//!
//! Each round, for every alive node:
//! 1. pick up queued commands from the outbox and apply them to the cluster
//! 2. count one round of catch-up for each bootstrapped learner
//! 3. promote learners that caught up for `catch_up_heartbeats` rounds

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{InMemoryCluster, InMemoryOutbox};
use crate::domain::{PeerId, RangeId};

/// What one heartbeat round did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatReport {
    pub applied: usize,
    pub ignored: usize,
    pub promoted: usize,
}

pub struct StorageNodeStub {
    cluster: Arc<InMemoryCluster>,
    outbox: Arc<InMemoryOutbox>,
    catch_up_heartbeats: u32,
    progress: HashMap<(RangeId, PeerId), u32>,
}

impl StorageNodeStub {
    pub fn new(
        cluster: Arc<InMemoryCluster>,
        outbox: Arc<InMemoryOutbox>,
        catch_up_heartbeats: u32,
    ) -> Self {
        Self {
            cluster,
            outbox,
            catch_up_heartbeats: catch_up_heartbeats.max(1),
            progress: HashMap::new(),
        }
    }

    pub fn heartbeat(&mut self) -> HeartbeatReport {
        let mut report = HeartbeatReport::default();
        let alive = self.cluster.alive_nodes();

        for &node_id in &alive {
            for command in self.outbox.drain(node_id) {
                match self.cluster.apply_command(node_id, &command) {
                    Ok(true) => report.applied += 1,
                    Ok(false) => report.ignored += 1,
                    Err(err) => {
                        warn!(node = %node_id, command = %command, error = %err, "command rejected");
                        report.ignored += 1;
                    }
                }
            }
        }

        for (range_id, learner) in self.cluster.learners() {
            if !alive.contains(&learner.node_id)
                || !self.cluster.is_bootstrapped(range_id, learner.node_id)
            {
                continue;
            }

            let rounds = self.progress.entry((range_id, learner.id)).or_insert(0);
            *rounds += 1;
            if *rounds < self.catch_up_heartbeats {
                continue;
            }

            match self.cluster.promote(range_id, learner.id) {
                Ok(true) => {
                    debug!(range = %range_id, peer = %learner, "learner caught up, promoted");
                    self.progress.remove(&(range_id, learner.id));
                    report.promoted += 1;
                }
                Ok(false) => {}
                Err(err) => warn!(range = %range_id, peer = %learner, error = %err, "promotion failed"),
            }
        }

        report
    }
}
