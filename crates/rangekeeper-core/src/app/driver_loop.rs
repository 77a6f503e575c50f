//! DriverLoop - calls `TaskDriver::tick` on a fixed interval.
//!
//! # 実装詳細
//! - tick は await しないので driver は std Mutex で包む
//! - 停止は watch channel 経由（WorkerGroup と同じ流儀）

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::TaskDriver;

/// Handle of the background tick loop.
/// - `shutdown_and_join()` で止めて終了を待つ
/// - handle を drop すると sender も drop され、ループは次の select で抜ける
pub struct DriverLoop {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl DriverLoop {
    pub fn spawn(driver: Arc<Mutex<TaskDriver>>, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            run(driver, interval, &mut shutdown_rx).await;
        });
        Self { shutdown_tx, join }
    }

    /// Ask the loop to stop after the tick in progress, if any.
    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }
}

async fn run(
    driver: Arc<Mutex<TaskDriver>>,
    interval: Duration,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_ms = interval.as_millis() as u64, "driver loop started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown_rx.changed() => {
                // sender dropped: nobody can stop us any more, so stop now
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        let report = driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tick();
        if !report.is_idle() {
            debug!(
                stepped = report.stepped,
                dispatched = report.dispatched,
                finished = report.finished.len(),
                expired = report.expired.len(),
                "tick"
            );
        }
    }

    info!("driver loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverConfig;
    use crate::domain::{NodeId, RangeId};
    use crate::impls::{InMemoryCluster, InMemoryOutbox, StorageNodeStub};
    use crate::ports::{Cluster, SystemClock, UlidGenerator};

    fn lock(driver: &Mutex<TaskDriver>) -> std::sync::MutexGuard<'_, TaskDriver> {
        driver.lock().unwrap()
    }

    #[tokio::test]
    async fn loop_drives_add_peer_to_completion_and_stops() {
        let cluster = Arc::new(InMemoryCluster::new());
        for id in 1..=3 {
            cluster.add_node(NodeId::new(id));
        }
        cluster
            .create_range(RangeId::new(1), &[NodeId::new(1), NodeId::new(2)])
            .unwrap();
        let outbox = Arc::new(InMemoryOutbox::new());
        let clock = Arc::new(SystemClock);
        let driver = Arc::new(Mutex::new(TaskDriver::new(
            cluster.clone(),
            outbox.clone(),
            clock.clone(),
            Arc::new(UlidGenerator::new(clock)),
            DriverConfig::default(),
        )));
        lock(&driver).add_peer(RangeId::new(1)).unwrap();

        let handle = DriverLoop::spawn(driver.clone(), Duration::from_millis(5));
        let mut stub = StorageNodeStub::new(cluster.clone(), outbox, 1);

        let finished = tokio::time::timeout(Duration::from_secs(5), async {
            while !lock(&driver).is_empty() {
                stub.heartbeat();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        handle.shutdown_and_join().await;

        assert!(finished.is_ok(), "add peer did not finish in time");
        let range = cluster.get_range(RangeId::new(1)).unwrap();
        assert_eq!(range.peers().len(), 3);
        assert!(range.peers().iter().all(|p| !p.is_learner()));
    }

    #[tokio::test]
    async fn shutdown_stops_an_idle_loop() {
        let clock = Arc::new(SystemClock);
        let driver = Arc::new(Mutex::new(TaskDriver::new(
            Arc::new(InMemoryCluster::new()),
            Arc::new(InMemoryOutbox::new()),
            clock.clone(),
            Arc::new(UlidGenerator::new(clock)),
            DriverConfig::default(),
        )));

        let handle = DriverLoop::spawn(driver, Duration::from_millis(10));
        let joined =
            tokio::time::timeout(Duration::from_secs(1), handle.shutdown_and_join()).await;
        assert!(joined.is_ok());
    }
}
