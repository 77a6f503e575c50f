use anyhow::{Context, bail};
use clap::Parser;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rangekeeper_core::domain::{NodeId, RangeId};
use rangekeeper_core::impls::{InMemoryCluster, InMemoryOutbox, StorageNodeStub};
use rangekeeper_core::ports::{Cluster, SystemClock, UlidGenerator};
use rangekeeper_core::{DriverConfig, DriverLoop, TaskDriver};

/// Replicas every demo range starts with.
const INITIAL_REPLICAS: u64 = 3;

#[derive(Parser, Debug)]
#[command(name = "rangekeeper")]
#[command(about = "Run add-peer tasks against an in-memory cluster")]
struct Args {
    /// JSON driver config; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of ranges that each get one extra replica
    #[arg(long, default_value = "4")]
    ranges: u64,

    /// Number of storage nodes
    #[arg(long, default_value = "5")]
    nodes: u64,

    /// Override tick_interval_ms from the config
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Heartbeat rounds a learner needs before promotion
    #[arg(long, default_value = "3")]
    catch_up: u32,

    /// Inject this many peer allocation failures
    #[arg(long, default_value = "0")]
    fail_allocations: u32,

    /// Inject this many bootstrap failures
    #[arg(long, default_value = "0")]
    fail_bootstraps: u32,
}

fn build_cluster(args: &Args) -> anyhow::Result<Arc<InMemoryCluster>> {
    if args.nodes <= INITIAL_REPLICAS {
        bail!(
            "need more than {INITIAL_REPLICAS} nodes to add a replica, got {}",
            args.nodes
        );
    }

    let cluster = Arc::new(InMemoryCluster::new());
    for id in 1..=args.nodes {
        cluster.add_node(NodeId::new(id));
    }

    // range i lives on INITIAL_REPLICAS consecutive nodes starting at node (i % nodes)
    for i in 0..args.ranges {
        let nodes: Vec<NodeId> = (0..INITIAL_REPLICAS)
            .map(|k| NodeId::new((i + k) % args.nodes + 1))
            .collect();
        cluster
            .create_range(RangeId::new(i + 1), &nodes)
            .with_context(|| format!("create range {}", i + 1))?;
    }

    cluster.fail_next_allocations(args.fail_allocations);
    cluster.fail_next_bootstraps(args.fail_bootstraps);
    Ok(cluster)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => DriverConfig::load(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => DriverConfig::default(),
    };
    if let Some(ms) = args.tick_ms {
        config.tick_interval_ms = ms;
    }
    config.validate()?;

    // (A) cluster と outbox を用意
    let cluster = build_cluster(&args)?;
    let outbox = Arc::new(InMemoryOutbox::new());
    let clock = Arc::new(SystemClock);

    let tick = config.tick_interval();
    let timeout = config.add_peer_timeout();
    let driver = Arc::new(Mutex::new(TaskDriver::new(
        cluster.clone(),
        outbox.clone(),
        clock.clone(),
        Arc::new(UlidGenerator::new(clock)),
        config,
    )));

    // (B) range ごとに add-peer task を投入
    {
        let mut d = driver.lock().unwrap_or_else(PoisonError::into_inner);
        for i in 1..=args.ranges {
            let task_id = d.add_peer(RangeId::new(i))?;
            info!(task_id = %task_id, range = i, "submitted add peer");
        }
    }

    // (C) driver を起動し、storage node 側は heartbeat で進める
    let driver_loop = DriverLoop::spawn(driver.clone(), tick);
    let mut stub = StorageNodeStub::new(cluster.clone(), outbox, args.catch_up);
    let started = Instant::now();
    let mut heartbeat = tokio::time::interval(tick);

    loop {
        heartbeat.tick().await;
        let report = stub.heartbeat();

        let d = driver.lock().unwrap_or_else(PoisonError::into_inner);
        let counts = d.state_counts();
        info!(
            applied = report.applied,
            promoted = report.promoted,
            active = counts.total(),
            wait_conf_ready = counts.wait_conf_ready,
            wait_data_synced = counts.wait_data_synced,
            "heartbeat"
        );
        if d.is_empty() {
            break;
        }
        // driver expires tasks on its own; this only guards a wedged demo
        if started.elapsed() > timeout + tick * 2 {
            warn!("tasks still active after timeout");
            println!("{}", serde_json::to_string_pretty(&d.statuses())?);
            break;
        }
    }

    driver_loop.shutdown_and_join().await;

    let ranges: Vec<_> = (1..=args.ranges)
        .filter_map(|i| cluster.get_range(RangeId::new(i)))
        .collect();
    println!("{}", serde_json::to_string_pretty(&ranges)?);
    Ok(())
}
