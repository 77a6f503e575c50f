//! rangekeeper-core
//!
//! Task framework of the placement service: long-running, multi-step,
//! retryable operations on the ranges of a replicated storage cluster.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, topology, state, command, errors）
//! - **ports**: 抽象化レイヤー（Cluster, CommandSink, Clock, IdGenerator）
//! - **task**: BaseTask と ReconcileTask、AddPeerTask
//! - **app**: TaskDriver, DriverLoop, status views
//! - **impls**: 開発・テスト用の in-memory 実装
//! - **config**: DriverConfig

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod task;

pub use app::{DriverLoop, StateCounts, TaskDriver, TaskStatus, TickReport};
pub use config::DriverConfig;
pub use task::{AddPeerTask, BaseTask, ReconcileTask};
