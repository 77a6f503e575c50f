//! App - アプリケーション層
//!
//! ports と task を組み合わせて、task を実際に進めるロジックを提供します。
//!
//! # 主要コンポーネント
//! - **TaskDriver**: range ごとに最大 1 つの task を保持し、tick ごとに step
//! - **DriverLoop**: TaskDriver を一定間隔で tick する tokio タスク
//! - **TaskStatus / StateCounts**: 監視用のビュー

pub mod driver;
pub mod driver_loop;
pub mod status;

pub use self::driver::{TaskDriver, TickReport};
pub use self::driver_loop::DriverLoop;
pub use self::status::{StateCounts, TaskStatus};
