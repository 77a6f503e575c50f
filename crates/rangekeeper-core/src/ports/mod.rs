//! Ports - interfaces to everything outside the task core.
//!
//! Tasks and the driver only ever see these traits, so the whole protocol can
//! be exercised against in-memory implementations (`crate::impls`).

pub mod clock;
pub mod cluster;
pub mod dispatch;
pub mod id_generator;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::cluster::Cluster;
pub use self::dispatch::CommandSink;
pub use self::id_generator::{IdGenerator, UlidGenerator};
