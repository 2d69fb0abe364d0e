//! Coalescing StatsD buffer for tunnel lifecycle metrics.
//!
//! Tunnel code pushes lifecycle events at high frequency. The queue keeps
//! only the newest event per (kind, entity) and a periodic drain reports the
//! survivors as gauges.

pub mod config;
pub mod export;
pub mod feed;
pub mod sink;
pub mod stats;

pub use self::stats::event::{EntityId, EventKind, QueueEntry, StatEvent};
pub use self::stats::flush::Flusher;
pub use self::stats::{DrainReport, PushOutcome, StatsQueue};
