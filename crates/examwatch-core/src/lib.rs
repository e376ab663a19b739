//! examwatch-core: pure proctoring anomaly model.
//!
//! Per-signal classifiers (face count, audio loudness with cooldown, tab
//! focus transitions) and the aggregator that fuses them into one status,
//! an append-only audit log and face-anomaly counters. No async, no IO,
//! no clock reads: every timestamp is passed in by the caller.

pub mod aggregator;
pub mod audio;
pub mod config;
pub mod face;
pub mod focus;
pub mod types;

pub use aggregator::{AnomalyAggregator, Applied, AuditLog, StatusSnapshot};
pub use config::{ConfigError, MonitorConfig};
