//! Spectator - 把多个独立健康探针聚合为带去抖的健康状态

pub mod config;
pub mod error;
pub mod evaluator;
pub mod journal;
pub mod policy;
pub mod probe;
pub mod replay;
pub mod spectator;

pub use config::{SpectatorConfig, WindowConfig};
pub use error::{Result, SpectatorError};
pub use evaluator::{StateChange, StateEvaluator, StateTracker};
pub use journal::{Journal, JournalRecord};
pub use policy::{ConsecutiveFailureEvaluator, HealthState, LatestRecordEvaluator, TrailingWindowEvaluator};
pub use probe::{probe_fn, FailureKind, FnProbe, Probe, ProbeFailure, ProbeResult};
pub use replay::{read_journal_file, replay, write_journal_file};
pub use spectator::{Clock, CycleReport, Spectator, SubscriptionId, SystemClock};
