//! mbd-runner - batch harness for the misbehavior detectors
//!
//! Applies the detectors of `mbd-core` to every simulation file of a
//! directory, writes one annotated table per (file, detector), and rolls the
//! annotated tables up into precision/recall summaries.

pub mod config;
pub mod error;
pub mod eval;
pub mod index;
pub mod runner;

pub use config::RunnerConfig;
pub use error::RunnerError;
pub use eval::{PerformanceAggregator, ThresholdMetrics, calculate_metrics, write_summary};
pub use index::{file_index, parse_index_list};
pub use runner::{BatchRunner, PendingFile, RunStats, RunSummary};
