//! Misbehavior detectors for recorded V2X message logs.
//!
//! Each detector labels every received message `Normal` or `Attack` for a set
//! of thresholds and tags the label against the ground-truth attacker flag
//! (`TP`/`FP`/`TN`/`FN`). The batch harness in `mbd-runner` drives these
//! detectors over whole datasets.

pub mod dataset;
pub mod detector;
pub mod error;
pub mod opinion;
pub mod table;
pub mod types;

pub use detector::{
    AcceptanceRange, Detector, DetectorId, DetectorKind, DetectorOutput, DetectorResult,
    MovementVerifier, SpeedConsistency, SpeedDecision,
};
pub use error::{ConfigError, DetectorError, TableError};
pub use opinion::{BaseRateFusion, Fuse, Opinion};
pub use table::{Observation, ObservationTable};
pub use types::{Confusion, ThresholdSet, Vec3, Verdict};
