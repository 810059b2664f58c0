//! Detector contract and the closed set of detector variants.
//!
//! Every detector is a pure transformation of a freshly loaded
//! [`ObservationTable`]: it reads the columns it needs, appends one label and
//! one confusion column per threshold, and hands the table back together with
//! the naming hints the batch harness uses for the output file.

pub mod acceptance_range;
pub mod movement;
pub mod speed;

pub use acceptance_range::AcceptanceRange;
pub use movement::MovementVerifier;
pub use speed::{SpeedConsistency, SpeedDecision};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DetectorError, TableError};
use crate::table::ObservationTable;
use crate::types::{Confusion, ThresholdSet, Verdict, confusion_column, threshold_label};

/// Detector identifiers, used for column tags and output prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorId {
    AcceptanceRange,
    MovementVerifier,
    SpeedConsistency,
}

impl DetectorId {
    pub const ALL: [DetectorId; 3] = [
        Self::AcceptanceRange,
        Self::MovementVerifier,
        Self::SpeedConsistency,
    ];

    /// Short tag used in label column names (`art100`).
    pub fn tag(&self) -> &'static str {
        match self {
            Self::AcceptanceRange => "art",
            Self::MovementVerifier => "dmv",
            Self::SpeedConsistency => "ssc",
        }
    }

    /// Output file prefix (`art-result005.csv`).
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::AcceptanceRange => "art-",
            Self::MovementVerifier => "dmv-",
            Self::SpeedConsistency => "ssc-",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::AcceptanceRange => "Acceptance Range Threshold",
            Self::MovementVerifier => "Distance Moved Verifier",
            Self::SpeedConsistency => "Simple Speed Check",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.tag() == tag)
    }

    /// Name of the label column for `threshold`.
    pub fn label_column(&self, threshold: f64) -> String {
        format!("{}{}", self.tag(), threshold_label(threshold))
    }
}

impl fmt::Display for DetectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Annotated table plus output naming hints.
#[derive(Debug, Clone)]
pub struct DetectorOutput {
    pub table: ObservationTable,
    pub prefix: String,
    pub suffix: String,
}

/// Result of running one detector on one table.
pub type DetectorResult = Result<DetectorOutput, DetectorError>;

/// Capability shared by every detector variant.
pub trait Detector: Send + Sync {
    fn id(&self) -> DetectorId;

    /// Suffix appended to the output file stem.
    fn suffix(&self) -> &str {
        ""
    }

    /// Label every row of `table` for every configured threshold.
    fn classify(&self, table: ObservationTable) -> Result<ObservationTable, DetectorError>;

    fn run(&self, table: ObservationTable) -> DetectorResult {
        let table = self.classify(table)?;
        Ok(DetectorOutput {
            table,
            prefix: self.id().prefix().to_string(),
            suffix: self.suffix().to_string(),
        })
    }
}

/// The configured detector variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectorKind {
    AcceptanceRange(AcceptanceRange),
    MovementVerifier(MovementVerifier),
    SpeedConsistency(SpeedConsistency),
}

impl DetectorKind {
    fn inner(&self) -> &dyn Detector {
        match self {
            Self::AcceptanceRange(d) => d as &dyn Detector,
            Self::MovementVerifier(d) => d,
            Self::SpeedConsistency(d) => d,
        }
    }

    pub fn thresholds(&self) -> &ThresholdSet {
        match self {
            Self::AcceptanceRange(d) => &d.thresholds,
            Self::MovementVerifier(d) => &d.thresholds,
            Self::SpeedConsistency(d) => &d.thresholds,
        }
    }
}

impl Detector for DetectorKind {
    fn id(&self) -> DetectorId {
        self.inner().id()
    }

    fn suffix(&self) -> &str {
        self.inner().suffix()
    }

    fn classify(&self, table: ObservationTable) -> Result<ObservationTable, DetectorError> {
        self.inner().classify(table)
    }
}

impl From<AcceptanceRange> for DetectorKind {
    fn from(d: AcceptanceRange) -> Self {
        Self::AcceptanceRange(d)
    }
}

impl From<MovementVerifier> for DetectorKind {
    fn from(d: MovementVerifier) -> Self {
        Self::MovementVerifier(d)
    }
}

impl From<SpeedConsistency> for DetectorKind {
    fn from(d: SpeedConsistency) -> Self {
        Self::SpeedConsistency(d)
    }
}

/// Append `<tag><t>` columns for every threshold, then `cmtx<t>` columns.
///
/// `verdicts[k][row]` is the verdict for threshold `k`; `truth[row]` is the
/// ground-truth attacker flag of the same row.
pub(crate) fn append_labels(
    table: &mut ObservationTable,
    id: DetectorId,
    thresholds: &ThresholdSet,
    verdicts: &[Vec<Verdict>],
    truth: &[bool],
) -> Result<(), TableError> {
    for (t, labels) in thresholds.iter().zip(verdicts) {
        let values = labels.iter().map(|v| v.to_string()).collect();
        table.push_column(id.label_column(t), values)?;
    }
    for (t, labels) in thresholds.iter().zip(verdicts) {
        let values = labels
            .iter()
            .zip(truth)
            .map(|(v, &actual)| Confusion::of(actual, *v).to_string())
            .collect();
        table.push_column(confusion_column(t), values)?;
    }
    Ok(())
}

pub(crate) fn float_cells(values: &[f64]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
