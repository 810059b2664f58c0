//! Acceptance Range Threshold (ART).
//!
//! A message is plausible only if the claimed sender position lies within
//! radio range of the receiver.

use serde::{Deserialize, Serialize};

use super::{Detector, DetectorId, append_labels, float_cells};
use crate::error::DetectorError;
use crate::table::{ObservationTable, columns};
use crate::types::{ThresholdSet, Verdict};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceRange {
    /// Maximum plausible sender-receiver distances (metres).
    pub thresholds: ThresholdSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

impl AcceptanceRange {
    pub fn new(thresholds: ThresholdSet) -> Self {
        Self {
            thresholds,
            suffix: None,
        }
    }

    /// Normal iff `distance <= threshold`.
    pub fn verdict(distance: f64, threshold: f64) -> Verdict {
        if distance <= threshold {
            Verdict::Normal
        } else {
            Verdict::Attack
        }
    }
}

impl Detector for AcceptanceRange {
    fn id(&self) -> DetectorId {
        DetectorId::AcceptanceRange
    }

    fn suffix(&self) -> &str {
        self.suffix.as_deref().unwrap_or("")
    }

    fn classify(&self, mut table: ObservationTable) -> Result<ObservationTable, DetectorError> {
        let senders = table.vec3_column(columns::SENDER_POSITION)?;
        let receivers = table.vec3_column(columns::RECEIVER_POSITION)?;
        let truth = table.attacker_flags()?;

        let distances: Vec<f64> = senders
            .iter()
            .zip(&receivers)
            .map(|(s, r)| s.distance(r))
            .collect();

        let verdicts: Vec<Vec<Verdict>> = self
            .thresholds
            .iter()
            .map(|t| distances.iter().map(|&d| Self::verdict(d, t)).collect())
            .collect();

        table.push_column("distance", float_cells(&distances))?;
        append_labels(&mut table, self.id(), &self.thresholds, &verdicts, &truth)?;
        Ok(table)
    }
}
