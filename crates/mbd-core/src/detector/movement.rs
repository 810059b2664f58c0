//! Distance Moved Verifier (DMV).
//!
//! Re-derives how far a sender has moved from its own message history. A
//! message is flagged when some earlier message of the same sender, received
//! less than `time_window` before it, was sent from at least `threshold`
//! metres away.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::{Detector, DetectorId, append_labels, float_cells};
use crate::error::{ConfigError, DetectorError};
use crate::table::{ObservationTable, columns};
use crate::types::{ThresholdSet, Vec3, Verdict};

pub const DEFAULT_TIME_WINDOW: f64 = 10.0;

fn default_time_window() -> f64 {
    DEFAULT_TIME_WINDOW
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementVerifier {
    /// Movement distances (metres) considered implausible inside the window.
    pub thresholds: ThresholdSet,
    /// Look-back window in `rcvTime` units.
    #[serde(default = "default_time_window")]
    pub time_window: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

/// Outcome of one backward scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scan {
    /// Distance to the last message inspected (0 when nothing was inspected).
    pub distance: f64,
    pub verdict: Verdict,
}

impl MovementVerifier {
    pub fn new(thresholds: ThresholdSet) -> Self {
        Self {
            thresholds,
            time_window: DEFAULT_TIME_WINDOW,
            suffix: None,
        }
    }

    pub fn with_time_window(mut self, time_window: f64) -> Self {
        self.time_window = time_window;
        self
    }

    /// Scan `history` (oldest first, current message excluded) from the most
    /// recent entry backwards.
    pub fn scan(&self, current: (Vec3, f64), history: &[(Vec3, f64)], threshold: f64) -> Scan {
        let (position, time) = current;
        let mut distance = 0.0;
        for (prev_position, prev_time) in history.iter().rev() {
            distance = position.distance(prev_position);
            if (time - prev_time).abs() >= self.time_window {
                return Scan {
                    distance,
                    verdict: Verdict::Normal,
                };
            }
            if distance >= threshold {
                return Scan {
                    distance,
                    verdict: Verdict::Attack,
                };
            }
        }
        Scan {
            distance,
            verdict: Verdict::Normal,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.time_window.is_finite() || self.time_window <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                name: "time_window",
                reason: format!("{} is not a positive duration", self.time_window),
            });
        }
        Ok(())
    }
}

impl Detector for MovementVerifier {
    fn id(&self) -> DetectorId {
        DetectorId::MovementVerifier
    }

    fn suffix(&self) -> &str {
        self.suffix.as_deref().unwrap_or("")
    }

    fn classify(&self, mut table: ObservationTable) -> Result<ObservationTable, DetectorError> {
        self.validate()?;

        let senders = table.id_column(columns::SENDER)?;
        let positions = table.vec3_column(columns::SENDER_POSITION)?;
        let times = table.f64_column(columns::RCV_TIME)?;
        let truth = table.attacker_flags()?;

        // Row indices per sender, in file order.
        let mut partitions: HashMap<i64, Vec<usize>> = HashMap::new();
        for (row, sender) in senders.iter().enumerate() {
            partitions.entry(*sender).or_default().push(row);
        }

        debug!(rows = table.len(), senders = partitions.len(), "distance moved scan");

        let n = table.len();
        let mut distances = vec![0.0; n];
        let mut verdicts = vec![vec![Verdict::Normal; n]; self.thresholds.len()];

        for rows in partitions.values() {
            let history: Vec<(Vec3, f64)> = rows.iter().map(|&r| (positions[r], times[r])).collect();
            for seq in 1..rows.len() {
                let row = rows[seq];
                for (k, threshold) in self.thresholds.iter().enumerate() {
                    let scan = self.scan(history[seq], &history[..seq], threshold);
                    // Shared column: the last threshold's scan wins.
                    distances[row] = scan.distance;
                    verdicts[k][row] = scan.verdict;
                }
            }
        }

        table.push_column("distance", float_cells(&distances))?;
        append_labels(&mut table, self.id(), &self.thresholds, &verdicts, &truth)?;
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Observation;

    fn message(sender: i64, x: f64, time: f64, attacker_type: i64) -> Observation {
        Observation {
            sender,
            receiver: 100,
            rcv_time: time,
            sender_position: Vec3::new(x, 0.0, 0.0),
            attacker_type,
            ..Default::default()
        }
    }

    fn detector(thresholds: &[f64]) -> MovementVerifier {
        MovementVerifier::new(ThresholdSet::new(thresholds.to_vec()).unwrap())
    }

    #[test]
    fn test_jump_inside_window_is_attack() {
        let table =
            ObservationTable::from_observations(&[message(1, 0.0, 0.0, 0), message(1, 10.0, 3.0, 1)]);
        let out = detector(&[5.0]).classify(table).unwrap();

        assert_eq!(out.value(0, "dmv5"), Some("Normal"));
        assert_eq!(out.value(1, "dmv5"), Some("Attack"));
        assert_eq!(out.value(1, "cmtx5"), Some("TP"));
        assert_eq!(out.value(1, "distance"), Some("10"));
    }

    #[test]
    fn test_jump_outside_window_is_normal() {
        let table =
            ObservationTable::from_observations(&[message(1, 0.0, 0.0, 0), message(1, 10.0, 10.0, 0)]);
        let out = detector(&[5.0]).classify(table).unwrap();
        assert_eq!(out.value(1, "dmv5"), Some("Normal"));
        assert_eq!(out.value(1, "cmtx5"), Some("TN"));
    }

    #[test]
    fn test_scan_reaches_past_immediate_predecessor() {
        let rows: Vec<_> = (0..4).map(|i| message(7, i as f64 * 2.0, i as f64, 0)).collect();
        let table = ObservationTable::from_observations(&rows);
        let out = detector(&[5.0]).classify(table).unwrap();

        assert_eq!(out.value(1, "dmv5"), Some("Normal"));
        assert_eq!(out.value(2, "dmv5"), Some("Normal"));
        // 6 metres from the first message, 3 time units earlier.
        assert_eq!(out.value(3, "dmv5"), Some("Attack"));
        assert_eq!(out.value(3, "cmtx5"), Some("FP"));
    }

    #[test]
    fn test_first_message_of_every_sender_is_normal() {
        let table = ObservationTable::from_observations(&[
            message(1, 0.0, 0.0, 1),
            message(2, 5000.0, 0.5, 1),
            message(1, 900.0, 1.0, 1),
            message(3, -900.0, 1.5, 1),
        ]);
        let out = detector(&[1.0, 10.0]).classify(table).unwrap();
        for row in [0, 1, 3] {
            assert_eq!(out.value(row, "dmv1"), Some("Normal"));
            assert_eq!(out.value(row, "dmv10"), Some("Normal"));
            assert_eq!(out.value(row, "distance"), Some("0"));
        }
        // Interleaved senders never see each other's positions.
        assert_eq!(out.value(2, "dmv10"), Some("Attack"));
    }

    #[test]
    fn test_constant_position_never_attacks() {
        let rows: Vec<_> = (0..100)
            .map(|i| {
                let sender = (i % 4) as i64;
                message(sender, sender as f64 * 1000.0, rand::random::<f64>() * 20.0, 0)
            })
            .collect();
        let table = ObservationTable::from_observations(&rows);
        let out = detector(&[0.5, 1.0, 25.0]).classify(table).unwrap();
        for t in ["dmv0.5", "dmv1", "dmv25"] {
            assert!(out.text_column(t).unwrap().iter().all(|l| *l == "Normal"));
        }
    }

    #[test]
    fn test_distance_column_keeps_last_threshold_scan() {
        let table = ObservationTable::from_observations(&[
            message(1, 0.0, 0.0, 0),
            message(1, 10.0, 1.0, 0),
            message(1, 11.0, 2.0, 0),
        ]);
        // Threshold 5 scans back to the first message (11 m), threshold 0.5
        // stops at the immediate predecessor (1 m).
        let out = detector(&[5.0, 0.5]).classify(table).unwrap();
        assert_eq!(out.value(2, "dmv5"), Some("Attack"));
        assert_eq!(out.value(2, "dmv0.5"), Some("Attack"));
        assert_eq!(out.value(2, "distance"), Some("1"));
    }

    #[test]
    fn test_custom_window_and_invalid_window() {
        let table =
            ObservationTable::from_observations(&[message(1, 0.0, 0.0, 0), message(1, 10.0, 3.0, 0)]);
        let out = detector(&[5.0])
            .with_time_window(2.0)
            .classify(table.clone())
            .unwrap();
        assert_eq!(out.value(1, "dmv5"), Some("Normal"));

        let err = detector(&[5.0]).with_time_window(0.0).classify(table);
        assert!(matches!(err, Err(DetectorError::Config(_))));
    }

    #[test]
    fn test_missing_time_column_fails() {
        let mut table = ObservationTable::from_observations(&[message(1, 0.0, 0.0, 0)]);
        table.drop_columns(&["rcvTime"]);
        assert!(detector(&[5.0]).classify(table).is_err());
    }
}
