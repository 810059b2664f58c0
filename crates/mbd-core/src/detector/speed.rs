//! Simple Speed Check (SSC).
//!
//! Compares the speed a sender claims in each beacon with the speed implied
//! by two consecutive position reports seen by the same receiver.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Detector, DetectorId, append_labels};
use crate::error::{ConfigError, DetectorError};
use crate::opinion::{BaseRateFusion, DEFAULT_BASE_RATE, Fuse, Opinion};
use crate::table::{ObservationTable, columns};
use crate::types::{ThresholdSet, Verdict, threshold_label};

/// Uncertainty mass of every graded opinion.
pub const UNCERTAINTY: f64 = 0.1;

/// Expectations below this value are classified as attacks.
pub const EXPECTATION_FLOOR: f64 = 0.2;

/// Suffix used by the graded variant when none is configured.
pub const GRADED_SUFFIX: &str = "-subj";

/// Columns consumed by the check and removed from its output.
const CONSUMED: [&str; 7] = ["pxSnd", "pySnd", "pzSnd", "sxSnd", "sySnd", "szSnd", "rcvTime"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedDecision {
    /// Attack iff the deviation reaches the threshold.
    #[default]
    Hard,
    /// Attack iff the subjective-logic expectation drops below 0.2.
    Graded,
}

fn default_base_rate() -> f64 {
    DEFAULT_BASE_RATE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedConsistency {
    /// Maximum tolerated speed deviation (m/s).
    pub thresholds: ThresholdSet,
    #[serde(default)]
    pub decision: SpeedDecision,
    /// A-priori probability for the native fusion.
    #[serde(default = "default_base_rate")]
    pub base_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

impl SpeedConsistency {
    pub fn new(thresholds: ThresholdSet, decision: SpeedDecision) -> Self {
        Self {
            thresholds,
            decision,
            base_rate: DEFAULT_BASE_RATE,
            suffix: None,
        }
    }

    pub fn hard(thresholds: ThresholdSet) -> Self {
        Self::new(thresholds, SpeedDecision::Hard)
    }

    pub fn graded(thresholds: ThresholdSet) -> Self {
        Self::new(thresholds, SpeedDecision::Graded)
    }

    /// Speed implied by moving `distance` in `elapsed` time units.
    ///
    /// A zero interval yields the raw distance.
    pub fn derived_speed(distance: f64, elapsed: f64) -> f64 {
        if elapsed == 0.0 {
            distance
        } else {
            distance / elapsed
        }
    }

    /// Run the check with an injected fusion instead of the native one.
    pub fn classify_with(
        &self,
        mut table: ObservationTable,
        fusion: &dyn Fuse,
    ) -> Result<ObservationTable, DetectorError> {
        if !(0.0..=1.0).contains(&self.base_rate) {
            return Err(ConfigError::InvalidParameter {
                name: "base_rate",
                reason: format!("{} is outside [0, 1]", self.base_rate),
            }
            .into());
        }

        let receivers = table.id_column(columns::RECEIVER)?;
        let senders = table.id_column(columns::SENDER)?;
        let positions = table.vec3_column(columns::SENDER_POSITION)?;
        let speeds = table.vec3_column(columns::SENDER_SPEED)?;
        let times = table.f64_column(columns::RCV_TIME)?;
        let truth = table.attacker_flags()?;

        // Stable: rows of one link keep their file order.
        let mut order: Vec<usize> = (0..table.len()).collect();
        order.sort_by_key(|&i| (receivers[i], senders[i]));

        let link = |i: usize| (receivers[i], senders[i]);
        let deltas: Vec<Option<f64>> = order
            .iter()
            .enumerate()
            .map(|(k, &i)| {
                let prev = k.checked_sub(1).map(|p| order[p]).filter(|&p| link(p) == link(i))?;
                let distance = positions[i].distance(&positions[prev]);
                let elapsed = (times[i] - times[prev]).abs();
                let derived = Self::derived_speed(distance, elapsed);
                Some((speeds[i].norm() - derived).abs())
            })
            .collect();

        let graded = self.decision == SpeedDecision::Graded;
        let mut verdicts = Vec::with_capacity(self.thresholds.len());
        let mut expectations = Vec::with_capacity(self.thresholds.len());
        for threshold in self.thresholds.iter() {
            let mut labels = Vec::with_capacity(deltas.len());
            let mut subj = Vec::with_capacity(deltas.len());
            for delta in &deltas {
                let verdict = if graded {
                    let opinion = match delta {
                        Some(d) => Opinion::from_deviation(*d, threshold, UNCERTAINTY),
                        None => Opinion::trusted(UNCERTAINTY),
                    };
                    let e = fusion.expectation(&opinion);
                    subj.push(e.to_string());
                    if e < EXPECTATION_FLOOR {
                        Verdict::Attack
                    } else {
                        Verdict::Normal
                    }
                } else {
                    match delta {
                        Some(d) if *d >= threshold => Verdict::Attack,
                        _ => Verdict::Normal,
                    }
                };
                labels.push(verdict);
            }
            verdicts.push(labels);
            expectations.push(subj);
        }

        debug!(
            rows = deltas.len(),
            first_of_link = deltas.iter().filter(|d| d.is_none()).count(),
            graded,
            "speed consistency check"
        );

        let truth: Vec<bool> = order.iter().map(|&i| truth[i]).collect();
        table.reorder(&order);
        append_labels(&mut table, self.id(), &self.thresholds, &verdicts, &truth)?;
        if graded {
            for (threshold, subj) in self.thresholds.iter().zip(expectations) {
                table.push_column(format!("subj{}", threshold_label(threshold)), subj)?;
            }
        }
        let delta_cells = deltas
            .iter()
            .map(|d| d.map(|v| v.to_string()).unwrap_or_default())
            .collect();
        table.push_column("deltaSpeed", delta_cells)?;
        table.drop_columns(&CONSUMED);
        Ok(table)
    }
}

impl Detector for SpeedConsistency {
    fn id(&self) -> DetectorId {
        DetectorId::SpeedConsistency
    }

    fn suffix(&self) -> &str {
        match (&self.suffix, self.decision) {
            (Some(s), _) => s.as_str(),
            (None, SpeedDecision::Graded) => GRADED_SUFFIX,
            (None, SpeedDecision::Hard) => "",
        }
    }

    fn classify(&self, table: ObservationTable) -> Result<ObservationTable, DetectorError> {
        self.classify_with(table, &BaseRateFusion::new(self.base_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Observation;
    use crate::types::Vec3;

    fn beacon(receiver: i64, sender: i64, x: f64, speed: f64, time: f64, attacker_type: i64) -> Observation {
        Observation {
            sender,
            receiver,
            rcv_time: time,
            sender_position: Vec3::new(x, 0.0, 0.0),
            sender_speed: Vec3::new(speed, 0.0, 0.0),
            attacker_type,
            ..Default::default()
        }
    }

    fn thresholds(values: &[f64]) -> ThresholdSet {
        ThresholdSet::new(values.to_vec()).unwrap()
    }

    #[test]
    fn test_first_in_group_is_normal() {
        let table = ObservationTable::from_observations(&[
            beacon(1, 2, 0.0, 500.0, 0.0, 1),
            beacon(1, 3, 0.0, 900.0, 0.0, 1),
        ]);
        let out = SpeedConsistency::hard(thresholds(&[5.0])).classify(table).unwrap();
        assert_eq!(out.text_column("ssc5").unwrap(), vec!["Normal", "Normal"]);
        assert_eq!(out.text_column("cmtx5").unwrap(), vec!["FN", "FN"]);
        assert_eq!(out.text_column("deltaSpeed").unwrap(), vec!["", ""]);
    }

    #[test]
    fn test_consistent_and_inconsistent_speed() {
        // 20 m in 2 s = 10 m/s.
        let table = ObservationTable::from_observations(&[
            beacon(1, 2, 0.0, 10.0, 0.0, 0),
            beacon(1, 2, 20.0, 10.0, 2.0, 0),
            beacon(1, 2, 40.0, 30.0, 4.0, 8),
        ]);
        let out = SpeedConsistency::hard(thresholds(&[5.0, 25.0])).classify(table).unwrap();
        assert_eq!(out.value(1, "ssc5"), Some("Normal"));
        assert_eq!(out.value(1, "deltaSpeed"), Some("0"));
        assert_eq!(out.value(2, "ssc5"), Some("Attack"));
        assert_eq!(out.value(2, "cmtx5"), Some("TP"));
        assert_eq!(out.value(2, "ssc25"), Some("Normal"));
        assert_eq!(out.value(2, "cmtx25"), Some("FN"));
    }

    #[test]
    fn test_zero_elapsed_time_uses_raw_distance() {
        assert_eq!(SpeedConsistency::derived_speed(10.0, 0.0), 10.0);
        assert_eq!(SpeedConsistency::derived_speed(10.0, 2.0), 5.0);

        let table = ObservationTable::from_observations(&[
            beacon(1, 2, 0.0, 0.0, 3.0, 0),
            beacon(1, 2, 10.0, 0.0, 3.0, 0),
        ]);
        let out = SpeedConsistency::hard(thresholds(&[5.0])).classify(table).unwrap();
        assert_eq!(out.value(1, "deltaSpeed"), Some("10"));
        assert_eq!(out.value(1, "ssc5"), Some("Attack"));
    }

    #[test]
    fn test_rows_grouped_by_receiver_then_sender() {
        let table = ObservationTable::from_observations(&[
            beacon(2, 5, 0.0, 0.0, 0.0, 0),
            beacon(1, 9, 0.0, 0.0, 0.0, 0),
            beacon(1, 5, 0.0, 0.0, 0.0, 0),
            beacon(2, 5, 100.0, 0.0, 1.0, 0),
            beacon(1, 5, 0.0, 0.0, 1.0, 0),
        ]);
        let out = SpeedConsistency::hard(thresholds(&[5.0])).classify(table).unwrap();

        assert_eq!(out.id_column("receiver").unwrap(), vec![1, 1, 1, 2, 2]);
        assert_eq!(out.id_column("sender").unwrap(), vec![5, 5, 9, 5, 5]);
        assert_eq!(
            out.text_column("ssc5").unwrap(),
            vec!["Normal", "Normal", "Normal", "Normal", "Attack"]
        );
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn test_consumed_columns_are_dropped() {
        let table = ObservationTable::from_observations(&[beacon(1, 2, 0.0, 0.0, 0.0, 0)]);
        let out = SpeedConsistency::hard(thresholds(&[5.0])).classify(table).unwrap();
        for col in CONSUMED {
            assert!(!out.has_column(col), "{} should be dropped", col);
        }
        assert!(out.has_column("pxRcv"));
        assert!(out.has_column("sendTime"));
        assert!(!out.has_column("subj5"));
    }

    #[test]
    fn test_graded_variant_is_stricter_near_threshold() {
        // Deviation 9 against threshold 10: hard says Normal, graded
        // expectation is 0.09 + 0.05 = 0.14 < 0.2.
        let rows = [
            beacon(1, 2, 0.0, 10.0, 0.0, 1),
            beacon(1, 2, 10.0, 19.0, 1.0, 1),
            beacon(1, 2, 20.0, 15.0, 2.0, 1),
        ];
        let hard = SpeedConsistency::hard(thresholds(&[10.0]))
            .classify(ObservationTable::from_observations(&rows))
            .unwrap();
        assert_eq!(hard.value(1, "ssc10"), Some("Normal"));

        let graded = SpeedConsistency::graded(thresholds(&[10.0]))
            .classify(ObservationTable::from_observations(&rows))
            .unwrap();
        assert_eq!(graded.value(1, "ssc10"), Some("Attack"));
        assert_eq!(graded.value(1, "cmtx10"), Some("TP"));
        // Deviation 5: expectation 0.5.
        assert_eq!(graded.value(2, "ssc10"), Some("Normal"));

        let subj = graded.f64_column("subj10").unwrap();
        assert!((subj[0] - 0.95).abs() < 1e-9);
        assert!((subj[1] - 0.14).abs() < 1e-9);
        assert!((subj[2] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_injected_fusion_drives_graded_labels() {
        let rows = [beacon(1, 2, 0.0, 0.0, 0.0, 0), beacon(1, 2, 500.0, 0.0, 1.0, 0)];
        let detector = SpeedConsistency::graded(thresholds(&[1.0]));
        let always_trusted = |_b: f64, _d: f64, _u: f64| 1.0;
        let out = detector
            .classify_with(ObservationTable::from_observations(&rows), &always_trusted)
            .unwrap();
        assert_eq!(out.text_column("ssc1").unwrap(), vec!["Normal", "Normal"]);
    }

    #[test]
    fn test_suffixes_and_bad_base_rate() {
        let t = thresholds(&[5.0]);
        assert_eq!(SpeedConsistency::hard(t.clone()).suffix(), "");
        assert_eq!(SpeedConsistency::graded(t.clone()).suffix(), GRADED_SUFFIX);

        let mut detector = SpeedConsistency::graded(t);
        detector.base_rate = 1.5;
        let table = ObservationTable::from_observations(&[beacon(1, 2, 0.0, 0.0, 0.0, 0)]);
        assert!(matches!(detector.classify(table), Err(DetectorError::Config(_))));
    }
}
