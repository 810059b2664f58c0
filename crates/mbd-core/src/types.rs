//! Shared value types: positions, verdicts, confusion labels and thresholds.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConfigError;

/// A 3-component vector (position in metres or speed in m/s).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Vec3) -> f64 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z).norm()
    }
}

/// Binary detector decision for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    Normal,
    Attack,
}

impl Verdict {
    pub fn is_attack(self) -> bool {
        self == Verdict::Attack
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Attack => "Attack",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confusion-matrix label of a detector verdict against ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Confusion {
    TruePositive,
    FalsePositive,
    TrueNegative,
    FalseNegative,
}

impl Confusion {
    /// The single truth table every detector labels with.
    pub fn classify(actual_attacker: bool, detected_attack: bool) -> Self {
        match (actual_attacker, detected_attack) {
            (true, true) => Self::TruePositive,
            (false, true) => Self::FalsePositive,
            (false, false) => Self::TrueNegative,
            (true, false) => Self::FalseNegative,
        }
    }

    pub fn of(actual_attacker: bool, verdict: Verdict) -> Self {
        Self::classify(actual_attacker, verdict.is_attack())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TruePositive => "TP",
            Self::FalsePositive => "FP",
            Self::TrueNegative => "TN",
            Self::FalseNegative => "FN",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label.trim() {
            "TP" => Some(Self::TruePositive),
            "FP" => Some(Self::FalsePositive),
            "TN" => Some(Self::TrueNegative),
            "FN" => Some(Self::FalseNegative),
            _ => None,
        }
    }
}

impl fmt::Display for Confusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, duplicate-free set of decision thresholds for one detector.
///
/// Thresholds must be finite and strictly positive. Order only affects
/// output column order; every threshold is evaluated independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct ThresholdSet(Vec<f64>);

impl ThresholdSet {
    pub fn new(values: Vec<f64>) -> Result<Self, ConfigError> {
        if values.is_empty() {
            return Err(ConfigError::NoThresholds);
        }
        for (i, &t) in values.iter().enumerate() {
            if !t.is_finite() || t <= 0.0 {
                return Err(ConfigError::InvalidThreshold(t));
            }
            if values[..i].contains(&t) {
                return Err(ConfigError::DuplicateThreshold(t));
            }
        }
        Ok(Self(values))
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

impl TryFrom<Vec<f64>> for ThresholdSet {
    type Error = ConfigError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<ThresholdSet> for Vec<f64> {
    fn from(set: ThresholdSet) -> Self {
        set.0
    }
}

/// Column suffix for a threshold: `100.0` -> `"100"`, `2.5` -> `"2.5"`.
pub fn threshold_label(threshold: f64) -> String {
    format!("{}", threshold)
}

/// Name of the confusion column for `threshold` (`cmtx100`).
pub fn confusion_column(threshold: f64) -> String {
    format!("cmtx{}", threshold_label(threshold))
}
