//! Detection performance over a directory of annotated results.
//!
//! Reads the `cmtx<t>` columns written by a detector, tallies the confusion
//! labels per threshold and derives precision, recall and F1.

use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use mbd_core::types::confusion_column;
use mbd_core::{Confusion, DetectorId, ObservationTable, TableError, ThresholdSet};

use crate::error::RunnerError;
use crate::index::{after_index, file_index};

/// Compute (precision, recall, f1); every ratio is 0 when its denominator is.
pub fn calculate_metrics(tp: u64, fp: u64, fn_: u64) -> (f64, f64, f64) {
    let precision = if tp + fp > 0 {
        tp as f64 / (tp + fp) as f64
    } else {
        0.0
    };
    let recall = if tp + fn_ > 0 {
        tp as f64 / (tp + fn_) as f64
    } else {
        0.0
    };
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    (precision, recall, f1)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionCounts {
    pub tp: u64,
    pub fp: u64,
    pub tn: u64,
    #[serde(rename = "fn")]
    pub fn_: u64,
}

impl ConfusionCounts {
    pub fn record(&mut self, label: Confusion) {
        match label {
            Confusion::TruePositive => self.tp += 1,
            Confusion::FalsePositive => self.fp += 1,
            Confusion::TrueNegative => self.tn += 1,
            Confusion::FalseNegative => self.fn_ += 1,
        }
    }

    pub fn merge(&mut self, other: &ConfusionCounts) {
        self.tp += other.tp;
        self.fp += other.fp;
        self.tn += other.tn;
        self.fn_ += other.fn_;
    }

    pub fn total(&self) -> u64 {
        self.tp + self.fp + self.tn + self.fn_
    }
}

/// One row of the summary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdMetrics {
    pub threshold: f64,
    #[serde(flatten)]
    pub counts: ConfusionCounts,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

pub struct PerformanceAggregator {
    detector: DetectorId,
    suffix: String,
    thresholds: ThresholdSet,
    indices: Option<BTreeSet<u32>>,
    delimiter: u8,
    counts: Vec<ConfusionCounts>,
    files: usize,
}

impl PerformanceAggregator {
    pub fn new(detector: DetectorId, thresholds: ThresholdSet) -> Self {
        let counts = vec![ConfusionCounts::default(); thresholds.len()];
        Self {
            detector,
            suffix: String::new(),
            thresholds,
            indices: None,
            delimiter: b',',
            counts,
            files: 0,
        }
    }

    /// Only count result files carrying this suffix (`-subj` for graded SSC).
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn with_indices(mut self, indices: BTreeSet<u32>) -> Self {
        self.indices = Some(indices);
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn files(&self) -> usize {
        self.files
    }

    /// Whether `name` is a result file of this detector, suffix and index set.
    pub fn matches(&self, name: &str) -> bool {
        if name.starts_with('.') || !name.starts_with(self.detector.prefix()) {
            return false;
        }
        let stem = Path::new(name)
            .file_stem()
            .map(|s| s.to_string_lossy())
            .unwrap_or_default();
        if after_index(&stem) != Some(self.suffix.as_str()) {
            return false;
        }
        match (&self.indices, file_index(name)) {
            (None, Some(_)) => true,
            (Some(set), Some(index)) => set.contains(&index),
            (_, None) => false,
        }
    }

    /// Matching result files of `dir`, sorted by name.
    pub fn result_files(&self, dir: &Path) -> Result<Vec<PathBuf>, RunnerError> {
        let entries = std::fs::read_dir(dir).map_err(|e| RunnerError::io(dir, e))?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| RunnerError::io(dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.matches(&name) && entry.path().is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn add_table(&mut self, table: &ObservationTable) -> Result<(), TableError> {
        // Counts change only if every column parses.
        let mut tally = vec![ConfusionCounts::default(); self.counts.len()];
        for (counts, t) in tally.iter_mut().zip(self.thresholds.iter()) {
            let column = confusion_column(t);
            for (row, label) in table.text_column(&column)?.into_iter().enumerate() {
                let label = Confusion::parse(label).ok_or_else(|| TableError::Malformed {
                    column: column.clone(),
                    row,
                    value: label.to_string(),
                })?;
                counts.record(label);
            }
        }
        for (total, counts) in self.counts.iter_mut().zip(tally) {
            total.merge(&counts);
        }
        self.files += 1;
        Ok(())
    }

    pub fn add_file(&mut self, path: &Path) -> Result<(), RunnerError> {
        let table = ObservationTable::read_csv(path, self.delimiter)?;
        self.add_table(&table)?;
        debug!(file = %path.display(), rows = table.len(), "tallied");
        Ok(())
    }

    /// Tally every matching file of `dir`.
    pub fn aggregate_dir(&mut self, dir: &Path) -> Result<Vec<ThresholdMetrics>, RunnerError> {
        for path in self.result_files(dir)? {
            self.add_file(&path)?;
        }
        info!(
            detector = %self.detector,
            files = self.files,
            dir = %dir.display(),
            "aggregated results"
        );
        Ok(self.metrics())
    }

    pub fn metrics(&self) -> Vec<ThresholdMetrics> {
        self.thresholds
            .iter()
            .zip(&self.counts)
            .map(|(threshold, counts)| {
                let (precision, recall, f1) = calculate_metrics(counts.tp, counts.fp, counts.fn_);
                ThresholdMetrics {
                    threshold,
                    counts: *counts,
                    precision,
                    recall,
                    f1,
                }
            })
            .collect()
    }
}

/// Write `threshold,tp,fp,tn,fn,precision,recall,f1` rows.
pub fn write_summary(metrics: &[ThresholdMetrics], path: &Path) -> Result<(), RunnerError> {
    let mut writer = csv::Writer::from_path(path).map_err(TableError::from)?;
    writer
        .write_record(["threshold", "tp", "fp", "tn", "fn", "precision", "recall", "f1"])
        .map_err(TableError::from)?;
    for m in metrics {
        writer
            .write_record([
                m.threshold.to_string(),
                m.counts.tp.to_string(),
                m.counts.fp.to_string(),
                m.counts.tn.to_string(),
                m.counts.fn_.to_string(),
                m.precision.to_string(),
                m.recall.to_string(),
                m.f1.to_string(),
            ])
            .map_err(TableError::from)?;
    }
    writer.flush().map_err(|e| RunnerError::io(path, e))?;
    Ok(())
}
