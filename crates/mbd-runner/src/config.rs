//! Batch run configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use mbd_core::DetectorKind;

use crate::error::RunnerError;

/// Settings for one batch run, loadable from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Directory holding the input tables.
    pub source: PathBuf,
    /// Directory receiving the annotated tables.
    pub destination: PathBuf,
    /// Detectors applied to every file, in order.
    pub detectors: Vec<DetectorKind>,
    /// Worker threads (0 = available parallelism).
    pub workers: usize,
    /// Run prefix placed between the detector prefix and the file index.
    pub prefix: String,
    /// Output file extension, without the dot.
    pub extension: String,
    pub delimiter: char,
    /// Only process files whose index is listed here.
    pub indices: Option<BTreeSet<u32>>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from("."),
            destination: PathBuf::from("results"),
            detectors: Vec::new(),
            workers: 0,
            prefix: "result".to_string(),
            extension: "csv".to_string(),
            delimiter: ',',
            indices: None,
        }
    }
}

impl RunnerConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RunnerError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| RunnerError::io(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn validate(&self) -> Result<(), RunnerError> {
        if self.detectors.is_empty() {
            return Err(RunnerError::Invalid("no detectors configured".into()));
        }
        // Output names are parsed back with "first digit run is the index".
        if self.prefix.chars().any(|c| c.is_ascii_digit()) {
            return Err(RunnerError::Invalid(format!(
                "run prefix '{}' must not contain digits",
                self.prefix
            )));
        }
        if self.extension.trim_start_matches('.').is_empty() {
            return Err(RunnerError::Invalid("empty output extension".into()));
        }
        self.delimiter_byte()?;
        Ok(())
    }

    /// Delimiter as the single byte the csv reader expects.
    pub fn delimiter_byte(&self) -> Result<u8, RunnerError> {
        u8::try_from(self.delimiter)
            .ok()
            .filter(|b| b.is_ascii() && *b != b'"' && *b != b'\n')
            .ok_or_else(|| {
                RunnerError::Invalid(format!("unsupported delimiter {:?}", self.delimiter))
            })
    }

    pub fn extension(&self) -> &str {
        self.extension.trim_start_matches('.')
    }

    pub fn admits(&self, index: u32) -> bool {
        self.indices.as_ref().is_none_or(|set| set.contains(&index))
    }

    /// Threads to start for `pending` files.
    pub fn worker_count(&self, pending: usize) -> usize {
        let wanted = if self.workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(8)
        } else {
            self.workers
        };
        wanted.min(pending).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mbd_core::{AcceptanceRange, ThresholdSet};

    fn art() -> DetectorKind {
        AcceptanceRange::new(ThresholdSet::new(vec![100.0]).unwrap()).into()
    }

    #[test]
    fn test_defaults() {
        let config = RunnerConfig::default();
        assert_eq!(config.prefix, "result");
        assert_eq!(config.extension(), "csv");
        assert_eq!(config.delimiter_byte().unwrap(), b',');
        assert!(config.admits(224));
    }

    #[test]
    fn test_json_config() {
        let json = r#"{
            "source": "data",
            "destination": "out",
            "workers": 2,
            "indices": [3, 5],
            "detectors": [{"kind": "acceptance_range", "thresholds": [100, 200]}]
        }"#;
        let config: RunnerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.source, PathBuf::from("data"));
        assert_eq!(config.prefix, "result");
        assert_eq!(config.detectors.len(), 1);
        assert!(config.admits(5));
        assert!(!config.admits(4));
        config.validate().unwrap();
    }

    #[test]
    fn test_validation() {
        let mut config = RunnerConfig::default();
        assert!(config.validate().is_err());

        config.detectors.push(art());
        config.validate().unwrap();

        config.prefix = "run2".into();
        assert!(config.validate().is_err());
        config.prefix = "run".into();

        config.delimiter = 'é';
        assert!(config.validate().is_err());
        config.delimiter = ';';
        config.validate().unwrap();

        config.extension = ".".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_worker_count_bounded_by_pending() {
        let config = RunnerConfig {
            workers: 8,
            ..Default::default()
        };
        assert_eq!(config.worker_count(3), 3);
        assert_eq!(config.worker_count(20), 8);
        assert_eq!(config.worker_count(0), 1);

        let auto = RunnerConfig::default();
        assert!(auto.worker_count(1000) >= 1);
    }
}
