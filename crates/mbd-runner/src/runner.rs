//! Resumable, parallel batch execution.
//!
//! A run scans the destination for indices that already have output, queues
//! the remaining source files, and lets a fixed pool of worker threads apply
//! every configured detector to each file. Failures stay local to the file
//! (or the file/detector pair) that caused them.

use crossbeam_channel::{Receiver, bounded};
use serde::Serialize;
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use mbd_core::{Detector, DetectorOutput, DetectorResult, ObservationTable};

use crate::config::RunnerConfig;
use crate::error::RunnerError;
use crate::index::file_index;

/// Source file queued for processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    pub path: PathBuf,
    pub index: u32,
}

/// Per-file stage, reported when a file or detector fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Loading,
    Detecting,
    Writing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Loading => "loading",
            Self::Detecting => "detecting",
            Self::Writing => "writing",
        })
    }
}

/// Counters shared by all workers of one run.
#[derive(Debug, Default)]
pub struct RunStats {
    files_processed: AtomicU64,
    files_failed: AtomicU64,
    outputs_written: AtomicU64,
    empty_results: AtomicU64,
    detector_failures: AtomicU64,
}

impl RunStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn files_processed(&self) -> u64 {
        self.files_processed.load(Ordering::Relaxed)
    }

    pub fn files_failed(&self) -> u64 {
        self.files_failed.load(Ordering::Relaxed)
    }

    pub fn outputs_written(&self) -> u64 {
        self.outputs_written.load(Ordering::Relaxed)
    }

    pub fn empty_results(&self) -> u64 {
        self.empty_results.load(Ordering::Relaxed)
    }

    pub fn detector_failures(&self) -> u64 {
        self.detector_failures.load(Ordering::Relaxed)
    }
}

/// What a finished run did.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RunSummary {
    pub started_at: String,
    pub pending: usize,
    pub workers: usize,
    pub files_processed: u64,
    pub files_failed: u64,
    pub outputs_written: u64,
    pub empty_results: u64,
    pub detector_failures: u64,
    pub elapsed_secs: f64,
}

pub struct BatchRunner {
    config: RunnerConfig,
    delimiter: u8,
}

impl BatchRunner {
    /// Validate `config` and make sure the destination directory exists.
    pub fn new(config: RunnerConfig) -> Result<Self, RunnerError> {
        config.validate()?;
        let delimiter = config.delimiter_byte()?;
        std::fs::create_dir_all(&config.destination)
            .map_err(|e| RunnerError::io(&config.destination, e))?;
        Ok(Self { config, delimiter })
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Indices that already have at least one output in the destination.
    pub fn completed_indices(&self) -> Result<BTreeSet<u32>, RunnerError> {
        Ok(list_files(&self.config.destination)?
            .iter()
            .filter_map(|(name, _)| file_index(name))
            .collect())
    }

    /// Source files still to be processed, in name order.
    ///
    /// At most one file is queued per index: the first by name wins, since
    /// every file of an index would write the same outputs.
    pub fn scan(&self) -> Result<Vec<PendingFile>, RunnerError> {
        let done = self.completed_indices()?;
        let mut accepted: BTreeMap<u32, PathBuf> = BTreeMap::new();
        let mut pending = Vec::new();
        for (name, path) in list_files(&self.config.source)? {
            let Some(index) = file_index(&name) else {
                warn!(file = %path.display(), "no index in file name, skipping");
                continue;
            };
            if done.contains(&index) {
                debug!(file = %path.display(), index, "already processed");
                continue;
            }
            if !self.config.admits(index) {
                continue;
            }
            if let Some(first) = accepted.get(&index) {
                warn!(
                    file = %path.display(),
                    index,
                    kept = %first.display(),
                    "index already taken by another source file, skipping"
                );
                continue;
            }
            accepted.insert(index, path.clone());
            pending.push(PendingFile { path, index });
        }
        Ok(pending)
    }

    /// Process every pending file and block until all workers are done.
    pub fn run(&self) -> Result<RunSummary, RunnerError> {
        let started_at = chrono::Local::now();
        let clock = Instant::now();
        let pending = self.scan()?;
        let workers = self.config.worker_count(pending.len());

        info!(
            started = %started_at.format("%Y-%m-%d %H:%M:%S"),
            pending = pending.len(),
            workers,
            source = %self.config.source.display(),
            destination = %self.config.destination.display(),
            "batch run starting"
        );

        let stats = RunStats::default();
        let total = pending.len();
        if total > 0 {
            self.dispatch(pending, workers, &stats)?;
        }

        let summary = RunSummary {
            started_at: started_at.to_rfc3339(),
            pending: total,
            workers,
            files_processed: stats.files_processed(),
            files_failed: stats.files_failed(),
            outputs_written: stats.outputs_written(),
            empty_results: stats.empty_results(),
            detector_failures: stats.detector_failures(),
            elapsed_secs: clock.elapsed().as_secs_f64(),
        };
        info!(
            processed = summary.files_processed,
            failed = summary.files_failed,
            written = summary.outputs_written,
            elapsed_secs = summary.elapsed_secs,
            "batch run finished"
        );
        Ok(summary)
    }

    fn dispatch(
        &self,
        pending: Vec<PendingFile>,
        workers: usize,
        stats: &RunStats,
    ) -> Result<(), RunnerError> {
        let (tx, rx) = bounded::<PendingFile>(workers * 2);

        thread::scope(|scope| {
            for id in 0..workers {
                let rx = rx.clone();
                thread::Builder::new()
                    .name(format!("mbd-worker-{}", id))
                    .spawn_scoped(scope, move || self.work(id, rx, stats))
                    .map_err(|e| RunnerError::io(&self.config.source, e))?;
            }
            drop(rx);

            for file in pending {
                if tx.send(file).is_err() {
                    break;
                }
            }
            drop(tx);
            Ok(())
        })
    }

    fn work(&self, id: usize, rx: Receiver<PendingFile>, stats: &RunStats) {
        debug!(worker = id, "worker started");
        while let Ok(file) = rx.recv() {
            if let Err(panic) = guarded(|| self.process_file(&file, stats)) {
                error!(
                    worker = id,
                    file = %file.path.display(),
                    panic = %panic,
                    "worker panicked, file abandoned"
                );
                RunStats::bump(&stats.files_failed);
            }
        }
        debug!(worker = id, "worker stopped");
    }

    /// Run every detector on one file and write the non-empty results.
    pub fn process_file(&self, file: &PendingFile, stats: &RunStats) {
        let table = match ObservationTable::read_csv(&file.path, self.delimiter) {
            Ok(table) => table,
            Err(e) => {
                error!(
                    file = %file.path.display(),
                    stage = %Stage::Loading,
                    error = %e,
                    "failed to load file"
                );
                RunStats::bump(&stats.files_failed);
                return;
            }
        };
        debug!(file = %file.path.display(), rows = table.len(), "loaded");

        for detector in &self.config.detectors {
            let id = detector.id();
            let output = match run_detector(|| detector.run(table.clone())) {
                Ok(output) => output,
                Err(reason) => {
                    warn!(
                        file = %file.path.display(),
                        detector = %id,
                        stage = %Stage::Detecting,
                        error = %reason,
                        "detector failed"
                    );
                    RunStats::bump(&stats.detector_failures);
                    continue;
                }
            };

            if output.table.is_empty() {
                debug!(file = %file.path.display(), detector = %id, "empty result, nothing written");
                RunStats::bump(&stats.empty_results);
                continue;
            }

            let path = self.output_path(&output, file.index);
            match write_atomic(&output.table, &path, self.delimiter) {
                Ok(()) => {
                    info!(
                        file = %file.path.display(),
                        detector = %id,
                        output = %path.display(),
                        rows = output.table.len(),
                        "result written"
                    );
                    RunStats::bump(&stats.outputs_written);
                }
                Err(e) => {
                    error!(
                        file = %file.path.display(),
                        detector = %id,
                        stage = %Stage::Writing,
                        error = %e,
                        "failed to write result"
                    );
                    RunStats::bump(&stats.detector_failures);
                }
            }
        }
        RunStats::bump(&stats.files_processed);
    }

    /// `{detector prefix}{run prefix}{index:03}{detector suffix}.{ext}`
    pub fn output_path(&self, output: &DetectorOutput, index: u32) -> PathBuf {
        self.config.destination.join(format!(
            "{}{}{:03}{}.{}",
            output.prefix,
            self.config.prefix,
            index,
            output.suffix,
            self.config.extension()
        ))
    }
}

/// Run one detector, turning both errors and panics into a message.
fn run_detector(run: impl FnOnce() -> DetectorResult) -> Result<DetectorOutput, String> {
    match guarded(run) {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(e.to_string()),
        Err(panic) => Err(format!("panic: {}", panic)),
    }
}

/// Call `f`, catching a panic as its message.
fn guarded<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(&*payload))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Non-hidden regular files of `dir`, sorted by name.
fn list_files(dir: &Path) -> Result<Vec<(String, PathBuf)>, RunnerError> {
    let entries = std::fs::read_dir(dir).map_err(|e| RunnerError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| RunnerError::io(dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if is_file {
            files.push((name, entry.path()));
        }
    }
    files.sort();
    Ok(files)
}

/// Write through a hidden temp file in the target directory, then rename.
///
/// A crash mid-write leaves only a hidden `.partial` file, which the
/// destination scan ignores, so the index is retried on the next run.
fn write_atomic(table: &ObservationTable, path: &Path, delimiter: u8) -> Result<(), RunnerError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix(".mbd-")
        .suffix(".partial")
        .tempfile_in(dir)
        .map_err(|e| RunnerError::io(dir, e))?;
    table.to_writer(&mut tmp, delimiter)?;
    tmp.persist(path)
        .map_err(|e| RunnerError::io(path, e.error))?;
    Ok(())
}
