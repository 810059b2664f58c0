//! mbd-runner - misbehavior detection over VeReMi-style message logs
//!
//! Usage:
//!   mbd-runner run --source data --destination out --art 100,200 --ssc 5,10
//!   mbd-runner run --config run.json --scenario attack1-low-high
//!   mbd-runner evaluate --dir out --detector art --thresholds 100,200
//!   mbd-runner scenarios

use clap::{Parser, Subcommand};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{Level, error, info};

use mbd_core::dataset::Scenario;
use mbd_core::{
    AcceptanceRange, Detector, DetectorId, MovementVerifier, SpeedConsistency, ThresholdSet,
};
use mbd_runner::{
    BatchRunner, PerformanceAggregator, RunnerConfig, RunnerError, parse_index_list, write_summary,
};

#[derive(Parser)]
#[command(name = "mbd-runner")]
#[command(about = "Batch misbehavior detection and evaluation for V2X message logs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run detectors over every pending file of a directory
    Run {
        /// JSON run configuration; flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long)]
        source: Option<PathBuf>,

        #[arg(long)]
        destination: Option<PathBuf>,

        /// Acceptance range thresholds (metres)
        #[arg(long, value_delimiter = ',')]
        art: Vec<f64>,

        /// Distance moved thresholds (metres)
        #[arg(long, value_delimiter = ',')]
        dmv: Vec<f64>,

        /// Distance moved look-back window (time units)
        #[arg(long)]
        dmv_window: Option<f64>,

        /// Speed consistency thresholds, hard decision
        #[arg(long, value_delimiter = ',')]
        ssc: Vec<f64>,

        /// Speed consistency thresholds, opinion-graded decision
        #[arg(long, value_delimiter = ',')]
        ssc_graded: Vec<f64>,

        /// Worker threads (0 = all cores)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Run prefix in output names
        #[arg(long)]
        prefix: Option<String>,

        /// Output file extension
        #[arg(long)]
        ext: Option<String>,

        #[arg(long)]
        delimiter: Option<char>,

        /// Allow-list of file indices, e.g. 10-14,40
        #[arg(long)]
        indices: Option<String>,

        /// Limit to a dataset scenario, e.g. attack1-low-high (repeatable)
        #[arg(long)]
        scenario: Vec<Scenario>,
    },

    /// Summarise precision and recall of a detector's results
    Evaluate {
        /// Directory holding the annotated results
        #[arg(short, long)]
        dir: PathBuf,

        /// Detector tag: art, dmv or ssc
        #[arg(long)]
        detector: String,

        #[arg(long, value_delimiter = ',', required = true)]
        thresholds: Vec<f64>,

        /// Result file suffix, e.g. -subj for graded speed checks
        #[arg(long, default_value = "", allow_hyphen_values = true)]
        suffix: String,

        #[arg(long)]
        indices: Option<String>,

        #[arg(long)]
        scenario: Vec<Scenario>,

        /// Summary CSV; printed as JSON when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the dataset scenarios and their file indices
    Scenarios,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match execute(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "mbd-runner failed");
            ExitCode::FAILURE
        }
    }
}

fn execute(command: Commands) -> Result<(), RunnerError> {
    match command {
        Commands::Run {
            config,
            source,
            destination,
            art,
            dmv,
            dmv_window,
            ssc,
            ssc_graded,
            workers,
            prefix,
            ext,
            delimiter,
            indices,
            scenario,
        } => {
            let mut cfg = match config {
                Some(path) => RunnerConfig::from_json_file(path)?,
                None => RunnerConfig::default(),
            };
            if let Some(source) = source {
                cfg.source = source;
            }
            if let Some(destination) = destination {
                cfg.destination = destination;
            }
            if let Some(workers) = workers {
                cfg.workers = workers;
            }
            if let Some(prefix) = prefix {
                cfg.prefix = prefix;
            }
            if let Some(ext) = ext {
                cfg.extension = ext;
            }
            if let Some(delimiter) = delimiter {
                cfg.delimiter = delimiter;
            }
            if !art.is_empty() {
                cfg.detectors
                    .push(AcceptanceRange::new(ThresholdSet::new(art)?).into());
            }
            if !dmv.is_empty() {
                let mut d = MovementVerifier::new(ThresholdSet::new(dmv)?);
                if let Some(window) = dmv_window {
                    d = d.with_time_window(window);
                }
                cfg.detectors.push(d.into());
            }
            if !ssc.is_empty() {
                cfg.detectors
                    .push(SpeedConsistency::hard(ThresholdSet::new(ssc)?).into());
            }
            if !ssc_graded.is_empty() {
                cfg.detectors
                    .push(SpeedConsistency::graded(ThresholdSet::new(ssc_graded)?).into());
            }
            if let Some(allow) = index_filter(indices.as_deref(), &scenario)? {
                cfg.indices = Some(match cfg.indices.take() {
                    Some(existing) => existing.intersection(&allow).copied().collect(),
                    None => allow,
                });
            }
            run(cfg)
        }
        Commands::Evaluate {
            dir,
            detector,
            thresholds,
            suffix,
            indices,
            scenario,
            output,
        } => {
            let id = DetectorId::from_tag(&detector).ok_or_else(|| {
                RunnerError::Invalid(format!(
                    "unknown detector '{}', expected art, dmv or ssc",
                    detector
                ))
            })?;
            let mut aggregator =
                PerformanceAggregator::new(id, ThresholdSet::new(thresholds)?).with_suffix(suffix);
            if let Some(allow) = index_filter(indices.as_deref(), &scenario)? {
                aggregator = aggregator.with_indices(allow);
            }
            let metrics = aggregator.aggregate_dir(&dir)?;
            match output {
                Some(path) => {
                    write_summary(&metrics, &path)?;
                    info!(output = %path.display(), "summary written");
                }
                None => println!("{}", serde_json::to_string_pretty(&metrics)?),
            }
            Ok(())
        }
        Commands::Scenarios => {
            list_scenarios();
            Ok(())
        }
    }
}

fn run(config: RunnerConfig) -> Result<(), RunnerError> {
    let detectors: Vec<&str> = config.detectors.iter().map(|d| d.id().tag()).collect();
    info!(detectors = ?detectors, "configured");

    let runner = BatchRunner::new(config)?;
    let summary = runner.run()?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Union of an index list and scenario ranges; `None` when neither is given.
fn index_filter(
    indices: Option<&str>,
    scenarios: &[Scenario],
) -> Result<Option<BTreeSet<u32>>, RunnerError> {
    if indices.is_none() && scenarios.is_empty() {
        return Ok(None);
    }
    let mut allow = match indices {
        Some(list) => parse_index_list(list)?,
        None => BTreeSet::new(),
    };
    for scenario in scenarios {
        allow.extend(scenario.indices());
    }
    Ok(Some(allow))
}

fn list_scenarios() {
    println!("Dataset scenarios:\n");
    println!("  {:<24} {:<20} {}", "scenario", "attack", "indices");
    for scenario in Scenario::all() {
        let range = scenario.indices();
        println!(
            "  {:<24} {:<20} {}-{}",
            scenario.to_string(),
            scenario.attack.description(),
            range.start,
            range.end - 1
        );
    }
    println!("\nDetectors:");
    for id in DetectorId::ALL {
        println!("  {:<4} {:<28} output prefix {}", id.tag(), id.name(), id.prefix());
    }
}
