//! cadence - batch tempo/key analysis from the command line
//!
//! ```bash
//! cadence analyze loops/*.wav > features.jsonl
//! cadence analyze --sample-type one-shot hits/*.wav
//! cadence accuracy corpus/labels.csv
//! ```
//!
//! Set RUST_LOG=debug for verbose output.

use anyhow::{Context, Result};
use cadence_core::accuracy::{parse_labels, AccuracyReport, Outcome, DEFAULT_TOLERANCE_BPM};
use cadence_core::config::{default_config_path, load_config, save_config};
use cadence_core::{AnalysisEngine, EngineConfig, SampleType};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "cadence", version, about = "Tempo, key and spectral analysis for audio samples")]
struct Cli {
    /// Config file (default: <config dir>/cadence/config.yaml)
    #[arg(long, global = true, value_name = "FILE", env = "CADENCE_CONFIG")]
    config: Option<PathBuf>,

    /// Worker threads (default: available CPU threads - 1)
    #[arg(long, short, global = true)]
    jobs: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze files and print one JSON record per line
    Analyze {
        /// Treat every file as this sample type instead of classifying it
        #[arg(long, value_name = "loop|one-shot")]
        sample_type: Option<SampleType>,

        /// Print the correction statistics report to stderr when done
        #[arg(long)]
        stats: bool,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Measure tempo accuracy against a `path,bpm` label file
    Accuracy {
        labels: PathBuf,

        /// Allowed deviation in BPM
        #[arg(long, default_value_t = DEFAULT_TOLERANCE_BPM)]
        tolerance: f64,

        /// List every sample that wasn't correct
        #[arg(long)]
        verbose: bool,
    },

    /// Show the effective configuration
    Config {
        /// Write it to the config file
        #[arg(long)]
        write: bool,
    },
}

fn main() -> Result<()> {
    #[cfg(feature = "essentia")]
    procspawn::init();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = load_config(&config_path).with_env_overrides(|key| std::env::var(key).ok());

    match cli.command {
        Command::Analyze {
            sample_type,
            stats,
            files,
        } => {
            let engine = AnalysisEngine::new(config);
            with_pool(cli.jobs, || analyze(&engine, &files, sample_type, stats))
        }
        Command::Accuracy {
            labels,
            tolerance,
            verbose,
        } => {
            let engine = AnalysisEngine::new(config);
            with_pool(cli.jobs, || accuracy(&engine, &labels, tolerance, verbose))
        }
        Command::Config { write } => show_config(&config, &config_path, write),
    }
}

fn with_pool<T: Send>(jobs: Option<usize>, f: impl FnOnce() -> Result<T> + Send) -> Result<T> {
    let threads = jobs.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1).max(1))
            .unwrap_or(1)
    });
    log::info!("Using {} worker threads", threads);

    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("cadence-worker-{}", i))
        .build()
        .context("Failed to build thread pool")?
        .install(f)
}

fn analyze(engine: &AnalysisEngine, files: &[PathBuf], hint: Option<SampleType>, show_stats: bool) -> Result<()> {
    let start = Instant::now();
    let stdout = std::io::stdout();

    let failures: usize = files
        .par_iter()
        .map(|path| match engine.analyze(path, hint) {
            Ok(record) => {
                let line = serde_json::to_string(&record)
                    .with_context(|| format!("Failed to serialize record for {}", path.display()));
                match line {
                    Ok(line) => {
                        let mut out = stdout.lock();
                        if let Err(e) = writeln!(out, "{}", line) {
                            log::error!("analyze: failed to write output: {}", e);
                            return 1;
                        }
                        0
                    }
                    Err(e) => {
                        log::error!("analyze: {:#}", e);
                        1
                    }
                }
            }
            Err(e) => {
                log::error!("analyze: {}", e);
                1
            }
        })
        .sum();

    log::info!(
        "Analyzed {} files in {:.1}s ({} failed)",
        files.len(),
        start.elapsed().as_secs_f64(),
        failures
    );

    if show_stats {
        eprint!("{}", engine.statistics_snapshot());
    }

    if failures == files.len() && !files.is_empty() {
        anyhow::bail!("every file failed to analyze");
    }
    Ok(())
}

fn accuracy(engine: &AnalysisEngine, labels_path: &Path, tolerance: f64, verbose: bool) -> Result<()> {
    let text = std::fs::read_to_string(labels_path)
        .with_context(|| format!("Failed to read label file {:?}", labels_path))?;
    let base_dir = labels_path.parent().unwrap_or_else(|| Path::new("."));
    let samples = parse_labels(&text, base_dir).with_context(|| format!("Invalid label file {:?}", labels_path))?;

    log::info!("Auditing {} labeled samples", samples.len());

    let results: Vec<_> = samples
        .par_iter()
        .map(|sample| engine.analyze(&sample.path, None))
        .collect();

    let mut report = AccuracyReport::new(tolerance);
    for (sample, result) in samples.iter().zip(&results) {
        let outcome = report.add(sample, result);
        if verbose && outcome != Outcome::Correct {
            let detected = result.as_ref().ok().and_then(|r| r.tempo_bpm);
            println!(
                "{:?}\t{}\texpected {:.1}\tgot {:?}",
                outcome,
                sample.path.display(),
                sample.expected_bpm,
                detected
            );
        }
    }

    print!("{}", report);
    print!("{}", engine.statistics_snapshot());
    Ok(())
}

fn show_config(config: &EngineConfig, path: &Path, write: bool) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
    println!("# {}", path.display());
    print!("{}", yaml);

    if write {
        save_config(config, path)?;
        log::info!("Wrote config to {:?}", path);
    }
    Ok(())
}
