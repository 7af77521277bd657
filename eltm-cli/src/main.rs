//! eltm command-line interface.
//!
//! Decodes telemetry text files to L1 datasets, reduces them to L2 and
//! reports per-bitstring status.
#![allow(clippy::uninlined_format_args, clippy::too_many_lines)]

use clap::{Args, Parser, Subcommand, ValueEnum};

use eltm_core::{Dataset, GlobalAttributes};
use eltm_io::{Hdf5WriteOptions, TelemetryFileReader};
use eltm_l1::{BatchReport, DecoderConfig, IndexPolicy, LayoutVersion, SyntheticGenerator};
use eltm_l2::L2Aggregator;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    EltmIo(#[from] eltm_io::Error),

    #[error("decode error: {0}")]
    Decode(#[from] eltm_l1::Error),

    #[error("cannot infer file format of {0}; pass --format")]
    UnknownFormat(PathBuf),

    #[error("{format:?} is not supported for {role}")]
    UnsupportedFormat { format: Format, role: &'static str },

    #[error("{failed} bitstring(s) failed (splitting stopped early: {split_error})")]
    Incomplete { failed: usize, split_error: bool },
}

/// Wire layout selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Layout {
    /// Byte-aligned big-endian layout with IEEE-754 floats
    V1,
    /// Fixed-point layout with packed bit widths
    V2,
}

impl From<Layout> for LayoutVersion {
    fn from(layout: Layout) -> Self {
        match layout {
            Layout::V1 => LayoutVersion::V1,
            Layout::V2 => LayoutVersion::V2,
        }
    }
}

/// Declared block index rule.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Policy {
    /// Indices must be 1, 2, 3, ...
    Consecutive,
    /// Indices must increase; gaps are allowed
    Increasing,
}

impl From<Policy> for IndexPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Consecutive => IndexPolicy::Consecutive,
            Policy::Increasing => IndexPolicy::Increasing,
        }
    }
}

/// Dataset file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Hdf5,
    Csv,
}

impl Format {
    fn resolve(explicit: Option<Format>, path: &Path) -> Result<Self> {
        if let Some(format) = explicit {
            return Ok(format);
        }
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => Ok(Format::Json),
            Some("h5" | "hdf5" | "he5") => Ok(Format::Hdf5),
            Some("csv") => Ok(Format::Csv),
            _ => Err(CliError::UnknownFormat(path.to_path_buf())),
        }
    }
}

/// Electron spectrometer telemetry processor.
#[derive(Parser)]
#[command(name = "eltm")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Decoder options shared by commands that read telemetry text.
#[derive(Args)]
struct DecodeArgs {
    /// JSON decoder configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Wire layout (overrides the configuration file)
    #[arg(short, long, value_enum)]
    layout: Option<Layout>,

    /// Declared index rule (overrides the configuration file)
    #[arg(long, value_enum)]
    index_policy: Option<Policy>,

    /// Decode bitstrings sequentially
    #[arg(long)]
    sequential: bool,

    /// Global attribute KEY=VALUE (repeatable, overrides the configuration file)
    #[arg(short = 'a', long = "attr", value_parser = parse_key_val)]
    attributes: Vec<(String, String)>,
}

impl DecodeArgs {
    fn config(&self) -> Result<DecoderConfig> {
        let mut config = match &self.config {
            Some(path) => DecoderConfig::from_file(path)?,
            None => DecoderConfig::default(),
        };
        if let Some(layout) = self.layout {
            config = config.with_layout(layout.into());
        }
        if let Some(policy) = self.index_policy {
            config = config.with_index_policy(policy.into());
        }
        if self.sequential {
            config = config.with_parallel(false);
        }
        for (key, value) in &self.attributes {
            config.global_attributes.insert(key.clone(), value.clone());
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a telemetry text file to L1 datasets
    Parse {
        /// Input telemetry text file
        input: PathBuf,

        /// Output file path (.json or .h5)
        #[arg(short, long)]
        output: PathBuf,

        /// Output format (inferred from the extension when omitted)
        #[arg(short, long, value_enum)]
        format: Option<Format>,

        /// Store HDF5 datasets uncompressed
        #[arg(long)]
        no_compression: bool,

        #[command(flatten)]
        decode: DecodeArgs,
    },

    /// Reduce L1 datasets to L2 records
    L2 {
        /// Input L1 file (.json or .h5)
        input: PathBuf,

        /// Output file path (.json, .h5 or .csv)
        #[arg(short, long)]
        output: PathBuf,

        /// Output format (inferred from the extension when omitted)
        #[arg(short, long, value_enum)]
        format: Option<Format>,

        /// Aggregate datasets sequentially
        #[arg(long)]
        sequential: bool,

        /// Store HDF5 datasets uncompressed
        #[arg(long)]
        no_compression: bool,
    },

    /// Show the blocks of a telemetry file and their decode status
    Info {
        /// Input telemetry text file
        input: PathBuf,

        #[command(flatten)]
        decode: DecodeArgs,
    },

    /// Write a synthetic telemetry text file
    Generate {
        /// Output file path
        output: PathBuf,

        /// Number of bitstrings
        #[arg(short = 'n', long, default_value = "3")]
        count: u32,

        /// Random seed
        #[arg(short, long, default_value = "0")]
        seed: u64,

        /// Wire layout
        #[arg(short, long, value_enum, default_value = "v1")]
        layout: Layout,
    },
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {s:?}"))?;
    if key.is_empty() {
        return Err(format!("empty attribute name in {s:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn write_options(no_compression: bool) -> Hdf5WriteOptions {
    if no_compression {
        Hdf5WriteOptions::uncompressed()
    } else {
        Hdf5WriteOptions::default()
    }
}

fn add_provenance(config: &mut DecoderConfig) {
    let attrs = &mut config.global_attributes;
    attrs.insert_if_absent(
        "Generation_date",
        chrono::Utc::now().format("%Y%m%d").to_string(),
    );
    attrs.insert_if_absent(
        "Software_version",
        concat!("eltm ", env!("CARGO_PKG_VERSION")),
    );
}

fn report_failures(report: &BatchReport) -> Result<()> {
    for failure in report.failures() {
        if let Err(e) = &failure.result {
            log::error!(
                "bitstring {} (line {}) failed [{}]: {}",
                failure.index,
                failure.line,
                e.kind(),
                e
            );
        }
    }
    if let Some(e) = &report.split_error {
        log::error!("input splitting stopped [{}]: {}", e.kind(), e);
    }
    if report.is_complete() {
        Ok(())
    } else {
        Err(CliError::Incomplete {
            failed: report.failed(),
            split_error: report.split_error.is_some(),
        })
    }
}

fn read_l1(path: &Path) -> Result<Vec<Dataset>> {
    match Format::resolve(None, path)? {
        Format::Json => Ok(eltm_io::read_l1_json(path)?),
        Format::Hdf5 => Ok(eltm_io::read_l1_hdf5(path)?),
        format @ Format::Csv => Err(CliError::UnsupportedFormat {
            format,
            role: "L1 input",
        }),
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Parse {
            input,
            output,
            format,
            no_compression,
            decode,
        } => {
            let format = Format::resolve(format, &output)?;
            if format == Format::Csv {
                return Err(CliError::UnsupportedFormat {
                    format,
                    role: "L1 output",
                });
            }
            let mut config = decode.config()?;
            add_provenance(&mut config);

            let start = Instant::now();
            let report = eltm_io::decode_file(&input, config)?;
            let failed = report_failures(&report);
            let anomalies: usize = report.datasets().map(|d| d.anomalies.len()).sum();
            let datasets = report.into_datasets();

            if format == Format::Json {
                eltm_io::write_l1_json(&output, &datasets)?;
            } else {
                eltm_io::write_l1_hdf5(&output, &datasets, &write_options(no_compression))?;
            }

            println!(
                "Decoded {} bitstring(s) from {} in {:.2}s",
                datasets.len(),
                input.display(),
                start.elapsed().as_secs_f64()
            );
            println!("Range anomalies: {}", anomalies);
            println!("Output: {}", output.display());
            failed
        }

        Commands::L2 {
            input,
            output,
            format,
            sequential,
            no_compression,
        } => {
            let format = Format::resolve(format, &output)?;
            let datasets = read_l1(&input)?;

            let aggregator = L2Aggregator::new().with_parallel(!sequential);
            let mut records = Vec::with_capacity(datasets.len());
            let mut failed = 0usize;
            for (dataset, result) in datasets.iter().zip(aggregator.aggregate_all(&datasets)) {
                match result {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        failed += 1;
                        log::error!(
                            "bitstring {} could not be reduced [{}]: {}",
                            dataset.index,
                            e.kind(),
                            e
                        );
                    }
                }
            }

            match format {
                Format::Json => eltm_io::write_l2_json(&output, &records)?,
                Format::Csv => eltm_io::write_l2_csv(&output, &records)?,
                Format::Hdf5 => {
                    let attributes = datasets
                        .first()
                        .map(|d| d.global_attributes.clone())
                        .unwrap_or_else(GlobalAttributes::new);
                    eltm_io::write_l2_hdf5(
                        &output,
                        &records,
                        &attributes,
                        &write_options(no_compression),
                    )?;
                }
            }

            println!("Reduced {} of {} dataset(s)", records.len(), datasets.len());
            println!("Output: {}", output.display());
            if failed > 0 {
                return Err(CliError::Incomplete {
                    failed,
                    split_error: false,
                });
            }
            Ok(())
        }

        Commands::Info { input, decode } => {
            let reader = TelemetryFileReader::open_with_config(&input, decode.config()?)?;
            let layout = reader.config().layout.layout();

            println!("File: {}", input.display());
            println!(
                "Layout: {} ({} bytes per record)",
                reader.config().layout,
                layout.total_bytes()
            );

            let report = reader.decode()?;
            println!("{:<10} | {:<6} | {:<18} | detail", "Bitstring", "Line", "Status");
            println!("{:-<60}", "");
            for outcome in &report.outcomes {
                match &outcome.result {
                    Ok(dataset) => println!(
                        "{:<10} | {:<6} | {:<18} | {} anomalies, {} flagged samples",
                        outcome.index,
                        outcome.line,
                        "ok",
                        dataset.anomalies.len(),
                        dataset.flagged_samples()
                    ),
                    Err(e) => println!(
                        "{:<10} | {:<6} | {:<18} | {}",
                        outcome.index,
                        outcome.line,
                        e.kind().as_str(),
                        e
                    ),
                }
            }
            if let Some(e) = &report.split_error {
                println!("Splitting stopped: {}", e);
            }
            println!("Succeeded: {}, failed: {}", report.succeeded(), report.failed());
            report_failures(&report)
        }

        Commands::Generate {
            output,
            count,
            seed,
            layout,
        } => {
            let text = SyntheticGenerator::new(seed).text(count, layout.into())?;
            std::fs::write(&output, text)?;
            println!("Wrote {} synthetic bitstring(s) to {}", count, output.display());
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
