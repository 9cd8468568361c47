//! Command-line parsing for the external-product noise correction tool.
//!
//! Arguments are parsed here and turned into plain config structs in `app`;
//! nothing below this module sees clap types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{DEFAULT_SATURATION_THRESHOLD, DetectorKind};
use crate::sampling::DEFAULT_SAMPLER_COMMAND;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "extprod",
    version,
    about = "Sample external-product noise and fit its correction coefficients"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the sampler in parallel chunks, then fit the correction.
    Run(RunArgs),
    /// Fit the correction from an existing corpus file.
    Analyze(AnalyzeArgs),
    /// Write a synthetic corpus from known coefficients.
    Synth(SynthArgs),
}

/// Options shared by every command that fits.
#[derive(Debug, Args, Clone)]
pub struct AnalysisArgs {
    /// Output file for the coefficients.
    #[arg(short = 'o', long = "output-file", default_value = "correction_coefficients.json")]
    pub output_file: PathBuf,

    /// Drop rows whose observed variance is at or above this (torus domain).
    #[arg(long, default_value_t = DEFAULT_SATURATION_THRESHOLD)]
    pub saturation_threshold: f64,

    /// Fit one model over all rows instead of one per GLWE dimension.
    #[arg(long)]
    pub no_stratify: bool,

    /// Outlier detector.
    #[arg(long, value_enum, default_value_t = DetectorKind::IsolationForest)]
    pub detector: DetectorKind,

    /// Expected outlier fraction for the isolation forest.
    #[arg(long, default_value_t = 0.2)]
    pub contamination: f64,

    /// Threshold for the z-score detector.
    #[arg(long, default_value_t = 3.0)]
    pub z_threshold: f64,

    /// Random seed for the isolation forest.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Initial guess for `a`.
    #[arg(long, default_value_t = 1.0)]
    pub initial_a: f64,

    /// Initial guess for `d`.
    #[arg(long, default_value_t = 1.0)]
    pub initial_d: f64,

    /// Levenberg-Marquardt iteration budget.
    #[arg(long, default_value_t = 600)]
    pub max_iterations: usize,

    /// Export per-row diagnostics to CSV.
    #[arg(long)]
    pub export_rows: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    /// Number of parallel sampling chunks.
    pub chunks: usize,

    /// Glob pattern of the per-chunk result files.
    #[arg(short = 'f', long = "file-pattern", default_value = "*.acquisition_external_product*")]
    pub file_pattern: String,

    /// Skip sampling and analyse existing result files.
    #[arg(short = 'A', long = "analysis-only")]
    pub analysis_only: bool,

    /// Sampler command; `--tot <chunks> --id <i>` is appended per chunk.
    #[arg(long, env = "EXTPROD_SAMPLER_CMD", default_value = DEFAULT_SAMPLER_COMMAND)]
    pub sampler_cmd: String,

    /// Where the merged corpus is written.
    #[arg(long, default_value = "concatenated_sampling_results")]
    pub concatenated: PathBuf,

    #[command(flatten)]
    pub analysis: AnalysisArgs,

    /// Extra arguments forwarded to every sampler process (after `--`).
    #[arg(last = true)]
    pub sampler_args: Vec<String>,
}

#[derive(Debug, Args, Clone)]
pub struct AnalyzeArgs {
    /// Corpus file in the sampler's line format.
    pub corpus: PathBuf,

    #[command(flatten)]
    pub analysis: AnalysisArgs,
}

#[derive(Debug, Args, Clone)]
pub struct SynthArgs {
    /// Where to write the corpus.
    #[arg(short = 'o', long, default_value = "synthetic.acquisition_external_product")]
    pub output: PathBuf,

    /// True `a`.
    #[arg(long, default_value_t = 10.0)]
    pub a: f64,

    /// True `d`.
    #[arg(long, default_value_t = 2.0)]
    pub d: f64,

    /// GLWE dimensions to generate.
    #[arg(short = 'k', long, value_delimiter = ',', default_values_t = vec![1usize, 2, 3])]
    pub glwe_dimensions: Vec<usize>,

    /// Rows per GLWE dimension.
    #[arg(short = 'n', long, default_value_t = 200)]
    pub samples_per_k: usize,

    /// Relative noise on the observed variance.
    #[arg(long, default_value_t = 0.05)]
    pub noise: f64,

    /// Bits by which the theoretical variance under-estimates the correction.
    #[arg(long, default_value_t = 2.0)]
    pub gap_bits: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}
