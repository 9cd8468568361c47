//! Top-level application orchestration.
//!
//! `src/main.rs` only initialises logging and maps errors to exit codes; this
//! module is the "real main" that:
//! - loads `.env` and parses CLI arguments
//! - turns arguments into config structs
//! - runs the pipeline and prints the summary

use std::path::Path;

use clap::Parser;

use crate::cli::{AnalysisArgs, AnalyzeArgs, Command, RunArgs, SynthArgs};
use crate::data::synthetic::{SynthConfig, generate_records, write_corpus};
use crate::domain::{AnalysisConfig, Coefficients, FitConfig, OutlierConfig, RunConfig, SamplingConfig};
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `extprod` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Analyze(args) => handle_analyze(args),
        Command::Synth(args) => handle_synth(args),
    }
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    let config = run_config_from_args(&args)?;
    let run = pipeline::run_full(&config, Path::new("."))?;

    println!("{}", crate::report::format_run_summary(&run));
    if !run.persistence_errors.is_empty() {
        print!("{}", crate::report::format_model(&run.analysis.selection.model));
    }
    Ok(())
}

fn handle_analyze(args: AnalyzeArgs) -> Result<(), AppError> {
    let config = analysis_config_from_args(&args.analysis)?;
    let corpus = crate::io::ingest::load_corpus(&args.corpus)?;
    let analysis = pipeline::run_analysis(&corpus, &config)?;
    let errors = pipeline::persist(
        &analysis,
        &args.analysis.output_file,
        args.analysis.export_rows.as_deref(),
    );

    println!("{}", crate::report::format_analysis_summary(&analysis));
    if !errors.is_empty() {
        for err in &errors {
            println!("WARNING: {err}");
        }
        print!("{}", crate::report::format_model(&analysis.selection.model));
    }
    Ok(())
}

fn handle_synth(args: SynthArgs) -> Result<(), AppError> {
    let config = SynthConfig {
        truth: Coefficients { a: args.a, d: args.d },
        glwe_dimensions: args.glwe_dimensions,
        samples_per_k: args.samples_per_k,
        noise: args.noise,
        theoretical_gap_bits: args.gap_bits,
        seed: args.seed,
    };
    let records = generate_records(&config)?;
    write_corpus(&args.output, &records)?;
    println!("Wrote {} synthetic record(s) to {}", records.len(), args.output.display());
    Ok(())
}

pub fn analysis_config_from_args(args: &AnalysisArgs) -> Result<AnalysisConfig, AppError> {
    if !(args.saturation_threshold.is_finite() && args.saturation_threshold > 0.0) {
        return Err(AppError::new(2, "--saturation-threshold must be finite and > 0."));
    }
    if !(args.contamination > 0.0 && args.contamination <= 0.5) {
        return Err(AppError::new(2, "--contamination must be in (0, 0.5]."));
    }
    if !(args.initial_a.is_finite() && args.initial_d.is_finite()) {
        return Err(AppError::new(2, "Initial guess must be finite."));
    }
    if args.max_iterations == 0 {
        return Err(AppError::new(2, "--max-iterations must be > 0."));
    }

    Ok(AnalysisConfig {
        saturation_threshold: args.saturation_threshold,
        stratify: !args.no_stratify,
        outliers: OutlierConfig {
            detector: args.detector,
            contamination: args.contamination,
            z_threshold: args.z_threshold,
            seed: args.seed,
        },
        fit: FitConfig {
            initial_guess: Coefficients {
                a: args.initial_a,
                d: args.initial_d,
            },
            max_iterations: args.max_iterations,
        },
    })
}

pub fn run_config_from_args(args: &RunArgs) -> Result<RunConfig, AppError> {
    if args.chunks == 0 {
        return Err(AppError::new(2, "Number of chunks must be > 0."));
    }

    Ok(RunConfig {
        sampling: SamplingConfig {
            chunks: args.chunks,
            command: args.sampler_cmd.clone(),
            extra_args: args.sampler_args.clone(),
        },
        analysis_only: args.analysis_only,
        file_pattern: args.file_pattern.clone(),
        concatenated_path: args.concatenated.clone(),
        output_path: args.analysis.output_file.clone(),
        export_rows: args.analysis.export_rows.clone(),
        analysis: analysis_config_from_args(&args.analysis)?,
    })
}
