//! Shared correction pipeline used by the `run` and `analyze` commands.
//!
//! sample chunks -> concatenate -> parse -> build dataset -> drop outliers
//! -> fit -> persist
//!
//! `run_analysis` is the pure part (parsed corpus in, coefficients out) so it
//! can be tested without touching the filesystem or spawning processes.

use std::path::Path;

use chrono::{DateTime, Local};

use crate::data::dataset::{BuildStats, DatasetOptions, build_partitioned};
use crate::domain::{AnalysisConfig, Partitioned, RunConfig};
use crate::error::{AppError, NoiseError};
use crate::fit::strata::{FitSelection, fit_partitioned, scope_label};
use crate::io::export::{write_coefficients_json, write_rows_csv};
use crate::io::ingest::{ParsedCorpus, load_corpus};
use crate::io::merge::{MergeSummary, concatenate_result_files};
use crate::outlier::{detector_for, remove_outliers};
use crate::sampling::{SamplingReport, run_sampling};

/// Outputs of the analysis stage.
#[derive(Debug, Clone)]
pub struct AnalysisOutput {
    pub lines_read: usize,
    pub malformed: usize,
    pub build: BuildStats,
    /// Outliers removed per partition (`None` = global), in partition order.
    pub outliers_removed: Vec<(Option<i64>, usize)>,
    /// Rows that were fitted, after outlier removal.
    pub partitions: Partitioned,
    pub selection: FitSelection,
    pub finished_at: DateTime<Local>,
}

/// Everything a `run` produced.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub sampling: Option<SamplingReport>,
    pub merge: MergeSummary,
    /// Set when the merged file count does not match the chunks that ran.
    pub file_mismatch: Option<String>,
    pub analysis: AnalysisOutput,
    pub persistence_errors: Vec<NoiseError>,
}

/// Build the dataset, remove outliers and fit.
///
/// Fails only when nothing can be fitted: no rows survive dataset building, or
/// no partition produced coefficients.
pub fn run_analysis(corpus: &ParsedCorpus, config: &AnalysisConfig) -> Result<AnalysisOutput, AppError> {
    let opts = DatasetOptions {
        saturation_threshold: config.saturation_threshold,
        stratify: config.stratify,
    };
    let (mut partitions, build) = build_partitioned(&corpus.records, &opts);

    if build.rows == 0 {
        return Err(NoiseError::InsufficientData {
            scope: "corpus".to_string(),
            rows: 0,
            needed: crate::fit::fitter::MIN_ROWS,
        }
        .into());
    }

    let detector = detector_for(&config.outliers);
    let mut outliers_removed = Vec::new();
    match &mut partitions {
        Partitioned::Global(dataset) => {
            outliers_removed.push((None, remove_outliers(dataset, detector.as_ref())));
        }
        Partitioned::Stratified(strata) => {
            for stratum in strata.iter_mut() {
                log::info!("--- {} ---", scope_label(Some(stratum.key)));
                let removed = remove_outliers(&mut stratum.dataset, detector.as_ref());
                outliers_removed.push((Some(stratum.key), removed));
            }
        }
    }

    let selection = fit_partitioned(&partitions, &config.fit)?;

    Ok(AnalysisOutput {
        lines_read: corpus.lines_read,
        malformed: corpus.row_errors.len(),
        build,
        outliers_removed,
        partitions,
        selection,
        finished_at: Local::now(),
    })
}

/// Compare merged files with the chunks that ran.
pub fn check_file_count(merge: &MergeSummary, sampling: Option<&SamplingReport>) -> Option<String> {
    let report = sampling?;
    let failed = report.outcomes.len() - report.succeeded();
    if merge.files.len() == report.requested && failed == 0 {
        return None;
    }
    let message = format!(
        "merged {} result file(s) for {} requested chunk(s), {failed} of which failed",
        merge.files.len(),
        report.requested
    );
    log::warn!("Result files do not match the sampling run: {message}");
    Some(message)
}

/// Write the coefficient file and, if requested, the row export.
///
/// Failures are logged and returned; they never abort the run.
pub fn persist(
    analysis: &AnalysisOutput,
    output_path: &Path,
    export_rows: Option<&Path>,
) -> Vec<NoiseError> {
    let mut errors = Vec::new();

    match write_coefficients_json(output_path, &analysis.selection.model) {
        Ok(()) => log::info!("Wrote correction coefficients to {}", output_path.display()),
        Err(err) => {
            log::error!("{err}");
            errors.push(err);
        }
    }

    if let Some(path) = export_rows {
        match write_rows_csv(path, &analysis.partitions, &analysis.selection.model) {
            Ok(rows) => log::info!("Wrote {rows} row(s) to {}", path.display()),
            Err(err) => {
                log::error!("{err}");
                errors.push(err);
            }
        }
    }

    errors
}

/// Full run: sample (unless analysis-only), merge, analyse, persist.
pub fn run_full(config: &RunConfig, working_dir: &Path) -> Result<RunOutput, AppError> {
    let sampling = if config.analysis_only {
        log::info!("Analysis only: skipping sampling");
        None
    } else {
        Some(run_sampling(&config.sampling, working_dir)?)
    };

    let pattern = working_dir.join(&config.file_pattern);
    let concatenated = working_dir.join(&config.concatenated_path);
    let merge = concatenate_result_files(&pattern.to_string_lossy(), &concatenated)?;
    let file_mismatch = check_file_count(&merge, sampling.as_ref());

    let corpus = load_corpus(&concatenated)?;
    let analysis = run_analysis(&corpus, &config.analysis)?;

    let output_path = working_dir.join(&config.output_path);
    let export_rows = config.export_rows.as_ref().map(|p| working_dir.join(p));
    let persistence_errors = persist(&analysis, &output_path, export_rows.as_deref());

    Ok(RunOutput {
        sampling,
        merge,
        file_mismatch,
        analysis,
        persistence_errors,
    })
}
