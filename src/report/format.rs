//! Formatted terminal output for a correction run.
//!
//! Everything returns a `String`; printing is left to the caller.

use crate::app::pipeline::{AnalysisOutput, RunOutput};
use crate::domain::{Coefficients, FittedModel};
use crate::fit::strata::scope_label;
use crate::sampling::SamplingReport;
use crate::sampling::chunks::format_elapsed;

/// Summary of the analysis stage (dataset, outliers, fits).
pub fn format_analysis_summary(analysis: &AnalysisOutput) -> String {
    let mut out = String::new();
    let build = &analysis.build;

    out.push_str("=== External product noise correction ===\n");
    out.push_str(&format!("Finished: {}\n", analysis.finished_at.format("%Y-%m-%d %H:%M:%S")));
    out.push_str(&format!(
        "Lines: {} read | {} malformed | {} record(s)\n",
        analysis.lines_read, analysis.malformed, build.records_in
    ));
    out.push_str(&format!(
        "Rows: {} kept | {} saturated | {} without noise growth\n",
        build.rows, build.saturated, build.non_positive
    ));
    if build.non_integral_k > 0 {
        out.push_str(&format!("  ({} row(s) with a non-integral k dropped)\n", build.non_integral_k));
    }
    if build.out_of_range_k > 0 {
        out.push_str(&format!("  ({} row(s) with k outside 1..=6 dropped)\n", build.out_of_range_k));
    }
    for (k, rows) in &build.small_strata {
        out.push_str(&format!("  (stratum k={k} dropped: {rows} distinct row(s))\n"));
    }

    out.push_str("\nFits:\n");
    for fit in &analysis.selection.fits {
        let removed = analysis
            .outliers_removed
            .iter()
            .find(|(key, _)| *key == fit.key)
            .map(|(_, n)| *n)
            .unwrap_or(0);
        let report = &fit.fit.report;
        out.push_str(&format!("--- {} ---\n", fit.label()));
        out.push_str(&format!(
            "rows={} outliers_removed={removed} iterations={}\n",
            report.n, fit.fit.iterations
        ));
        out.push_str(&format!("{}\n", fmt_coefficients(fit.fit.coefficients)));
        out.push_str(&format!("MSE: {:.6}\n", report.mse));
        out.push_str(&format!("MSE without correction: {:.6}\n", report.mse_without_correction));
    }
    for err in &analysis.selection.skipped {
        out.push_str(&format!("  (skipped) {err}\n"));
    }

    out
}

/// Chunk outcomes of a sampling run.
pub fn format_sampling(report: &SamplingReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Sampling: {}/{} chunk(s) succeeded\n",
        report.succeeded(),
        report.requested
    ));
    for outcome in &report.outcomes {
        let status = if outcome.success { "ok" } else { "FAILED" };
        out.push_str(&format!(
            "  chunk #{:<3} {status:<6} {}\n",
            outcome.id,
            format_elapsed(outcome.elapsed)
        ));
    }
    for failure in report.failures() {
        out.push_str(&format!("  {failure}\n"));
    }
    out
}

/// Full summary of a `run`.
pub fn format_run_summary(run: &RunOutput) -> String {
    let mut out = String::new();

    if let Some(sampling) = &run.sampling {
        out.push_str(&format_sampling(sampling));
    }
    out.push_str(&format!(
        "Merged {} file(s) into {}\n",
        run.merge.files.len(),
        run.merge.output.display()
    ));
    if let Some(mismatch) = &run.file_mismatch {
        out.push_str(&format!("WARNING: {mismatch}\n"));
    }
    out.push('\n');

    out.push_str(&format_analysis_summary(&run.analysis));

    if !run.persistence_errors.is_empty() {
        out.push('\n');
        for err in &run.persistence_errors {
            out.push_str(&format!("WARNING: {err}\n"));
        }
    }

    out
}

/// Coefficients in the output file's shape, one line per stratum.
pub fn format_model(model: &FittedModel) -> String {
    match model {
        FittedModel::Global(c) => format!("{}: {}\n", scope_label(None), fmt_coefficients(*c)),
        FittedModel::Stratified(entries) => entries
            .iter()
            .map(|(k, c)| format!("{}: {}\n", scope_label(Some(*k)), fmt_coefficients(*c)))
            .collect(),
    }
}

fn fmt_coefficients(c: Coefficients) -> String {
    format!("a={:.6} d={:.6}", c.a, c.d)
}
