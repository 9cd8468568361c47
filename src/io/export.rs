//! Write fitted coefficients (JSON) and per-row diagnostics (CSV).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::domain::{Coefficients, Dataset, FittedModel, Partitioned};
use crate::error::NoiseError;
use crate::fit::score::row_bits;
use crate::models::predict;

fn persistence(path: &Path, reason: impl std::fmt::Display) -> NoiseError {
    NoiseError::PersistenceFailure {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// Write `{"a", "d"}` or `{"<k>": {"a", "d"}, ...}` to `path`.
pub fn write_coefficients_json(path: &Path, model: &FittedModel) -> Result<(), NoiseError> {
    let file = File::create(path).map_err(|e| persistence(path, e))?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, model).map_err(|e| persistence(path, e))?;
    writeln!(out).map_err(|e| persistence(path, e))?;
    out.flush().map_err(|e| persistence(path, e))?;
    Ok(())
}

fn write_rows(
    out: &mut impl Write,
    key: Option<i64>,
    dataset: &Dataset,
    coeffs: Coefficients,
) -> std::io::Result<usize> {
    let stratum = key.map(|k| k.to_string()).unwrap_or_default();
    for (x, &y) in dataset.features.iter().zip(&dataset.targets) {
        let bits = row_bits(x, y, coeffs);
        writeln!(
            out,
            "{stratum},{},{},{},{},{:e},{:e},{:e},{:.4},{:.4},{:.4}",
            x[0],
            x[1],
            x[2],
            x[3],
            x[4],
            y,
            predict(x, coeffs),
            bits.observed,
            bits.predicted,
            bits.theoretical,
        )?;
    }
    Ok(dataset.len())
}

/// Write one CSV line per fitted row; rows of skipped strata are left out.
///
/// Returns the number of rows written.
pub fn write_rows_csv(path: &Path, parts: &Partitioned, model: &FittedModel) -> Result<usize, NoiseError> {
    let file = File::create(path).map_err(|e| persistence(path, e))?;
    let mut out = BufWriter::new(file);

    writeln!(
        out,
        "k_stratum,polynomial_size,glwe_dimension,level,log_base,theoretical_var,observed_var,predicted_var,bits_observed,bits_predicted,bits_theoretical"
    )
    .map_err(|e| persistence(path, e))?;

    let mut written = 0;
    match (parts, model) {
        (Partitioned::Global(dataset), FittedModel::Global(coeffs)) => {
            written += write_rows(&mut out, None, dataset, *coeffs).map_err(|e| persistence(path, e))?;
        }
        (Partitioned::Stratified(strata), FittedModel::Stratified(entries)) => {
            for stratum in strata {
                let Some((_, coeffs)) = entries.iter().find(|(k, _)| *k == stratum.key) else {
                    continue;
                };
                written += write_rows(&mut out, Some(stratum.key), &stratum.dataset, *coeffs)
                    .map_err(|e| persistence(path, e))?;
            }
        }
        _ => return Err(persistence(path, "partitioning does not match the fitted model")),
    }

    out.flush().map_err(|e| persistence(path, e))?;
    Ok(written)
}
