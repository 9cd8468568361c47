//! Fit a global dataset or each `k` stratum independently.
//!
//! Per-stratum failures (too few rows, divergence) are recorded in `skipped`
//! and the remaining strata are still fitted. A global fit has nothing to fall
//! back on, so its failure is returned directly.

use crate::domain::{Coefficients, FitConfig, FittedModel, Partitioned};
use crate::error::NoiseError;
use crate::fit::fitter::{ModelFit, fit_coefficients};

/// One fitted dataset.
#[derive(Debug, Clone)]
pub struct StratumFit {
    /// `None` for the global fit.
    pub key: Option<i64>,
    pub fit: ModelFit,
}

impl StratumFit {
    pub fn label(&self) -> String {
        scope_label(self.key)
    }
}

/// Output of fitting every partition.
#[derive(Debug, Clone)]
pub struct FitSelection {
    pub model: FittedModel,
    pub fits: Vec<StratumFit>,
    /// Strata that produced no coefficients and why.
    pub skipped: Vec<NoiseError>,
}

pub fn scope_label(key: Option<i64>) -> String {
    match key {
        Some(k) => format!("k={k}"),
        None => "all rows".to_string(),
    }
}

/// Fit the partitioned dataset.
pub fn fit_partitioned(parts: &Partitioned, config: &FitConfig) -> Result<FitSelection, NoiseError> {
    match parts {
        Partitioned::Global(dataset) => {
            let fit = fit_coefficients(dataset, config, &scope_label(None))?;
            Ok(FitSelection {
                model: FittedModel::Global(fit.coefficients),
                fits: vec![StratumFit { key: None, fit }],
                skipped: Vec::new(),
            })
        }
        Partitioned::Stratified(strata) => {
            if strata.is_empty() {
                return Err(NoiseError::InsufficientData {
                    scope: "every k stratum".to_string(),
                    rows: 0,
                    needed: crate::fit::fitter::MIN_ROWS,
                });
            }

            let mut entries: Vec<(i64, Coefficients)> = Vec::new();
            let mut fits = Vec::new();
            let mut skipped = Vec::new();

            for stratum in strata {
                let scope = scope_label(Some(stratum.key));
                match fit_coefficients(&stratum.dataset, config, &scope) {
                    Ok(fit) => {
                        entries.push((stratum.key, fit.coefficients));
                        fits.push(StratumFit {
                            key: Some(stratum.key),
                            fit,
                        });
                    }
                    Err(err) => {
                        log::warn!("Omitting {scope} from the output: {err}");
                        skipped.push(err);
                    }
                }
            }

            if entries.is_empty() {
                return Err(NoiseError::FitDivergence {
                    scope: "every k stratum".to_string(),
                    reason: format!("{} stratum fit(s) failed", skipped.len()),
                });
            }

            Ok(FitSelection {
                model: FittedModel::Stratified(entries),
                fits,
                skipped,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Dataset, Stratum};
    use crate::models::predict;

    fn exact_rows(k: f64, truth: Coefficients, sizes: &[f64]) -> Dataset {
        let mut ds = Dataset::default();
        for (i, &n) in sizes.iter().enumerate() {
            let x = [n, k, 1.0 + (i % 3) as f64, 4.0 + (i % 5) as f64, 1e9];
            ds.push(x, predict(&x, truth));
        }
        ds
    }

    #[test]
    fn failed_stratum_is_skipped_others_kept() {
        let truth = Coefficients { a: 5.0, d: 1.5 };
        let parts = Partitioned::Stratified(vec![
            Stratum {
                key: 2,
                dataset: exact_rows(2.0, truth, &[512.0, 1024.0, 2048.0, 4096.0, 8192.0]),
            },
            Stratum {
                key: 4,
                dataset: exact_rows(4.0, truth, &[1024.0]),
            },
        ]);

        let selection = fit_partitioned(&parts, &FitConfig::default()).unwrap();
        match &selection.model {
            FittedModel::Stratified(entries) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].0, 2);
                assert!((entries[0].1.a - truth.a).abs() < 1e-3);
                assert!((entries[0].1.d - truth.d).abs() < 1e-3);
            }
            other => panic!("expected stratified model, got {other:?}"),
        }
        assert_eq!(selection.skipped.len(), 1);
        assert!(matches!(selection.skipped[0], NoiseError::InsufficientData { .. }));
    }

    #[test]
    fn global_fit_failure_propagates() {
        let parts = Partitioned::Global(Dataset::default());
        let err = fit_partitioned(&parts, &FitConfig::default()).unwrap_err();
        assert!(matches!(err, NoiseError::InsufficientData { rows: 0, .. }));
    }

    #[test]
    fn no_strata_is_insufficient_data() {
        let err = fit_partitioned(&Partitioned::Stratified(Vec::new()), &FitConfig::default()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
