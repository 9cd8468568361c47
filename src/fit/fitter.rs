//! Fit the correction coefficients `(a, d)` for one dataset.
//!
//! The noise model is fitted in log2 domain:
//!
//! ```text
//! minimize Σ (log2 predicted(x_i; a, d) − log2 y_i)^2
//! ```
//!
//! There is no closed form because of the `N^d` factor, so we run
//! Levenberg–Marquardt with the analytic gradient from `models`.

use nalgebra::{DMatrix, DVector};

use crate::domain::{Coefficients, Dataset, FitConfig, FitReport};
use crate::error::NoiseError;
use crate::fit::score::score;
use crate::math::{LeastSquaresProblem, LmOptions, levenberg_marquardt};
use crate::models::log2_predict_with_gradient;

/// Minimum distinct rows needed to estimate two parameters.
pub const MIN_ROWS: usize = 2;

/// Fitted coefficients plus diagnostics.
#[derive(Debug, Clone)]
pub struct ModelFit {
    pub coefficients: Coefficients,
    pub report: FitReport,
    pub iterations: usize,
    /// Final `Σ (log2 residual)^2`.
    pub log_sse: f64,
}

struct LogNoiseProblem<'a> {
    dataset: &'a Dataset,
    log_targets: Vec<f64>,
}

impl LeastSquaresProblem for LogNoiseProblem<'_> {
    fn n_params(&self) -> usize {
        2
    }

    fn n_residuals(&self) -> usize {
        self.dataset.len()
    }

    fn evaluate(&self, params: &DVector<f64>, residuals: &mut DVector<f64>, jacobian: &mut DMatrix<f64>) {
        let coeffs = Coefficients {
            a: params[0],
            d: params[1],
        };
        let mut grad = [0.0; 2];
        for (i, x) in self.dataset.features.iter().enumerate() {
            let log_pred = log2_predict_with_gradient(x, coeffs, &mut grad);
            residuals[i] = log_pred - self.log_targets[i];
            jacobian[(i, 0)] = grad[0];
            jacobian[(i, 1)] = grad[1];
        }
    }
}

/// Fit `(a, d)` on `dataset` and score the result.
///
/// `scope` names the dataset in errors (e.g. `"k=3"` or `"all rows"`).
pub fn fit_coefficients(dataset: &Dataset, config: &FitConfig, scope: &str) -> Result<ModelFit, NoiseError> {
    let distinct = dataset.distinct_rows();
    if distinct < MIN_ROWS {
        return Err(NoiseError::InsufficientData {
            scope: scope.to_string(),
            rows: distinct,
            needed: MIN_ROWS,
        });
    }

    let problem = LogNoiseProblem {
        dataset,
        log_targets: dataset.targets.iter().map(|y| y.log2()).collect(),
    };

    let opts = LmOptions {
        max_iterations: config.max_iterations,
        ..LmOptions::default()
    };
    let initial = DVector::from_vec(vec![config.initial_guess.a, config.initial_guess.d]);

    let solution = levenberg_marquardt(&problem, initial, &opts).map_err(|e| NoiseError::FitDivergence {
        scope: scope.to_string(),
        reason: e.to_string(),
    })?;

    let coefficients = Coefficients {
        a: solution.params[0],
        d: solution.params[1],
    };
    if !(coefficients.a.is_finite() && coefficients.d.is_finite()) {
        return Err(NoiseError::FitDivergence {
            scope: scope.to_string(),
            reason: "non-finite coefficients".to_string(),
        });
    }

    log::debug!(
        "{scope}: a={:.6} d={:.6} after {} iteration(s), log_sse={:.6e}",
        coefficients.a,
        coefficients.d,
        solution.iterations,
        solution.cost
    );

    Ok(ModelFit {
        coefficients,
        report: score(dataset, coefficients),
        iterations: solution.iterations,
        log_sse: solution.cost,
    })
}
