//! Bit-precision scoring.
//!
//! Variances are compared on the scale users reason about: bits of precision
//! lost, `ceil(0.5 · log2 v)`. The fitted model is scored against the
//! uncorrected theoretical variance on the same rows.

use crate::domain::{Coefficients, Dataset, FitReport};
use crate::models::predict;

/// Predictions are floored here before taking a log.
pub const PREDICTION_FLOOR: f64 = 1e-6;

/// Convert a variance to bits: `ceil(0.5 · log2 v)`, NaN when `v <= 0`.
pub fn var_to_bit(variance: f64) -> f64 {
    if variance > 0.0 {
        (0.5 * variance.log2()).ceil()
    } else {
        f64::NAN
    }
}

/// Per-row bit values used for scoring and exports.
#[derive(Debug, Clone, Copy)]
pub struct RowBits {
    pub observed: f64,
    pub predicted: f64,
    pub theoretical: f64,
}

pub fn row_bits(features: &[f64; 5], target: f64, coeffs: Coefficients) -> RowBits {
    let predicted = predict(features, coeffs).max(PREDICTION_FLOOR);
    RowBits {
        observed: var_to_bit(target),
        predicted: var_to_bit(predicted),
        theoretical: var_to_bit(features[4]),
    }
}

/// Mean squared bit error of the fitted model and of the raw theoretical formula.
///
/// An empty dataset yields NaN for both means.
pub fn score(dataset: &Dataset, coeffs: Coefficients) -> FitReport {
    let n = dataset.len();
    let mut mse = 0.0;
    let mut mse_without_correction = 0.0;

    for (x, &y) in dataset.features.iter().zip(dataset.targets.iter()) {
        let bits = row_bits(x, y, coeffs);
        mse += (bits.observed - bits.predicted).powi(2);
        mse_without_correction += (bits.observed - bits.theoretical).powi(2);
    }

    FitReport {
        n,
        mse: mse / n as f64,
        mse_without_correction: mse_without_correction / n as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_to_bit_sentinel_and_values() {
        assert!(var_to_bit(0.0).is_nan());
        assert!(var_to_bit(-3.0).is_nan());
        assert_eq!(var_to_bit(1024.0), 5.0);
        assert_eq!(var_to_bit(2048.0), 6.0);
        assert_eq!(var_to_bit(1.0), 0.0);
    }

    #[test]
    fn perfect_model_scores_zero() {
        let coeffs = Coefficients { a: 2.0, d: 1.5 };
        let mut ds = Dataset::default();
        for &n in &[512.0, 1024.0, 2048.0] {
            let x = [n, 1.0, 2.0, 3.0, 1.0];
            ds.push(x, predict(&x, coeffs));
        }
        let report = score(&ds, coeffs);
        assert_eq!(report.n, 3);
        assert_eq!(report.mse, 0.0);
        assert!(report.mse_without_correction > 0.0);
    }

    #[test]
    fn empty_dataset_scores_nan() {
        let report = score(&Dataset::default(), Coefficients { a: 0.0, d: 0.0 });
        assert_eq!(report.n, 0);
        assert!(report.mse.is_nan());
    }
}
