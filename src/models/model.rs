//! External-product noise model.
//!
//! ```text
//! predicted(x) = 2^a · (k + 1) · 2^22 · (level · 2^(2·logbase)) · N^d + theoretical
//! ```
//!
//! with `x = [N, k, level, logbase, theoretical]`.
//!
//! The fitter relies on two primitive operations:
//! - predict the variance for a feature row (for scoring/exports)
//! - evaluate `log2(predicted)` and its gradient w.r.t. `(a, d)` (for the fit)
//!
//! The correction term is evaluated through its log2 so that intermediate
//! products never overflow for large `N^d`.

use crate::domain::{Coefficients, Features};

/// `log2` of the fixed `2^22` factor in the correction term.
const FFT_LOG2_FACTOR: f64 = 22.0;

/// log2 of the parameter-dependent part: `(k+1) · 2^22 · level · 2^(2·logbase)`.
fn log2_base_term(x: &Features) -> f64 {
    let k = x[1];
    let level = x[2];
    let logbase = x[3];
    (k + 1.0).log2() + FFT_LOG2_FACTOR + level.log2() + 2.0 * logbase
}

/// Correction term `2^a · (k+1) · 2^22 · level · 2^(2·logbase) · N^d`.
pub fn correction_term(x: &Features, c: Coefficients) -> f64 {
    let n = x[0];
    (c.a + log2_base_term(x) + c.d * n.log2()).exp2()
}

/// Predicted output variance (modular domain).
pub fn predict(x: &Features, c: Coefficients) -> f64 {
    correction_term(x, c) + x[4]
}

/// Evaluate `log2(predicted)` and fill `grad` with `[∂/∂a, ∂/∂d]`.
///
/// Returns a non-finite value when the row cannot be evaluated (e.g. `N <= 0`).
pub fn log2_predict_with_gradient(x: &Features, c: Coefficients, grad: &mut [f64; 2]) -> f64 {
    let g = correction_term(x, c);
    let p = g + x[4];
    // d log2(p) / da = g / p, d log2(p) / dd = (g / p) · log2(N)
    let share = g / p;
    grad[0] = share;
    grad[1] = share * x[0].log2();
    p.log2()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predict_matches_direct_formula() {
        let x = [1024.0, 2.0, 3.0, 4.0, 1e20];
        let c = Coefficients { a: 1.5, d: 1.2 };
        let direct = 2f64.powf(c.a)
            * (x[1] + 1.0)
            * 2f64.powi(22)
            * (x[2] * 2f64.powf(2.0 * x[3]))
            * x[0].powf(c.d)
            + x[4];
        let got = predict(&x, c);
        assert!((got - direct).abs() / direct < 1e-12, "got {got}, want {direct}");
    }

    #[test]
    fn gradient_matches_finite_difference() {
        let x = [4096.0, 3.0, 2.0, 10.0, 2f64.powi(60)];
        let c = Coefficients { a: 4.0, d: 1.7 };
        let mut grad = [0.0; 2];
        let f0 = log2_predict_with_gradient(&x, c, &mut grad);

        let h = 1e-6;
        let mut scratch = [0.0; 2];
        let fa = log2_predict_with_gradient(&x, Coefficients { a: c.a + h, d: c.d }, &mut scratch);
        let fd = log2_predict_with_gradient(&x, Coefficients { a: c.a, d: c.d + h }, &mut scratch);

        assert!(((fa - f0) / h - grad[0]).abs() < 1e-5);
        assert!(((fd - f0) / h - grad[1]).abs() < 1e-4);
    }

    #[test]
    fn large_exponents_stay_finite() {
        let x = [16384.0, 6.0, 40.0, 1.0, 0.0];
        let c = Coefficients { a: 30.0, d: 3.0 };
        assert!(predict(&x, c).is_finite());
    }
}
