//! Linear least-squares solver.
//!
//! Every Levenberg–Marquardt iteration solves one small linear problem
//!
//! ```text
//! minimize ‖A δ − b‖²
//! ```
//!
//! where `A` is the Jacobian stacked on top of the damping rows. `A` is tall
//! (one row per observation plus one per parameter) and only two columns wide.
//!
//! Implementation choices:
//! - SVD handles tall, non-square systems (nalgebra's `QR::solve` expects square
//!   matrices and panics otherwise).
//! - A rank-deficient `A` (e.g. all rows share the same `N`, so `a` and `d` are
//!   not separately identifiable) is solved in the minimum-norm sense.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if no tolerance yields a finite solution.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser singular-value cutoffs.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}
