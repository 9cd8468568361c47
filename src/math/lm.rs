//! Levenberg–Marquardt for small non-linear least-squares problems.
//!
//! We minimize `Σ r_i(θ)^2` for a handful of parameters `θ`.
//!
//! Each iteration solves the damped Gauss–Newton step
//!
//! ```text
//! minimize ‖J δ + r‖² + λ ‖D δ‖²
//! ```
//!
//! as an augmented least-squares system `[J; √λ D] δ = [-r; 0]`, reusing the
//! SVD solver from `ols`. `D` holds the running maximum of the Jacobian
//! column norms (Marquardt scaling), which keeps the damping invariant to the
//! very different scales of the parameters.

use nalgebra::{DMatrix, DVector};

use crate::math::solve_least_squares;

/// A least-squares problem with an analytic Jacobian.
pub trait LeastSquaresProblem {
    fn n_params(&self) -> usize;
    fn n_residuals(&self) -> usize;

    /// Fill `residuals` (length `n_residuals`) and `jacobian`
    /// (`n_residuals × n_params`) at `params`.
    fn evaluate(&self, params: &DVector<f64>, residuals: &mut DVector<f64>, jacobian: &mut DMatrix<f64>);
}

#[derive(Debug, Clone)]
pub struct LmOptions {
    pub max_iterations: usize,
    /// Relative cost reduction below which we stop.
    pub ftol: f64,
    /// Relative step size below which we stop.
    pub xtol: f64,
    pub lambda_init: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iterations: 600,
            ftol: 1.49012e-8,
            xtol: 1.49012e-8,
            lambda_init: 1e-3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LmSolution {
    pub params: DVector<f64>,
    /// Final `Σ r_i^2`.
    pub cost: f64,
    pub iterations: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LmError {
    /// Residuals or Jacobian are not finite at the starting point.
    NonFiniteStart,
    /// The damped step could not be solved.
    SingularStep { iteration: usize },
    /// The iteration budget ran out before any stopping criterion held.
    MaxIterations { iterations: usize, cost: f64 },
}

impl std::fmt::Display for LmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LmError::NonFiniteStart => write!(f, "objective is not finite at the initial guess"),
            LmError::SingularStep { iteration } => {
                write!(f, "could not solve the damped step at iteration {iteration}")
            }
            LmError::MaxIterations { iterations, cost } => write!(
                f,
                "no convergence after {iterations} iterations (cost={cost:.6e})"
            ),
        }
    }
}

/// Above this damping the step is numerically zero: we are at a stationary point.
const LAMBDA_MAX: f64 = 1e16;
const LAMBDA_MIN: f64 = 1e-12;

/// Run Levenberg–Marquardt from `initial`.
pub fn levenberg_marquardt<P: LeastSquaresProblem>(
    problem: &P,
    initial: DVector<f64>,
    opts: &LmOptions,
) -> Result<LmSolution, LmError> {
    let m = problem.n_residuals();
    let p = problem.n_params();

    let mut x = initial;
    let mut r = DVector::<f64>::zeros(m);
    let mut jac = DMatrix::<f64>::zeros(m, p);
    problem.evaluate(&x, &mut r, &mut jac);
    if !all_finite(&r) || !jac.iter().all(|v| v.is_finite()) {
        return Err(LmError::NonFiniteStart);
    }
    let mut cost = r.norm_squared();
    if cost == 0.0 {
        return Ok(LmSolution { params: x, cost, iterations: 0 });
    }

    let mut scale = DVector::<f64>::zeros(p);
    let mut lambda = opts.lambda_init;

    let mut r_new = DVector::<f64>::zeros(m);
    let mut jac_new = DMatrix::<f64>::zeros(m, p);

    for iteration in 1..=opts.max_iterations {
        for j in 0..p {
            scale[j] = scale[j].max(jac.column(j).norm());
        }

        let step = damped_step(&jac, &r, &scale, lambda).ok_or(LmError::SingularStep { iteration })?;
        let x_new = &x + &step;
        problem.evaluate(&x_new, &mut r_new, &mut jac_new);
        let cost_new = r_new.norm_squared();

        if cost_new.is_finite() && cost_new < cost && jac_new.iter().all(|v| v.is_finite()) {
            let reduction = (cost - cost_new) / cost;
            let small_step = step.norm() <= opts.xtol * (x.norm() + opts.xtol);

            x = x_new;
            std::mem::swap(&mut r, &mut r_new);
            std::mem::swap(&mut jac, &mut jac_new);
            cost = cost_new;
            lambda = (lambda / 10.0).max(LAMBDA_MIN);

            log::debug!("lm iter {iteration}: cost={cost:.6e} lambda={lambda:.1e}");

            if reduction <= opts.ftol || small_step || cost == 0.0 {
                return Ok(LmSolution { params: x, cost, iterations: iteration });
            }
        } else {
            lambda *= 10.0;
            if lambda > LAMBDA_MAX {
                log::debug!("lm iter {iteration}: stopped on the damping limit, cost={cost:.6e}");
                return Ok(LmSolution { params: x, cost, iterations: iteration });
            }
        }
    }

    Err(LmError::MaxIterations {
        iterations: opts.max_iterations,
        cost,
    })
}

fn damped_step(
    jac: &DMatrix<f64>,
    r: &DVector<f64>,
    scale: &DVector<f64>,
    lambda: f64,
) -> Option<DVector<f64>> {
    let (m, p) = jac.shape();
    let mut a = DMatrix::<f64>::zeros(m + p, p);
    let mut b = DVector::<f64>::zeros(m + p);

    a.view_mut((0, 0), (m, p)).copy_from(jac);
    for i in 0..m {
        b[i] = -r[i];
    }
    let sl = lambda.sqrt();
    for j in 0..p {
        a[(m + j, j)] = sl * scale[j].max(1e-12);
    }

    solve_least_squares(&a, &b)
}

fn all_finite(v: &DVector<f64>) -> bool {
    v.iter().all(|x| x.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// y = p0 * exp(p1 * t)
    struct ExpDecay {
        t: Vec<f64>,
        y: Vec<f64>,
    }

    impl LeastSquaresProblem for ExpDecay {
        fn n_params(&self) -> usize {
            2
        }

        fn n_residuals(&self) -> usize {
            self.t.len()
        }

        fn evaluate(&self, params: &DVector<f64>, residuals: &mut DVector<f64>, jacobian: &mut DMatrix<f64>) {
            for (i, (&t, &y)) in self.t.iter().zip(self.y.iter()).enumerate() {
                let e = (params[1] * t).exp();
                residuals[i] = params[0] * e - y;
                jacobian[(i, 0)] = e;
                jacobian[(i, 1)] = params[0] * t * e;
            }
        }
    }

    #[test]
    fn recovers_exponential_parameters() {
        let t: Vec<f64> = (0..20).map(|i| i as f64 * 0.25).collect();
        let y: Vec<f64> = t.iter().map(|&t| 3.0 * (-0.7 * t).exp()).collect();
        let problem = ExpDecay { t, y };

        let sol = levenberg_marquardt(&problem, DVector::from_vec(vec![1.0, 0.0]), &LmOptions::default()).unwrap();
        assert!((sol.params[0] - 3.0).abs() < 1e-6, "p0={}", sol.params[0]);
        assert!((sol.params[1] + 0.7).abs() < 1e-6, "p1={}", sol.params[1]);
        assert!(sol.cost < 1e-12);
    }

    #[test]
    fn non_finite_start_is_rejected() {
        let problem = ExpDecay {
            t: vec![0.0, 1.0],
            y: vec![f64::NAN, 1.0],
        };
        let err = levenberg_marquardt(&problem, DVector::from_vec(vec![1.0, 0.0]), &LmOptions::default()).unwrap_err();
        assert_eq!(err, LmError::NonFiniteStart);
    }

    #[test]
    fn stationary_start_stops_on_damping_limit() {
        // Residuals (1, -1) at the least-squares optimum: no step can lower the cost.
        let problem = ExpDecay {
            t: vec![1.0, 1.0],
            y: vec![1.0, 3.0],
        };
        let sol = levenberg_marquardt(&problem, DVector::from_vec(vec![2.0, 0.0]), &LmOptions::default()).unwrap();
        assert!((sol.cost - 2.0).abs() < 1e-12);
        assert!((sol.params[0] - 2.0).abs() < 1e-9);
        assert!(sol.iterations < LmOptions::default().max_iterations);
    }

    #[test]
    fn tiny_iteration_budget_reports_divergence() {
        let t: Vec<f64> = (0..20).map(|i| i as f64 * 0.25).collect();
        let y: Vec<f64> = t.iter().map(|&t| 3.0 * (-0.7 * t).exp()).collect();
        let problem = ExpDecay { t, y };
        let opts = LmOptions {
            max_iterations: 1,
            ..LmOptions::default()
        };

        let err = levenberg_marquardt(&problem, DVector::from_vec(vec![1.0, 0.0]), &opts).unwrap_err();
        assert!(matches!(err, LmError::MaxIterations { iterations: 1, .. }));
    }
}
