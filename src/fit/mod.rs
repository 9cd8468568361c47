//! Noise-model fitting.
//!
//! Responsibilities:
//!
//! - fit `(a, d)` for one dataset with Levenberg–Marquardt (`fitter`)
//! - score a fit in bit-precision units (`score`)
//! - fit each `k` stratum independently and collect failures (`strata`)

pub mod fitter;
pub mod score;
pub mod strata;

pub use fitter::*;
pub use score::*;
pub use strata::*;
