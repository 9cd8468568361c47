//! Noise model implementation.
//!
//! The model is a small set of pure functions so the fitter, the scorer and
//! the exports all evaluate exactly the same formula.

pub mod model;

pub use model::*;
