//! `extprod-correction` library crate.
//!
//! The binary (`extprod`) is a thin wrapper around this library so the
//! parsing, filtering and fitting code is testable without spawning the
//! sampler.

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod outlier;
pub mod report;
pub mod sampling;
