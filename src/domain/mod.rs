//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - parsed sampler measurements (`MeasurementRecord`)
//! - fit-ready rows (`Dataset`, `Stratum`, `Partitioned`)
//! - fit outputs (`Coefficients`, `FittedModel`, `FitReport`)
//! - run configuration (`RunConfig` and its parts)

pub mod types;

pub use types::*;
