//! Dataset construction and synthetic corpora.

pub mod dataset;
pub mod synthetic;

pub use dataset::*;
