//! Input/output helpers.
//!
//! - corpus parsing (`ingest`)
//! - per-chunk result concatenation (`merge`)
//! - coefficient JSON and row CSV exports (`export`)

pub mod export;
pub mod ingest;
pub mod merge;

pub use export::*;
pub use ingest::*;
pub use merge::*;
