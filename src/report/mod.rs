//! Run summaries for the terminal.

pub mod format;

pub use format::*;
