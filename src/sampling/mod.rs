pub mod chunks;

pub use chunks::{ChunkOutcome, DEFAULT_SAMPLER_COMMAND, SamplingReport, run_sampling};
