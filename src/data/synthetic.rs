//! Synthetic acquisition corpus.
//!
//! Generates lines in the sampler's format from a known correction `(a, d)`,
//! so the analysis can be exercised end to end without running the sampler.
//!
//! Parameter grid (same shape as the sampler's hypercube):
//! - `N ∈ {2^8, …, 2^14}` with `k · N ≤ 2^14`
//! - `(base_log, level)` with `base_log · level ≤ 53`
//!
//! Input variance is the minimal secure variance for `(k, N)`; parameter sets
//! where it swamps the correction are skipped. The observed
//! variance is the model prediction with multiplicative Gaussian noise, clamped
//! at `1/12` (saturated) like the sampler does.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{Coefficients, MODULAR_SCALE, MeasurementRecord};
use crate::error::AppError;
use crate::io::ingest::FIELD_SEPARATOR;
use crate::models::correction_term;

/// Variance of a uniform value on the torus; the sampler reports this once saturated.
pub const SATURATED_VARIANCE: f64 = 1.0 / 12.0;

const MAX_BASE_LEVEL_PRODUCT: usize = 53;
const MAX_GLWE_SIZE: usize = 1 << 14;
/// 2^-20: below this the subtraction `observed - input` keeps too few bits.
const MIN_RESOLVABLE_RATIO: f64 = 1.0 / 1_048_576.0;

#[derive(Debug, Clone)]
pub struct SynthConfig {
    pub truth: Coefficients,
    /// GLWE dimensions to generate rows for.
    pub glwe_dimensions: Vec<usize>,
    /// Rows per GLWE dimension.
    pub samples_per_k: usize,
    /// Relative standard deviation of the observed variance.
    pub noise: f64,
    /// How many bits (log2 of variance) the theoretical formula under-estimates by.
    pub theoretical_gap_bits: f64,
    pub seed: u64,
}

/// Minimal variance for 64-bit security at `(k, N)` (torus domain).
pub fn minimal_secure_variance(glwe_dimension: usize, polynomial_size: usize) -> f64 {
    let exponent = -2.0 * 0.026_374_888_765_705_498 * (glwe_dimension * polynomial_size) as f64
        + 2.0 * 2.012_143_923_330_495;
    2f64.powf(exponent).max(2f64.powi(-(2 * 64 - 2 * 2)))
}

fn parameter_grid(glwe_dimensions: &[usize]) -> Vec<[usize; 4]> {
    let mut grid = Vec::new();
    for &k in glwe_dimensions {
        for log_n in 8..=14 {
            let n = 1usize << log_n;
            if k * n > MAX_GLWE_SIZE {
                continue;
            }
            for base_log in 1..=64usize {
                for level in 1..=64usize {
                    if base_log * level <= MAX_BASE_LEVEL_PRODUCT {
                        grid.push([n, k, level, base_log]);
                    }
                }
            }
        }
    }
    grid
}

/// Generate synthetic records.
pub fn generate_records(config: &SynthConfig) -> Result<Vec<MeasurementRecord>, AppError> {
    if !(config.noise.is_finite() && config.noise >= 0.0) {
        return Err(AppError::new(2, "Noise level must be finite and >= 0."));
    }
    let normal =
        Normal::new(0.0, config.noise).map_err(|e| AppError::new(2, format!("Noise distribution error: {e}")))?;
    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut records = Vec::new();
    for &k in &config.glwe_dimensions {
        let mut grid = parameter_grid(&[k]);
        // Keep points where the correction is still resolvable next to the input variance.
        grid.retain(|&[n, k, level, base_log]| {
            let x = [n as f64, k as f64, level as f64, base_log as f64, 0.0];
            correction_term(&x, config.truth) / MODULAR_SCALE >= minimal_secure_variance(k, n) * MIN_RESOLVABLE_RATIO
        });
        if grid.is_empty() {
            log::warn!("No parameter set fits k={k} (k·N must stay <= {MAX_GLWE_SIZE})");
            continue;
        }

        for _ in 0..config.samples_per_k {
            let [n, k, level, base_log] = grid[rng.gen_range(0..grid.len())];
            let x = [n as f64, k as f64, level as f64, base_log as f64, 0.0];

            let correction = correction_term(&x, config.truth) / MODULAR_SCALE;
            let theoretical = correction * 2f64.powf(-config.theoretical_gap_bits);
            let input = minimal_secure_variance(k, n);
            let factor = (1.0 + normal.sample(&mut rng)).max(0.05);
            let observed = input + (correction + theoretical) * factor;

            let (observed, theoretical) = if theoretical >= SATURATED_VARIANCE || observed >= SATURATED_VARIANCE {
                (SATURATED_VARIANCE, SATURATED_VARIANCE.min(theoretical))
            } else {
                (observed, theoretical)
            };

            records.push(MeasurementRecord {
                structural_parameters: [x[0], x[1], x[2], x[3]],
                input_variance: input,
                observed_output_variance: observed,
                theoretical_output_variance: theoretical,
            });
        }
    }

    Ok(records)
}

/// Format a record the way the sampler writes it (field 4 is the GGSW bit).
pub fn format_line(record: &MeasurementRecord) -> String {
    let [n, k, level, base_log] = record.structural_parameters;
    [
        format!("{n}"),
        format!("{k}"),
        format!("{level}"),
        format!("{base_log}"),
        "1".to_string(),
        format!("{:e}", record.input_variance),
        format!("{:e}", record.observed_output_variance),
        format!("{:e}", record.theoretical_output_variance),
    ]
    .join(FIELD_SEPARATOR)
}

/// Write records to `path`, one sampler line each.
pub fn write_corpus(path: &Path, records: &[MeasurementRecord]) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create corpus '{}': {e}", path.display())))?;
    let mut out = BufWriter::new(file);
    for rec in records {
        writeln!(out, "{}", format_line(rec))
            .map_err(|e| AppError::new(2, format!("Failed to write corpus line: {e}")))?;
    }
    out.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush corpus '{}': {e}", path.display())))?;
    Ok(())
}
