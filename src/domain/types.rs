//! Shared domain types.
//!
//! These are value objects built and consumed inside one pipeline run:
//!
//! - parsed measurements (`MeasurementRecord`)
//! - fit-ready rows (`Dataset`, `Stratum`)
//! - fit outputs (`Coefficients`, `FittedModel`, `FitReport`)
//! - the run configuration (`RunConfig`)

use std::path::PathBuf;

use clap::ValueEnum;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Number of feature columns: `[N, k, level, logbase, theoretical]`.
pub const FEATURE_LEN: usize = 5;

/// Column index of the GLWE dimension `k` inside a feature row.
pub const K_COLUMN: usize = 1;

/// Converts a torus variance into a modular (64-bit squared) variance.
pub const MODULAR_SCALE: f64 = 340_282_366_920_938_463_463_374_607_431_768_211_456.0; // 2^128

/// Observed variances at or above this value are near saturation (1/12).
pub const DEFAULT_SATURATION_THRESHOLD: f64 = 0.083;

/// One sampled observation, variances still in the torus domain.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRecord {
    /// `[polynomial_size, glwe_dimension, level_count, base_log]`.
    pub structural_parameters: [f64; 4],
    pub input_variance: f64,
    pub observed_output_variance: f64,
    pub theoretical_output_variance: f64,
}

/// A feature row: `[N, k, level, logbase, theoretical]` (theoretical rescaled).
pub type Features = [f64; FEATURE_LEN];

/// Aligned feature/target rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub features: Vec<Features>,
    pub targets: Vec<f64>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Number of distinct `(features, target)` rows, compared bitwise.
    pub fn distinct_rows(&self) -> usize {
        let mut rows: Vec<[u64; FEATURE_LEN + 1]> = self
            .features
            .iter()
            .zip(&self.targets)
            .map(|(x, y)| {
                let mut bits = [0u64; FEATURE_LEN + 1];
                for (b, v) in bits.iter_mut().zip(x.iter().chain(std::iter::once(y))) {
                    *b = v.to_bits();
                }
                bits
            })
            .collect();
        rows.sort_unstable();
        rows.dedup();
        rows.len()
    }

    pub fn push(&mut self, features: Features, target: f64) {
        self.features.push(features);
        self.targets.push(target);
    }

    /// Keep only rows whose mask entry is `true`, preserving alignment.
    pub fn retain_mask(&mut self, keep: &[bool]) {
        let mut idx = 0;
        self.features.retain(|_| {
            let k = keep[idx];
            idx += 1;
            k
        });
        let mut idx = 0;
        self.targets.retain(|_| {
            let k = keep[idx];
            idx += 1;
            k
        });
    }
}

/// Rows sharing one value of `k`.
#[derive(Debug, Clone, PartialEq)]
pub struct Stratum {
    pub key: i64,
    pub dataset: Dataset,
}

/// Output of the dataset builder.
#[derive(Debug, Clone, PartialEq)]
pub enum Partitioned {
    Global(Dataset),
    /// Strata in order of first appearance of their key.
    Stratified(Vec<Stratum>),
}

impl Partitioned {
    pub fn total_rows(&self) -> usize {
        match self {
            Partitioned::Global(ds) => ds.len(),
            Partitioned::Stratified(strata) => strata.iter().map(|s| s.dataset.len()).sum(),
        }
    }
}

/// Fitted correction coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coefficients {
    pub a: f64,
    pub d: f64,
}

/// Fit quality in bit-precision units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitReport {
    pub n: usize,
    pub mse: f64,
    pub mse_without_correction: f64,
}

/// Fitted model as written to the output file.
#[derive(Debug, Clone, PartialEq)]
pub enum FittedModel {
    Global(Coefficients),
    /// Stratum key -> coefficients, in stratum order.
    Stratified(Vec<(i64, Coefficients)>),
}

impl Serialize for FittedModel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FittedModel::Global(c) => c.serialize(serializer),
            FittedModel::Stratified(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, coeffs) in entries {
                    map.serialize_entry(&key.to_string(), coeffs)?;
                }
                map.end()
            }
        }
    }
}

/// Which unsupervised detector to use for outlier removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DetectorKind {
    /// Isolation forest (default).
    IsolationForest,
    /// Per-column z-score threshold.
    ZScore,
    /// Keep every row.
    None,
}

/// Options for the outlier filter.
#[derive(Debug, Clone)]
pub struct OutlierConfig {
    pub detector: DetectorKind,
    /// Expected outlier fraction for the isolation forest.
    pub contamination: f64,
    /// Threshold on `|z|` for the z-score detector.
    pub z_threshold: f64,
    pub seed: u64,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            detector: DetectorKind::IsolationForest,
            contamination: 0.2,
            z_threshold: 3.0,
            seed: 0,
        }
    }
}

/// Options for the non-linear fit.
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub initial_guess: Coefficients,
    pub max_iterations: usize,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            initial_guess: Coefficients { a: 1.0, d: 1.0 },
            max_iterations: 600,
        }
    }
}

/// Analysis settings: everything after the corpus is on disk.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub saturation_threshold: f64,
    pub stratify: bool,
    pub outliers: OutlierConfig,
    pub fit: FitConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            saturation_threshold: DEFAULT_SATURATION_THRESHOLD,
            stratify: true,
            outliers: OutlierConfig::default(),
            fit: FitConfig::default(),
        }
    }
}

/// Sampler invocation settings.
#[derive(Debug, Clone)]
pub struct SamplingConfig {
    /// Number of chunks the parameter grid is divided into (one process each).
    pub chunks: usize,
    /// Shell command launching the sampler; `--tot`/`--id` are appended.
    pub command: String,
    /// Extra arguments forwarded to the sampler.
    pub extra_args: Vec<String>,
}

/// A full run's configuration as understood by the pipeline.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub sampling: SamplingConfig,
    pub analysis_only: bool,
    pub file_pattern: String,
    pub concatenated_path: PathBuf,
    pub output_path: PathBuf,
    pub export_rows: Option<PathBuf>,
    pub analysis: AnalysisConfig,
}
