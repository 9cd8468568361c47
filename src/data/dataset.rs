//! Turn parsed measurements into fit-ready rows.
//!
//! Steps, in order:
//!
//! 1. drop records whose observed (torus) variance is at or above the
//!    saturation threshold
//! 2. rescale every variance by `2^128` (torus → modular)
//! 3. target = `max(0, observed − input)`, features =
//!    `[N, k, level, logbase, theoretical]`; rows with a non-positive target
//!    are dropped (the log-domain model cannot represent them)
//! 4. optionally split by `k`, keeping strata in order of first appearance and
//!    dropping strata with fewer than two distinct rows; `k` must be an
//!    integer in `1..=6`

use std::ops::RangeInclusive;

use crate::domain::{Dataset, K_COLUMN, MODULAR_SCALE, MeasurementRecord, Partitioned, Stratum};

/// Minimum distinct rows a stratum needs to be kept.
pub const MIN_STRATUM_ROWS: usize = 2;

/// GLWE dimensions the sampler covers.
pub const STRATUM_KEYS: RangeInclusive<i64> = 1..=6;

#[derive(Debug, Clone)]
pub struct DatasetOptions {
    pub saturation_threshold: f64,
    pub stratify: bool,
}

/// Row accounting for the run summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildStats {
    pub records_in: usize,
    pub saturated: usize,
    pub non_positive: usize,
    pub rows: usize,
    /// Rows whose `k` is not an integer and so cannot key a stratum.
    pub non_integral_k: usize,
    /// Rows whose integral `k` lies outside `STRATUM_KEYS`.
    pub out_of_range_k: usize,
    /// `(k, distinct rows)` for strata dropped for having too few distinct rows.
    pub small_strata: Vec<(i64, usize)>,
}

/// Rescale a torus variance into the modular domain.
pub fn to_modular(variance: f64) -> f64 {
    variance * MODULAR_SCALE
}

/// Build the global dataset (steps 1–3).
pub fn build_dataset(records: &[MeasurementRecord], saturation_threshold: f64) -> (Dataset, BuildStats) {
    let mut stats = BuildStats {
        records_in: records.len(),
        ..BuildStats::default()
    };
    let mut dataset = Dataset::default();

    for rec in records {
        if rec.observed_output_variance >= saturation_threshold {
            stats.saturated += 1;
            continue;
        }

        let input = to_modular(rec.input_variance);
        let observed = to_modular(rec.observed_output_variance);
        let theoretical = to_modular(rec.theoretical_output_variance);

        let target = (observed - input).max(0.0);
        if target <= 0.0 {
            stats.non_positive += 1;
            continue;
        }

        let [n, k, level, logbase] = rec.structural_parameters;
        dataset.push([n, k, level, logbase, theoretical], target);
    }

    stats.rows = dataset.len();
    log::info!(
        "There are {} sample(s) ({} saturated, {} without noise growth)",
        stats.rows,
        stats.saturated,
        stats.non_positive
    );
    (dataset, stats)
}

/// Split rows by exact `k`, in first-appearance order.
pub fn stratify_by_k(dataset: Dataset, stats: &mut BuildStats) -> Vec<Stratum> {
    let mut strata: Vec<Stratum> = Vec::new();

    for (x, y) in dataset.features.into_iter().zip(dataset.targets) {
        let k = x[K_COLUMN];
        if k.fract() != 0.0 {
            stats.non_integral_k += 1;
            continue;
        }
        let key = k as i64;
        if !STRATUM_KEYS.contains(&key) {
            stats.out_of_range_k += 1;
            continue;
        }
        match strata.iter_mut().find(|s| s.key == key) {
            Some(stratum) => stratum.dataset.push(x, y),
            None => {
                let mut ds = Dataset::default();
                ds.push(x, y);
                strata.push(Stratum { key, dataset: ds });
            }
        }
    }

    if stats.non_integral_k > 0 {
        log::warn!("Dropped {} row(s) with a non-integral k", stats.non_integral_k);
    }
    if stats.out_of_range_k > 0 {
        log::warn!(
            "Dropped {} row(s) with k outside {}..={}",
            stats.out_of_range_k,
            STRATUM_KEYS.start(),
            STRATUM_KEYS.end()
        );
    }

    strata.retain(|s| {
        let distinct = s.dataset.distinct_rows();
        if distinct < MIN_STRATUM_ROWS {
            log::warn!(
                "Dropping stratum k={}: {distinct} distinct row(s) out of {}",
                s.key,
                s.dataset.len()
            );
            stats.small_strata.push((s.key, distinct));
            false
        } else {
            true
        }
    });
    strata
}

/// Run all steps and return either the global dataset or its strata.
pub fn build_partitioned(records: &[MeasurementRecord], opts: &DatasetOptions) -> (Partitioned, BuildStats) {
    let (dataset, mut stats) = build_dataset(records, opts.saturation_threshold);
    if opts.stratify {
        let strata = stratify_by_k(dataset, &mut stats);
        (Partitioned::Stratified(strata), stats)
    } else {
        (Partitioned::Global(dataset), stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(k: f64, input: f64, observed: f64, theoretical: f64) -> MeasurementRecord {
        MeasurementRecord {
            structural_parameters: [1024.0, k, 2.0, 8.0],
            input_variance: input,
            observed_output_variance: observed,
            theoretical_output_variance: theoretical,
        }
    }

    #[test]
    fn saturation_bound_is_exclusive() {
        let records = vec![
            rec(1.0, 1e-12, 0.083, 1e-9),
            rec(1.0, 1e-12, 0.1, 1e-9),
            rec(1.0, 1e-12, 0.082999, 1e-9),
        ];
        let (ds, stats) = build_dataset(&records, 0.083);
        assert_eq!(ds.len(), 1);
        assert_eq!(stats.saturated, 2);
    }

    #[test]
    fn rescaling_is_exact_for_all_variances() {
        let input = 3.25e-14;
        let observed = 7.5e-9;
        let theoretical = 6.0e-9;
        let (ds, _) = build_dataset(&[rec(2.0, input, observed, theoretical)], 0.083);

        let theoretical_back = ds.features[0][4] / 2f64.powi(128);
        assert_eq!(ds.features[0][4], theoretical * 2f64.powi(128));
        assert!((theoretical_back - theoretical).abs() <= theoretical * 1e-15);

        let target = observed * 2f64.powi(128) - input * 2f64.powi(128);
        assert_eq!(ds.targets[0], target);
        assert!((ds.targets[0] / 2f64.powi(128) - (observed - input)).abs() <= observed * 1e-12);
    }

    #[test]
    fn non_positive_targets_are_dropped() {
        let records = vec![rec(1.0, 1e-9, 1e-9, 1e-9), rec(1.0, 2e-9, 1e-9, 1e-9), rec(1.0, 1e-10, 1e-9, 1e-9)];
        let (ds, stats) = build_dataset(&records, 0.083);
        assert_eq!(ds.len(), 1);
        assert_eq!(stats.non_positive, 2);
        assert!(ds.targets.iter().all(|&t| t > 0.0));
    }

    #[test]
    fn features_follow_parameter_order() {
        let (ds, _) = build_dataset(&[rec(3.0, 1e-12, 1e-8, 5e-9)], 0.083);
        assert_eq!(&ds.features[0][..4], &[1024.0, 3.0, 2.0, 8.0]);
    }

    #[test]
    fn strata_keep_first_appearance_and_drop_singletons() {
        let records = vec![
            rec(3.0, 1e-12, 1e-8, 1e-9),
            rec(1.0, 1e-12, 1e-8, 1e-9),
            rec(3.0, 1e-12, 2e-8, 1e-9),
            rec(5.0, 1e-12, 1e-8, 1e-9),
            rec(1.0, 1e-12, 3e-8, 1e-9),
            rec(1.0, 1e-12, 4e-8, 1e-9),
        ];
        let opts = DatasetOptions {
            saturation_threshold: 0.083,
            stratify: true,
        };
        let (parts, stats) = build_partitioned(&records, &opts);
        let Partitioned::Stratified(strata) = parts else {
            panic!("expected strata");
        };
        let keys: Vec<i64> = strata.iter().map(|s| s.key).collect();
        assert_eq!(keys, vec![3, 1]);
        assert_eq!(strata[1].dataset.len(), 3);
        assert_eq!(stats.small_strata, vec![(5, 1)]);
    }

    #[test]
    fn duplicated_rows_do_not_make_a_stratum() {
        let records = vec![
            rec(5.0, 1e-12, 1e-8, 1e-9),
            rec(5.0, 1e-12, 1e-8, 1e-9),
            rec(2.0, 1e-12, 1e-8, 1e-9),
            rec(2.0, 1e-12, 2e-8, 1e-9),
        ];
        let mut stats = BuildStats::default();
        let (ds, _) = build_dataset(&records, 0.083);
        let strata = stratify_by_k(ds, &mut stats);

        let keys: Vec<i64> = strata.iter().map(|s| s.key).collect();
        assert_eq!(keys, vec![2]);
        assert_eq!(stats.small_strata, vec![(5, 1)]);
    }

    #[test]
    fn out_of_range_k_is_dropped() {
        let records = vec![
            rec(0.0, 1e-12, 1e-8, 1e-9),
            rec(0.0, 1e-12, 2e-8, 1e-9),
            rec(7.0, 1e-12, 1e-8, 1e-9),
            rec(7.0, 1e-12, 2e-8, 1e-9),
            rec(6.0, 1e-12, 1e-8, 1e-9),
            rec(6.0, 1e-12, 2e-8, 1e-9),
        ];
        let mut stats = BuildStats::default();
        let (ds, _) = build_dataset(&records, 0.083);
        let strata = stratify_by_k(ds, &mut stats);

        assert_eq!(strata.len(), 1);
        assert_eq!(strata[0].key, 6);
        assert_eq!(stats.out_of_range_k, 4);
    }

    #[test]
    fn empty_input_gives_empty_partitions() {
        let opts = DatasetOptions {
            saturation_threshold: 0.083,
            stratify: true,
        };
        let (parts, stats) = build_partitioned(&[], &opts);
        assert_eq!(parts, Partitioned::Stratified(Vec::new()));
        assert_eq!(stats.rows, 0);

        let opts = DatasetOptions { stratify: false, ..opts };
        let (parts, _) = build_partitioned(&[], &opts);
        assert_eq!(parts.total_rows(), 0);
    }
}
