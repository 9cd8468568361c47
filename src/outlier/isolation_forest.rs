//! Isolation forest anomaly detector.
//!
//! Each tree isolates rows by recursively splitting a random sub-sample on a
//! random feature at a random threshold between that feature's min and max.
//! Anomalies sit in sparse regions and get isolated after few splits, so
//! their average path length across the forest is short.
//!
//! Score for a row with mean path length `E[h]` over `ψ`-row sub-samples:
//!
//! ```text
//! s = 2^(−E[h] / c(ψ)),   c(n) = 2·H(n−1) − 2·(n−1)/n
//! ```
//!
//! The `contamination` fraction sets the decision threshold: rows scoring
//! strictly above the `(1 − contamination)` quantile of the training scores
//! are outliers. Ties at the threshold stay inliers, so data with no anomaly
//! signal (all rows alike) loses nothing.
//!
//! Trees are built in parallel from per-tree seeds, so results are
//! deterministic for a given seed.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::Rng;
use rayon::prelude::*;

use crate::domain::{FEATURE_LEN, Features};
use crate::outlier::{AnomalyDetector, Label};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Default sub-sample size per tree.
pub const DEFAULT_MAX_SAMPLES: usize = 256;

/// Default number of trees.
pub const DEFAULT_TREES: usize = 100;

#[derive(Debug, Clone)]
pub struct IsolationForest {
    pub n_trees: usize,
    pub max_samples: usize,
    pub contamination: f64,
    pub seed: u64,
}

impl IsolationForest {
    pub fn new(contamination: f64, seed: u64) -> Self {
        Self {
            n_trees: DEFAULT_TREES,
            max_samples: DEFAULT_MAX_SAMPLES,
            contamination,
            seed,
        }
    }

    /// Anomaly score in `(0, 1]` for every row (higher = more anomalous).
    pub fn scores(&self, features: &[Features]) -> Vec<f64> {
        let n = features.len();
        if n == 0 {
            return Vec::new();
        }
        let psi = self.max_samples.min(n).max(1);
        let max_depth = (psi as f64).log2().ceil().max(0.0) as usize;

        let trees: Vec<Node> = (0..self.n_trees.max(1))
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(tree_seed(self.seed, t));
                let rows: Vec<usize> = sample(&mut rng, n, psi).into_vec();
                build_tree(features, rows, 0, max_depth, &mut rng)
            })
            .collect();

        let norm = average_path_length(psi);
        features
            .par_iter()
            .map(|x| {
                let mean_h = trees.iter().map(|tree| path_length(tree, x, 0)).sum::<f64>() / trees.len() as f64;
                if norm > 0.0 {
                    2f64.powf(-mean_h / norm)
                } else {
                    // psi == 1: every row is equally (un)isolated.
                    0.5
                }
            })
            .collect()
    }
}

impl AnomalyDetector for IsolationForest {
    fn name(&self) -> &'static str {
        "isolation-forest"
    }

    fn fit_and_label(&self, features: &[Features]) -> Vec<Label> {
        let scores = self.scores(features);
        if scores.is_empty() || self.contamination <= 0.0 {
            return vec![Label::Inlier; scores.len()];
        }

        let threshold = quantile(&scores, 1.0 - self.contamination.min(1.0));
        scores
            .iter()
            .map(|&s| if s > threshold { Label::Outlier } else { Label::Inlier })
            .collect()
    }
}

enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

fn tree_seed(seed: u64, tree: usize) -> u64 {
    seed ^ (tree as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

fn build_tree(features: &[Features], rows: Vec<usize>, depth: usize, max_depth: usize, rng: &mut StdRng) -> Node {
    if depth >= max_depth || rows.len() <= 1 {
        return Node::Leaf { size: rows.len() };
    }

    // Only features that still vary inside this node can split it.
    let mut splittable: Vec<(usize, f64, f64)> = Vec::with_capacity(FEATURE_LEN);
    for f in 0..FEATURE_LEN {
        let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
            let v = features[r][f];
            (lo.min(v), hi.max(v))
        });
        if lo < hi {
            splittable.push((f, lo, hi));
        }
    }
    if splittable.is_empty() {
        return Node::Leaf { size: rows.len() };
    }

    let (feature, lo, hi) = splittable[rng.gen_range(0..splittable.len())];
    let threshold = rng.gen_range(lo..hi);
    let (left, right): (Vec<usize>, Vec<usize>) = rows.into_iter().partition(|&r| features[r][feature] < threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(build_tree(features, left, depth + 1, max_depth, rng)),
        right: Box::new(build_tree(features, right, depth + 1, max_depth, rng)),
    }
}

fn path_length(node: &Node, x: &Features, depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if x[*feature] < *threshold {
                path_length(left, x, depth + 1)
            } else {
                path_length(right, x, depth + 1)
            }
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` points, `c(n)`.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Linear-interpolated quantile, `q` in `[0, 1]`.
fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster_with_outliers() -> Vec<Features> {
        let mut rows = Vec::new();
        for i in 0..60 {
            let jitter = (i % 7) as f64 * 0.01;
            rows.push([1024.0 + jitter, 2.0, 3.0 + jitter, 5.0, 1e20 * (1.0 + jitter)]);
        }
        rows.push([1024.0, 2.0, 40.0, 30.0, 1e30]);
        rows.push([16384.0, 6.0, 3.0, 5.0, 1e10]);
        rows
    }

    #[test]
    fn identical_rows_are_all_inliers() {
        let rows = vec![[1024.0, 2.0, 3.0, 5.0, 1e20]; 2];
        let labels = IsolationForest::new(0.2, 0).fit_and_label(&rows);
        assert_eq!(labels, vec![Label::Inlier, Label::Inlier]);
    }

    #[test]
    fn isolated_points_score_highest() {
        let rows = cluster_with_outliers();
        let scores = IsolationForest::new(0.2, 42).scores(&rows);
        let n = rows.len();
        let max_cluster = scores[..n - 2].iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert!(scores[n - 2] > max_cluster);
        assert!(scores[n - 1] > max_cluster);
    }

    #[test]
    fn labels_flag_isolated_points_and_are_deterministic() {
        let rows = cluster_with_outliers();
        let forest = IsolationForest::new(0.2, 7);
        let first = forest.fit_and_label(&rows);
        let second = forest.fit_and_label(&rows);
        assert_eq!(first, second);

        let n = rows.len();
        assert_eq!(first[n - 1], Label::Outlier);
        assert_eq!(first[n - 2], Label::Outlier);
        let removed = first.iter().filter(|l| **l == Label::Outlier).count();
        assert!(removed < n);
    }

    #[test]
    fn zero_contamination_keeps_everything() {
        let rows = cluster_with_outliers();
        let labels = IsolationForest::new(0.0, 1).fit_and_label(&rows);
        assert!(labels.iter().all(|l| *l == Label::Inlier));
    }

    #[test]
    fn average_path_length_small_cases() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        assert!(average_path_length(256) > average_path_length(16));
    }
}
