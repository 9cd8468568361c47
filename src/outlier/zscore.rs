//! Per-column z-score detector.
//!
//! A row is an outlier when any feature lies more than `threshold` population
//! standard deviations from that column's mean. Constant columns carry no
//! signal and are ignored.

use crate::domain::{FEATURE_LEN, Features};
use crate::outlier::{AnomalyDetector, Label};

#[derive(Debug, Clone)]
pub struct ZScoreFilter {
    pub threshold: f64,
}

impl AnomalyDetector for ZScoreFilter {
    fn name(&self) -> &'static str {
        "z-score"
    }

    fn fit_and_label(&self, features: &[Features]) -> Vec<Label> {
        let n = features.len();
        if n == 0 {
            return Vec::new();
        }

        let mut mean = [0.0; FEATURE_LEN];
        let mut std = [0.0; FEATURE_LEN];
        for f in 0..FEATURE_LEN {
            mean[f] = features.iter().map(|x| x[f]).sum::<f64>() / n as f64;
            let var = features.iter().map(|x| (x[f] - mean[f]).powi(2)).sum::<f64>() / n as f64;
            std[f] = var.sqrt();
        }

        features
            .iter()
            .map(|x| {
                let extreme = (0..FEATURE_LEN)
                    .filter(|&f| std[f] > 0.0 && std[f].is_finite())
                    .any(|f| ((x[f] - mean[f]) / std[f]).abs() > self.threshold);
                if extreme { Label::Outlier } else { Label::Inlier }
            })
            .collect()
    }
}
