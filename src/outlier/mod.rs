//! Outlier removal.
//!
//! Detection is unsupervised and sees the feature matrix only; targets are
//! never used to decide which rows to drop. Any detector implementing
//! `AnomalyDetector` can be plugged in.

pub mod isolation_forest;
pub mod zscore;

pub use isolation_forest::IsolationForest;
pub use zscore::ZScoreFilter;

use crate::domain::{Dataset, DetectorKind, Features, OutlierConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Inlier,
    Outlier,
}

/// Capability: fit on the features and label each row.
pub trait AnomalyDetector: Send + Sync {
    fn name(&self) -> &'static str;

    /// One label per row of `features`, same order.
    fn fit_and_label(&self, features: &[Features]) -> Vec<Label>;
}

/// Pass-through detector.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepAll;

impl AnomalyDetector for KeepAll {
    fn name(&self) -> &'static str {
        "none"
    }

    fn fit_and_label(&self, features: &[Features]) -> Vec<Label> {
        vec![Label::Inlier; features.len()]
    }
}

/// Build the detector selected by configuration.
pub fn detector_for(config: &OutlierConfig) -> Box<dyn AnomalyDetector> {
    match config.detector {
        DetectorKind::IsolationForest => Box::new(IsolationForest::new(config.contamination, config.seed)),
        DetectorKind::ZScore => Box::new(ZScoreFilter {
            threshold: config.z_threshold,
        }),
        DetectorKind::None => Box::new(KeepAll),
    }
}

/// Remove rows labelled as outliers from `dataset`; returns how many were removed.
pub fn remove_outliers(dataset: &mut Dataset, detector: &dyn AnomalyDetector) -> usize {
    if dataset.is_empty() {
        return 0;
    }
    let before = dataset.len();

    let labels = detector.fit_and_label(&dataset.features);
    let keep: Vec<bool> = labels.iter().map(|l| *l == Label::Inlier).collect();
    dataset.retain_mask(&keep);

    let removed = before - dataset.len();
    log::info!("Removing {removed} outlier(s) out of {before} row(s) ({})", detector.name());
    removed
}
