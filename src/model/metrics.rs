use serde::{Deserialize, Serialize};

use crate::stats::RegressionMetrics;

/// Pairwise agreement between fold models on a shared held-out set.
///
/// Correlation fields aggregate over the k·(k−1)/2 unordered fold pairs;
/// error fields aggregate over the k folds' own validation metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationAgreement {
    pub fold_count: usize,
    pub average_pearson_correlation: f64,
    pub minimum_pearson_correlation: f64,
    pub average_spearman_correlation: f64,
    pub minimum_spearman_correlation: f64,
    pub average_mean_absolute_error: f64,
    pub maximum_mean_absolute_error: f64,
    pub average_root_mean_squared_error: f64,
    pub maximum_root_mean_squared_error: f64,
    pub average_r_squared: f64,
    pub maximum_r_squared: f64,
    /// Pairs whose Pearson input had zero variance; excluded from Pearson aggregates.
    #[serde(default)]
    pub degenerate_pairs: usize,
    /// Pairs whose correlation fell outside [-1, 1]. Kept in the aggregates unclamped.
    #[serde(default)]
    pub out_of_range_pairs: usize,
}

impl CrossValidationAgreement {
    pub fn pair_count(&self) -> usize {
        self.fold_count * self.fold_count.saturating_sub(1) / 2
    }

    pub fn is_suspect(&self) -> bool {
        self.out_of_range_pairs > 0
    }
}

/// Held-out quality of one trained duration predictor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionQualityMetrics {
    pub mean_absolute_error: f64,
    pub root_mean_squared_error: f64,
    pub loss: f64,
    pub r_squared: f64,
    pub sample_count: usize,
    pub cross_validation: Option<CrossValidationAgreement>,
}

impl RegressionQualityMetrics {
    pub fn from_parts(
        metrics: RegressionMetrics,
        cross_validation: Option<CrossValidationAgreement>,
    ) -> Self {
        Self {
            mean_absolute_error: metrics.mean_absolute_error,
            root_mean_squared_error: metrics.root_mean_squared_error,
            loss: metrics.loss,
            r_squared: metrics.r_squared,
            sample_count: metrics.sample_count,
            cross_validation,
        }
    }
}
