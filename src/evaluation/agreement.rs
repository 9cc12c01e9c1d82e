use std::sync::Arc;

use crate::error::{ForecastError, ForecastResult};
use crate::evaluation::kfold::k_fold;
use crate::model::{CrossValidationAgreement, Dataset};
use crate::stats::{
    is_valid_correlation, pearson, spearman_rank_correlation, spread, RegressionMetrics,
};
use crate::trainer::{Hyperparameters, RegressionTrainer, Regressor};

pub const DEFAULT_FOLDS: usize = 4;

pub struct FoldResult {
    pub fold: usize,
    pub model: Arc<dyn Regressor>,
    pub metrics: RegressionMetrics,
}

/// Runs k-fold cross-validation and scores how well the fold models agree
/// with one another on a shared held-out set.
pub struct CrossValidationAnalyzer {
    trainer: Arc<dyn RegressionTrainer>,
    folds: usize,
    seed: u64,
    results: Vec<FoldResult>,
}

impl CrossValidationAnalyzer {
    pub fn new(trainer: Arc<dyn RegressionTrainer>, folds: usize, seed: u64) -> Self {
        Self {
            trainer,
            folds,
            seed,
            results: Vec::new(),
        }
    }

    pub fn folds(&self) -> &[FoldResult] {
        &self.results
    }

    /// Train one model per fold and record its metrics on the left-out fold.
    pub fn cross_validate(
        &mut self,
        train: &Dataset,
        params: &Hyperparameters,
    ) -> ForecastResult<&[FoldResult]> {
        let splits = k_fold(train.len(), self.folds, self.seed)?;
        let mut results = Vec::with_capacity(splits.len());
        for (fold, split) in splits.iter().enumerate() {
            let fold_train = train.subset(&split.train_indices);
            let fold_validation = train.subset(&split.validation_indices);
            let model = self
                .trainer
                .fit(&fold_train, params)
                .map_err(|e| ForecastError::training_failed(format!("fold {} fit", fold), e))?;
            let predicted = self
                .trainer
                .transform(model.as_ref(), &fold_validation)
                .map_err(|e| {
                    ForecastError::training_failed(format!("fold {} transform", fold), e)
                })?;
            let metrics = RegressionMetrics::from_pairs(&fold_validation.labels(), &predicted)?;
            tracing::debug!(
                fold,
                train_rows = fold_train.len(),
                validation_rows = fold_validation.len(),
                mae = metrics.mean_absolute_error,
                rmse = metrics.root_mean_squared_error,
                r2 = metrics.r_squared,
                "cross-validation fold trained"
            );
            results.push(FoldResult {
                fold,
                model,
                metrics,
            });
        }
        self.results = results;
        Ok(&self.results)
    }

    /// Transform every fold model over `test` and compare the predictions pairwise.
    pub fn agreement(&self, test: &Dataset) -> ForecastResult<CrossValidationAgreement> {
        if self.results.is_empty() {
            return Err(ForecastError::NotYetEvaluated);
        }
        let mut predictions = Vec::with_capacity(self.results.len());
        for r in &self.results {
            let p = self
                .trainer
                .transform(r.model.as_ref(), test)
                .map_err(|e| {
                    ForecastError::training_failed(format!("fold {} held-out transform", r.fold), e)
                })?;
            predictions.push(p);
        }
        let metrics: Vec<RegressionMetrics> = self.results.iter().map(|r| r.metrics).collect();
        agreement_from_predictions(&metrics, &predictions)
    }
}

/// Aggregate fold metrics and pairwise correlations of fold predictions.
///
/// Pairs with zero-variance predictions are skipped for Pearson and counted in
/// `degenerate_pairs`; if every pair is degenerate the whole call fails.
pub fn agreement_from_predictions(
    fold_metrics: &[RegressionMetrics],
    predictions: &[Vec<f64>],
) -> ForecastResult<CrossValidationAgreement> {
    let k = predictions.len();
    if k < 2 || fold_metrics.len() != k {
        return Err(ForecastError::DegenerateInput(format!(
            "agreement needs matching fold metrics and at least 2 prediction vectors, got {} metrics and {} vectors",
            fold_metrics.len(),
            k
        )));
    }

    let mut pearsons = Vec::new();
    let mut spearmans = Vec::new();
    let mut degenerate_pairs = 0;
    let mut out_of_range_pairs = 0;
    for a in 0..k {
        for b in (a + 1)..k {
            let spearman = spearman_rank_correlation(&predictions[a], &predictions[b])?;
            let pearson_r = match pearson(&predictions[a], &predictions[b]) {
                Ok(r) => Some(r),
                Err(ForecastError::DegenerateInput(reason)) => {
                    tracing::warn!(fold_a = a, fold_b = b, %reason, "skipping degenerate fold pair");
                    degenerate_pairs += 1;
                    None
                }
                Err(e) => return Err(e),
            };
            tracing::info!(
                fold_a = a,
                fold_b = b,
                pearson = pearson_r.unwrap_or(f64::NAN),
                spearman,
                "fold pair agreement"
            );
            let pearson_ok = pearson_r.map_or(true, is_valid_correlation);
            if !pearson_ok || !is_valid_correlation(spearman) {
                out_of_range_pairs += 1;
            }
            if let Some(r) = pearson_r {
                pearsons.push(r);
            }
            spearmans.push(spearman);
        }
    }

    let Some(pearson_spread) = spread(&pearsons) else {
        return Err(ForecastError::DegenerateInput(
            "every fold pair had zero-variance predictions".to_string(),
        ));
    };
    let spearman_spread = spread(&spearmans).ok_or_else(|| {
        ForecastError::DegenerateInput("no fold pairs to compare".to_string())
    })?;
    let mae: Vec<f64> = fold_metrics.iter().map(|m| m.mean_absolute_error).collect();
    let rmse: Vec<f64> = fold_metrics
        .iter()
        .map(|m| m.root_mean_squared_error)
        .collect();
    let r2: Vec<f64> = fold_metrics.iter().map(|m| m.r_squared).collect();
    let (Some(mae), Some(rmse), Some(r2)) = (spread(&mae), spread(&rmse), spread(&r2)) else {
        return Err(ForecastError::DegenerateInput("no fold metrics".to_string()));
    };

    if out_of_range_pairs > 0 {
        tracing::warn!(
            out_of_range_pairs,
            "fold agreement contains correlations outside [-1, 1]"
        );
    }

    Ok(CrossValidationAgreement {
        fold_count: k,
        average_pearson_correlation: pearson_spread.average,
        minimum_pearson_correlation: pearson_spread.minimum,
        average_spearman_correlation: spearman_spread.average,
        minimum_spearman_correlation: spearman_spread.minimum,
        average_mean_absolute_error: mae.average,
        maximum_mean_absolute_error: mae.maximum,
        average_root_mean_squared_error: rmse.average,
        maximum_root_mean_squared_error: rmse.maximum,
        average_r_squared: r2.average,
        maximum_r_squared: r2.maximum,
        degenerate_pairs,
        out_of_range_pairs,
    })
}
