use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;

use crate::error::{ForecastError, ForecastResult};
use crate::model::Dataset;
use crate::stats::RegressionMetrics;
use crate::trainer::{Hyperparameters, RegressionTrainer, Regressor};

const INNER_VALIDATION_FRACTION: f64 = 0.2;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchTrial {
    pub hyperparameters: Hyperparameters,
    pub r_squared: Option<f64>,
    pub error: Option<String>,
}

pub struct SearchOutcome {
    pub model: Arc<dyn Regressor>,
    pub best: Hyperparameters,
    pub best_r_squared: f64,
    pub trials: Vec<SearchTrial>,
}

/// Candidate configurations, `base` first, then a fixed grid around it.
pub fn candidate_grid(base: &Hyperparameters) -> Vec<Hyperparameters> {
    let mut out = vec![*base];
    for trees in [50, 100, 200, 400] {
        for leaves in [8, 16, 32] {
            for min_leaf in [5, 20] {
                for l2 in [0.1, 1.0, 10.0] {
                    let candidate = Hyperparameters {
                        number_of_trees: trees,
                        number_of_leaves: leaves,
                        minimum_example_count_per_leaf: min_leaf,
                        learning_rate: base.learning_rate,
                        l2_regularization: l2,
                    };
                    if candidate != *base {
                        out.push(candidate);
                    }
                }
            }
        }
    }
    out
}

/// Try grid candidates on an inner split of `train` until the budget runs out,
/// then refit the best one on all of `train`.
///
/// The first candidate always runs, even with a zero budget.
pub fn automated_search(
    trainer: &dyn RegressionTrainer,
    train: &Dataset,
    base: &Hyperparameters,
    max_training_time: Duration,
    seed: u64,
) -> ForecastResult<SearchOutcome> {
    let (fit_rows, validation_rows) = train.split(INNER_VALIDATION_FRACTION, seed)?;
    let labels = validation_rows.labels();

    let started = Instant::now();
    let mut trials = Vec::new();
    let mut best: Option<(Hyperparameters, f64)> = None;
    let mut last_error: Option<String> = None;

    for candidate in candidate_grid(base) {
        if !trials.is_empty() && started.elapsed() >= max_training_time {
            tracing::info!(trials = trials.len(), "search budget exhausted");
            break;
        }
        let scored = trainer
            .fit(&fit_rows, &candidate)
            .and_then(|model| trainer.transform(model.as_ref(), &validation_rows))
            .map_err(|e| format!("{:#}", e))
            .and_then(|p| {
                RegressionMetrics::from_pairs(&labels, &p).map_err(|e| e.to_string())
            });
        match scored {
            Ok(m) if m.r_squared.is_finite() => {
                tracing::debug!(?candidate, r2 = m.r_squared, "search candidate scored");
                if best.map_or(true, |(_, r2)| m.r_squared > r2) {
                    best = Some((candidate, m.r_squared));
                }
                trials.push(SearchTrial {
                    hyperparameters: candidate,
                    r_squared: Some(m.r_squared),
                    error: None,
                });
            }
            Ok(m) => {
                let e = format!("non-finite r2 {}", m.r_squared);
                last_error = Some(e.clone());
                trials.push(SearchTrial {
                    hyperparameters: candidate,
                    r_squared: None,
                    error: Some(e),
                });
            }
            Err(e) => {
                tracing::warn!(?candidate, error = %e, "search candidate failed");
                last_error = Some(e.clone());
                trials.push(SearchTrial {
                    hyperparameters: candidate,
                    r_squared: None,
                    error: Some(e),
                });
            }
        }
    }

    let Some((best_params, best_r2)) = best else {
        return Err(ForecastError::training_failed(
            "automated search",
            anyhow!(
                "no valid trial out of {}: {}",
                trials.len(),
                last_error.unwrap_or_else(|| "no candidate ran".to_string())
            ),
        ));
    };
    let model = trainer
        .fit(train, &best_params)
        .map_err(|e| ForecastError::training_failed("automated search refit", e))?;
    tracing::info!(
        trials = trials.len(),
        r2 = best_r2,
        trees = best_params.number_of_trees,
        leaves = best_params.number_of_leaves,
        "automated search selected candidate"
    );
    Ok(SearchOutcome {
        model,
        best: best_params,
        best_r_squared: best_r2,
        trials,
    })
}
