use std::sync::Arc;

use anyhow::anyhow;
use tokio::task::JoinSet;

use crate::archive::FundamentalsArchive;
use crate::error::{ForecastError, ForecastResult};
use crate::model::{
    CompositeModel, DurationPredictor, RegressionQualityMetrics, TargetDuration,
    TrainingParameters,
};
use crate::model_store::ModelStore;
use crate::trainer::RegressionTrainer;
use crate::training::session::RegressionTrainingSession;

#[derive(Debug, Clone)]
pub struct TrainedComposite {
    pub composite: CompositeModel,
    pub metrics: Vec<(TargetDuration, RegressionQualityMetrics)>,
}

/// Trains one predictor per requested duration and persists them as a composite.
///
/// Nothing is written until every duration has trained, and the composite row
/// itself is only written after all predictors are saved.
pub struct CompositeTrainer {
    archive: Arc<dyn FundamentalsArchive>,
    trainer: Arc<dyn RegressionTrainer>,
    store: Arc<dyn ModelStore>,
}

impl CompositeTrainer {
    pub fn new(
        archive: Arc<dyn FundamentalsArchive>,
        trainer: Arc<dyn RegressionTrainer>,
        store: Arc<dyn ModelStore>,
    ) -> Self {
        Self {
            archive,
            trainer,
            store,
        }
    }

    pub async fn train(&self, params: TrainingParameters) -> ForecastResult<TrainedComposite> {
        let mut durations = params.durations.clone();
        durations.sort();
        if let Some(w) = durations.windows(2).find(|w| w[0] == w[1]) {
            return Err(ForecastError::DegenerateInput(format!(
                "duration {} requested twice",
                w[0]
            )));
        }
        tracing::info!(
            index = %params.index_ticker,
            durations = durations.len(),
            algorithm = params.algorithm.label(),
            "composite training started"
        );

        let mut jobs = JoinSet::new();
        for duration in durations {
            let archive = self.archive.clone();
            let trainer = self.trainer.clone();
            let params = params.clone();
            jobs.spawn_blocking(move || {
                let mut session =
                    RegressionTrainingSession::for_duration(&params.index_ticker, duration, trainer)
                        .with_folds(params.folds)
                        .with_seed(params.seed);
                session.run(
                    archive.as_ref(),
                    params.size_limit,
                    params.test_fraction,
                    params.algorithm,
                    &params.hyperparameters,
                )
            });
        }

        let mut trained: Vec<(DurationPredictor, RegressionQualityMetrics)> = Vec::new();
        while let Some(joined) = jobs.join_next().await {
            let result = joined.map_err(|e| {
                ForecastError::training_failed("training task panicked", anyhow!(e))
            })?;
            match result {
                Ok(pair) => trained.push(pair),
                Err(e) => {
                    jobs.abort_all();
                    return Err(e);
                }
            }
        }
        trained.sort_by_key(|(p, _)| p.target_duration);

        let store = self.store.clone();
        let persisted = tokio::task::spawn_blocking(move || persist(store.as_ref(), params, trained))
            .await
            .map_err(|e| ForecastError::training_failed("persist task panicked", anyhow!(e)))??;
        Ok(persisted)
    }
}

fn persist(
    store: &dyn ModelStore,
    params: TrainingParameters,
    trained: Vec<(DurationPredictor, RegressionQualityMetrics)>,
) -> ForecastResult<TrainedComposite> {
    let mut predictors = Vec::with_capacity(trained.len());
    let mut metrics = Vec::with_capacity(trained.len());
    for (predictor, m) in trained {
        let name = params.model_name(predictor.target_duration);
        let id = store
            .save_predictor(&name, &predictor, &m)
            .map_err(ForecastError::Collaborator)?;
        metrics.push((predictor.target_duration, m));
        predictors.push(predictor.with_id(id));
    }
    let composite_name = format!(
        "{}-{}-composite",
        params.index_ticker.to_ascii_lowercase(),
        params.algorithm.label()
    );
    let composite = CompositeModel::new(params, predictors)?;
    let id = store
        .save_composite(&composite_name, &composite)
        .map_err(ForecastError::Collaborator)?;
    tracing::info!(%id, name = %composite_name, "composite training finished");
    Ok(TrainedComposite {
        composite: composite.with_id(id),
        metrics,
    })
}
