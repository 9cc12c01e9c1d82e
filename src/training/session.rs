use std::sync::Arc;
use std::time::Duration;

use crate::archive::FundamentalsArchive;
use crate::error::{ForecastError, ForecastResult};
use crate::evaluation::{CrossValidationAnalyzer, DEFAULT_FOLDS};
use crate::model::{
    CrossValidationAgreement, Dataset, DurationPredictor, RegressionQualityMetrics,
    TargetDuration,
};
use crate::stats::RegressionMetrics;
use crate::trainer::{Hyperparameters, RegressionTrainer, Regressor, TrainingAlgorithm};
use crate::training::search::automated_search;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    DataLoaded,
    Split,
    Trained,
    Evaluated,
    Failed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::DataLoaded => "data_loaded",
            Self::Split => "split",
            Self::Trained => "trained",
            Self::Evaluated => "evaluated",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Evaluated | Self::Failed)
    }
}

/// One training job: `Created → DataLoaded → Split → Trained → Evaluated`.
///
/// Any unrecoverable error moves the session to `Failed`. Calling an
/// operation out of order returns `InvalidState` and leaves the state alone.
pub struct RegressionTrainingSession {
    index_ticker: String,
    duration: TargetDuration,
    trainer: Arc<dyn RegressionTrainer>,
    folds: usize,
    seed: u64,
    state: SessionState,
    dataset: Option<Dataset>,
    train: Option<Dataset>,
    test: Option<Dataset>,
    model: Option<Arc<dyn Regressor>>,
    cross_validation: Option<CrossValidationAgreement>,
    metrics: Option<RegressionQualityMetrics>,
}

impl RegressionTrainingSession {
    pub fn new(
        index_ticker: &str,
        target_duration_months: u32,
        trainer: Arc<dyn RegressionTrainer>,
    ) -> ForecastResult<Self> {
        let duration = TargetDuration::try_from(target_duration_months)?;
        Ok(Self::for_duration(index_ticker, duration, trainer))
    }

    pub fn for_duration(
        index_ticker: &str,
        duration: TargetDuration,
        trainer: Arc<dyn RegressionTrainer>,
    ) -> Self {
        Self {
            index_ticker: index_ticker.trim().to_ascii_uppercase(),
            duration,
            trainer,
            folds: DEFAULT_FOLDS,
            seed: 7,
            state: SessionState::Created,
            dataset: None,
            train: None,
            test: None,
            model: None,
            cross_validation: None,
            metrics: None,
        }
    }

    pub fn with_folds(mut self, folds: usize) -> Self {
        self.folds = folds;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn duration(&self) -> TargetDuration {
        self.duration
    }

    pub fn cross_validation(&self) -> Option<&CrossValidationAgreement> {
        self.cross_validation.as_ref()
    }

    pub fn metrics(&self) -> Option<&RegressionQualityMetrics> {
        self.metrics.as_ref()
    }

    fn require(&self, expected: SessionState, operation: &'static str) -> ForecastResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ForecastError::InvalidState {
                operation,
                state: self.state.as_str(),
            })
        }
    }

    fn transition(&mut self, next: SessionState) {
        tracing::info!(
            index = %self.index_ticker,
            duration = %self.duration,
            from = self.state.as_str(),
            to = next.as_str(),
            "training session transition"
        );
        self.state = next;
    }

    fn fail<T>(&mut self, err: ForecastError) -> ForecastResult<T> {
        tracing::error!(
            index = %self.index_ticker,
            duration = %self.duration,
            state = self.state.as_str(),
            error = %err,
            "training session failed"
        );
        self.state = SessionState::Failed;
        Err(err)
    }

    pub fn load_data(
        &mut self,
        archive: &dyn FundamentalsArchive,
        size_limit: Option<usize>,
    ) -> ForecastResult<&Dataset> {
        self.require(SessionState::Created, "load data")?;
        let dataset = match archive.training_dataset(&self.index_ticker, self.duration, size_limit) {
            Ok(d) => d,
            Err(e) => return self.fail(ForecastError::Collaborator(e)),
        };
        if dataset.is_empty() {
            return self.fail(ForecastError::InsufficientData {
                needed: 2,
                actual: 0,
            });
        }
        tracing::info!(rows = dataset.len(), "training dataset loaded");
        self.transition(SessionState::DataLoaded);
        Ok(self.dataset.insert(dataset))
    }

    pub fn split(&mut self, test_fraction: f64) -> ForecastResult<(&Dataset, &Dataset)> {
        self.require(SessionState::DataLoaded, "split")?;
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(ForecastError::DegenerateInput(format!(
                "test fraction must be in (0, 1), got {}",
                test_fraction
            )));
        }
        let Some(dataset) = self.dataset.take() else {
            return self.fail(ForecastError::NotYetEvaluated);
        };
        let (train, test) = match dataset.split(test_fraction, self.seed) {
            Ok(split) => split,
            Err(e) => return self.fail(e),
        };
        self.train = Some(train);
        self.test = Some(test);
        self.transition(SessionState::Split);
        match (&self.train, &self.test) {
            (Some(train), Some(test)) => Ok((train, test)),
            _ => Err(ForecastError::NotYetEvaluated),
        }
    }

    /// Fit the model. The returned predictor carries the in-sample RMSE; the
    /// held-out figure is available from [`Self::predictor`] after evaluation.
    pub fn train(
        &mut self,
        algorithm: TrainingAlgorithm,
        params: &Hyperparameters,
    ) -> ForecastResult<DurationPredictor> {
        self.require(SessionState::Split, "train")?;
        let (Some(train), Some(test)) = (self.train.clone(), self.test.clone()) else {
            return self.fail(ForecastError::NotYetEvaluated);
        };

        let model = match algorithm {
            TrainingAlgorithm::TreeEnsemble => {
                let model = match self.trainer.fit(&train, params) {
                    Ok(m) => m,
                    Err(e) => {
                        return self.fail(ForecastError::training_failed("tree ensemble fit", e))
                    }
                };
                let mut analyzer =
                    CrossValidationAnalyzer::new(self.trainer.clone(), self.folds, self.seed);
                if let Err(e) = analyzer.cross_validate(&train, params) {
                    return self.fail(e);
                }
                match analyzer.agreement(&test) {
                    Ok(a) => self.cross_validation = Some(a),
                    Err(e) => return self.fail(e),
                }
                model
            }
            TrainingAlgorithm::AutomatedSearch {
                max_training_time_seconds,
            } => {
                let budget = Duration::from_secs(max_training_time_seconds);
                match automated_search(self.trainer.as_ref(), &train, params, budget, self.seed) {
                    Ok(outcome) => outcome.model,
                    Err(e) => return self.fail(e),
                }
            }
        };

        let in_sample = match self
            .trainer
            .transform(model.as_ref(), &train)
            .map_err(|e| ForecastError::training_failed("in-sample transform", e))
            .and_then(|p| RegressionMetrics::from_pairs(&train.labels(), &p))
        {
            Ok(m) => m,
            Err(e) => return self.fail(e),
        };

        self.model = Some(model.clone());
        self.transition(SessionState::Trained);
        Ok(DurationPredictor::new(
            self.duration,
            in_sample.root_mean_squared_error,
            model,
        ))
    }

    pub fn evaluate(&mut self) -> ForecastResult<RegressionQualityMetrics> {
        self.require(SessionState::Trained, "evaluate")?;
        let (Some(model), Some(test)) = (self.model.clone(), self.test.clone()) else {
            return self.fail(ForecastError::NotYetEvaluated);
        };
        let labels = test.labels();
        let result = self
            .trainer
            .transform(model.as_ref(), &test)
            .map_err(|e| ForecastError::training_failed("held-out transform", e))
            .and_then(|p| RegressionMetrics::from_pairs(&labels, &p));
        let metrics = match result {
            Ok(m) if !m.root_mean_squared_error.is_finite() => {
                return self.fail(ForecastError::DegenerateInput(format!(
                    "non-finite held-out rmse {}",
                    m.root_mean_squared_error
                )))
            }
            Ok(m) => RegressionQualityMetrics::from_parts(m, self.cross_validation.clone()),
            Err(e) => return self.fail(e),
        };
        tracing::info!(
            index = %self.index_ticker,
            duration = %self.duration,
            mae = metrics.mean_absolute_error,
            rmse = metrics.root_mean_squared_error,
            r2 = metrics.r_squared,
            "held-out evaluation complete"
        );
        self.metrics = Some(metrics.clone());
        self.transition(SessionState::Evaluated);
        Ok(metrics)
    }

    /// The trained predictor tagged with its held-out RMSE.
    pub fn predictor(&self) -> ForecastResult<DurationPredictor> {
        self.require(SessionState::Evaluated, "build predictor")?;
        match (&self.model, &self.metrics) {
            (Some(model), Some(metrics)) => Ok(DurationPredictor::new(
                self.duration,
                metrics.root_mean_squared_error,
                model.clone(),
            )),
            _ => Err(ForecastError::NotYetEvaluated),
        }
    }

    /// Run every step with default split settings.
    pub fn run(
        &mut self,
        archive: &dyn FundamentalsArchive,
        size_limit: Option<usize>,
        test_fraction: f64,
        algorithm: TrainingAlgorithm,
        params: &Hyperparameters,
    ) -> ForecastResult<(DurationPredictor, RegressionQualityMetrics)> {
        self.load_data(archive, size_limit)?;
        self.split(test_fraction)?;
        self.train(algorithm, params)?;
        let metrics = self.evaluate()?;
        Ok((self.predictor()?, metrics))
    }
}
