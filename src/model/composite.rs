use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, ForecastResult};
use crate::model::duration::TargetDuration;
use crate::model::fundamentals::FundamentalsSnapshot;
use crate::trainer::{Hyperparameters, Regressor, TrainingAlgorithm};

/// A trained regressor bound to one forecast horizon.
#[derive(Clone)]
pub struct DurationPredictor {
    pub id: Option<String>,
    pub target_duration: TargetDuration,
    pub root_mean_squared_error: f64,
    model: Arc<dyn Regressor>,
}

impl DurationPredictor {
    pub fn new(
        target_duration: TargetDuration,
        root_mean_squared_error: f64,
        model: Arc<dyn Regressor>,
    ) -> Self {
        let rmse = if root_mean_squared_error.is_finite() && root_mean_squared_error >= 0.0 {
            root_mean_squared_error
        } else {
            tracing::warn!(
                duration = %target_duration,
                rmse = root_mean_squared_error,
                "invalid rmse clamped to 0; confidence band will have zero width"
            );
            0.0
        };
        Self {
            id: None,
            target_duration,
            root_mean_squared_error: rmse,
            model,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn model(&self) -> &dyn Regressor {
        self.model.as_ref()
    }

    /// Predicted CAGR in percent for `snapshot`.
    pub fn predict_cagr(&self, snapshot: &FundamentalsSnapshot) -> anyhow::Result<f64> {
        let y = self.model.predict(&snapshot.features())?;
        if !y.is_finite() {
            anyhow::bail!("model produced non-finite output {}", y);
        }
        Ok(y)
    }
}

impl fmt::Debug for DurationPredictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DurationPredictor")
            .field("id", &self.id)
            .field("target_duration", &self.target_duration)
            .field("root_mean_squared_error", &self.root_mean_squared_error)
            .field("model", &self.model.kind())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingParameters {
    pub index_ticker: String,
    pub durations: Vec<TargetDuration>,
    pub algorithm: TrainingAlgorithm,
    pub hyperparameters: Hyperparameters,
    pub test_fraction: f64,
    pub folds: usize,
    pub seed: u64,
    pub size_limit: Option<usize>,
}

impl TrainingParameters {
    pub fn new(index_ticker: impl Into<String>, durations: Vec<TargetDuration>) -> Self {
        Self {
            index_ticker: index_ticker.into().trim().to_ascii_uppercase(),
            durations,
            algorithm: TrainingAlgorithm::TreeEnsemble,
            hyperparameters: Hyperparameters::default(),
            test_fraction: 0.2,
            folds: 4,
            seed: 7,
            size_limit: None,
        }
    }

    /// Accepts raw month counts and rejects unsupported horizons up front.
    pub fn from_months(index_ticker: impl Into<String>, months: &[u32]) -> ForecastResult<Self> {
        let durations = months
            .iter()
            .map(|m| TargetDuration::try_from(*m))
            .collect::<ForecastResult<Vec<_>>>()?;
        Ok(Self::new(index_ticker, durations))
    }

    pub fn model_name(&self, duration: TargetDuration) -> String {
        format!(
            "{}-{}-{}",
            self.index_ticker.to_ascii_lowercase(),
            self.algorithm.label(),
            duration.label()
        )
    }
}

/// Duration predictors trained together under one parameter set.
///
/// Read-only once built; retraining produces a new composite.
#[derive(Debug, Clone)]
pub struct CompositeModel {
    pub id: Option<String>,
    pub parameters: TrainingParameters,
    predictors: Vec<DurationPredictor>,
}

impl CompositeModel {
    pub fn new(
        parameters: TrainingParameters,
        mut predictors: Vec<DurationPredictor>,
    ) -> ForecastResult<Self> {
        predictors.sort_by_key(|p| p.target_duration);
        if let Some(w) = predictors
            .windows(2)
            .find(|w| w[0].target_duration == w[1].target_duration)
        {
            return Err(ForecastError::DegenerateInput(format!(
                "composite holds two predictors for {}",
                w[0].target_duration
            )));
        }
        Ok(Self {
            id: None,
            parameters,
            predictors,
        })
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Predictors in ascending duration order.
    pub fn predictors(&self) -> &[DurationPredictor] {
        &self.predictors
    }

    pub fn predictor_for(&self, duration: TargetDuration) -> Option<&DurationPredictor> {
        self.predictors
            .iter()
            .find(|p| p.target_duration == duration)
    }

    pub fn is_empty(&self) -> bool {
        self.predictors.is_empty()
    }
}
