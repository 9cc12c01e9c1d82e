//! Trainer capability consumed by training and evaluation.
//!
//! The regression engine is opaque to the rest of the crate: anything that can
//! `fit` a [`Dataset`] into a [`Regressor`] and `transform` rows through it can
//! back a training session.

pub mod ridge;

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::Dataset;

pub use ridge::{RidgeRegressor, RidgeTrainer};

pub const DEFAULT_MAX_TRAINING_TIME_SECONDS: u64 = 300;

pub trait Regressor: Send + Sync {
    /// Short engine label used in logs and persisted metadata.
    fn kind(&self) -> &'static str;
    fn predict(&self, features: &[f64]) -> Result<f64>;
    fn encode(&self) -> Result<Vec<u8>>;
}

pub trait RegressionTrainer: Send + Sync {
    fn fit(&self, data: &Dataset, params: &Hyperparameters) -> Result<Arc<dyn Regressor>>;

    fn transform(&self, model: &dyn Regressor, data: &Dataset) -> Result<Vec<f64>> {
        data.examples
            .iter()
            .map(|e| {
                model
                    .predict(&e.snapshot.features())
                    .with_context(|| format!("transform failed for {}", e.snapshot.ticker))
            })
            .collect()
    }
}

/// Rebuilds a regressor from bytes produced by [`Regressor::encode`].
pub type RegressorDecoder = fn(&[u8]) -> Result<Arc<dyn Regressor>>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub number_of_trees: u32,
    pub number_of_leaves: u32,
    pub minimum_example_count_per_leaf: u32,
    pub learning_rate: f64,
    pub l2_regularization: f64,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            number_of_trees: 100,
            number_of_leaves: 20,
            minimum_example_count_per_leaf: 10,
            learning_rate: 0.2,
            l2_regularization: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrainingAlgorithm {
    TreeEnsemble,
    AutomatedSearch { max_training_time_seconds: u64 },
}

impl TrainingAlgorithm {
    pub fn automated_search() -> Self {
        Self::AutomatedSearch {
            max_training_time_seconds: DEFAULT_MAX_TRAINING_TIME_SECONDS,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::TreeEnsemble => "tree",
            Self::AutomatedSearch { .. } => "auto",
        }
    }
}
