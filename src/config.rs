use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::model::{TargetDuration, TrainingParameters};
use crate::trainer::{Hyperparameters, TrainingAlgorithm};

pub const CONFIG_PATH_ENV: &str = "CAGR_FORECAST_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub training: TrainingConfig,
    pub prediction: PredictionConfig,
    pub cache: CacheConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    pub index_ticker: String,
    pub durations: Vec<u32>,
    /// "tree" or "auto".
    pub algorithm: String,
    pub number_of_trees: u32,
    pub number_of_leaves: u32,
    pub minimum_example_count_per_leaf: u32,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_l2")]
    pub l2_regularization: f64,
    pub test_fraction: f64,
    pub folds: usize,
    pub seed: u64,
    #[serde(default)]
    pub size_limit: Option<usize>,
    #[serde(default = "default_search_seconds")]
    pub max_training_time_seconds: u64,
}

fn default_learning_rate() -> f64 {
    Hyperparameters::default().learning_rate
}

fn default_l2() -> f64 {
    Hyperparameters::default().l2_regularization
}

fn default_search_seconds() -> u64 {
    crate::trainer::DEFAULT_MAX_TRAINING_TIME_SECONDS
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictionConfig {
    pub max_concurrency: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub model_store_path: PathBuf,
    pub dataset_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl TrainingConfig {
    pub fn algorithm(&self) -> Result<TrainingAlgorithm> {
        match self.algorithm.trim().to_ascii_lowercase().as_str() {
            "tree" | "tree_ensemble" => Ok(TrainingAlgorithm::TreeEnsemble),
            "auto" | "automated_search" => Ok(TrainingAlgorithm::AutomatedSearch {
                max_training_time_seconds: self.max_training_time_seconds,
            }),
            other => bail!(
                "invalid training.algorithm '{}': expected 'tree' or 'auto'",
                other
            ),
        }
    }

    pub fn hyperparameters(&self) -> Hyperparameters {
        Hyperparameters {
            number_of_trees: self.number_of_trees,
            number_of_leaves: self.number_of_leaves,
            minimum_example_count_per_leaf: self.minimum_example_count_per_leaf,
            learning_rate: self.learning_rate,
            l2_regularization: self.l2_regularization,
        }
    }

    pub fn parameters(&self) -> Result<TrainingParameters> {
        let mut params = TrainingParameters::from_months(&self.index_ticker, &self.durations)
            .context("training.durations is invalid")?;
        params.algorithm = self.algorithm()?;
        params.hyperparameters = self.hyperparameters();
        params.test_fraction = self.test_fraction;
        params.folds = self.folds;
        params.seed = self.seed;
        params.size_limit = self.size_limit;
        Ok(params)
    }

    fn validate(&self) -> Result<()> {
        if self.index_ticker.trim().is_empty() {
            bail!("training.index_ticker must not be empty");
        }
        for m in &self.durations {
            TargetDuration::try_from(*m).context("training.durations is invalid")?;
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            bail!(
                "training.test_fraction must be in (0, 1), got {}",
                self.test_fraction
            );
        }
        if self.folds < 2 {
            bail!("training.folds must be >= 2, got {}", self.folds);
        }
        self.algorithm()?;
        Ok(())
    }
}

impl CacheConfig {
    /// Zero when caching is disabled.
    pub fn ttl(&self) -> Duration {
        if self.enabled {
            Duration::from_secs(self.ttl_seconds)
        } else {
            Duration::ZERO
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config_path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from_path(&config_path)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::load_from_str(&config_str)
            .with_context(|| format!("failed to load {}", path.display()))
    }

    pub fn load_from_str(config_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(config_str).context("failed to parse config toml")?;
        config.training.validate()?;
        if config.prediction.max_concurrency == 0 {
            bail!("prediction.max_concurrency must be > 0");
        }
        Ok(config)
    }
}
