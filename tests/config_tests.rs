use std::path::Path;
use std::time::Duration;

use cagr_forecast::config::Config;
use cagr_forecast::model::TargetDuration;
use cagr_forecast::trainer::TrainingAlgorithm;

#[test]
/// The shipped default config parses, validates and maps to training parameters.
fn shipped_default_config_is_valid() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/default.toml");
    let config = Config::load_from_path(&path).expect("default config should load");

    let params = config.training.parameters().expect("parameters");
    assert_eq!(params.durations, TargetDuration::ALL.to_vec());
    assert_eq!(params.algorithm, TrainingAlgorithm::TreeEnsemble);
    assert_eq!(params.folds, 4);
    assert!(params.test_fraction > 0.0 && params.test_fraction < 1.0);
    assert!(config.prediction.max_concurrency > 0);
    assert!(config.cache.ttl() > Duration::ZERO);
}

#[test]
fn auto_algorithm_carries_search_budget() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/default.toml");
    let raw = std::fs::read_to_string(path).expect("read default config");
    let raw = raw
        .replace("algorithm = \"tree\"", "algorithm = \"auto\"")
        .replace("max_training_time_seconds = 300", "max_training_time_seconds = 45");
    let config = Config::load_from_str(&raw).expect("config");
    assert_eq!(
        config.training.algorithm().expect("algorithm"),
        TrainingAlgorithm::AutomatedSearch {
            max_training_time_seconds: 45
        }
    );
}

#[test]
fn missing_config_file_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    assert!(Config::load_from_path(&dir.path().join("absent.toml")).is_err());
}
