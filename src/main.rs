use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde_json::json;

use cagr_forecast::archive::InMemoryArchive;
use cagr_forecast::cache::InMemoryPredictionCache;
use cagr_forecast::cache_gate::PredictionCacheGate;
use cagr_forecast::composer::PredictionComposer;
use cagr_forecast::config::Config;
use cagr_forecast::model::FundamentalsBounds;
use cagr_forecast::model_store::{ModelStore, SqliteModelStore};
use cagr_forecast::trainer::RidgeTrainer;
use cagr_forecast::training::CompositeTrainer;

const USAGE: &str = "usage: cagr-forecast train\n       cagr-forecast predict <composite-id> <symbol> [as-of YYYY-MM-DD]";

enum Command {
    Train,
    Predict {
        composite_id: String,
        symbol: String,
        as_of: Option<NaiveDate>,
    },
}

fn parse_args(args: &[String]) -> Result<Command> {
    match args.first().map(String::as_str) {
        Some("train") if args.len() == 1 => Ok(Command::Train),
        Some("predict") if (3..=4).contains(&args.len()) => {
            let as_of = args
                .get(3)
                .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
                .transpose()
                .context("as-of must be YYYY-MM-DD")?;
            Ok(Command::Predict {
                composite_id: args[1].clone(),
                symbol: args[2].clone(),
                as_of,
            })
        }
        _ => bail!("{}", USAGE),
    }
}

fn open_archive(config: &Config) -> Result<Arc<InMemoryArchive>> {
    let archive =
        InMemoryArchive::from_json_path(&config.storage.dataset_path, FundamentalsBounds::default())?;
    Ok(Arc::new(archive))
}

fn open_store(config: &Config) -> Result<Arc<SqliteModelStore>> {
    Ok(Arc::new(SqliteModelStore::open(
        &config.storage.model_store_path,
        RidgeTrainer::decode,
    )?))
}

async fn run_train(config: &Config) -> Result<()> {
    let params = config.training.parameters()?;
    let trainer = CompositeTrainer::new(
        open_archive(config)?,
        Arc::new(RidgeTrainer::new()),
        open_store(config)?,
    );
    let trained = trainer.train(params).await?;
    let metrics: Vec<_> = trained
        .metrics
        .iter()
        .map(|(duration, m)| json!({ "target_duration": duration, "metrics": m }))
        .collect();
    let out = json!({
        "composite_id": trained.composite.id,
        "parameters": trained.composite.parameters,
        "predictors": metrics,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn run_predict(
    config: &Config,
    composite_id: &str,
    symbol: &str,
    as_of: Option<NaiveDate>,
) -> Result<()> {
    let store = open_store(config)?;
    let composite = Arc::new(store.load_composite(composite_id)?);
    let composer = PredictionComposer::new(open_archive(config)?, config.prediction.max_concurrency);
    let gate = PredictionCacheGate::new(
        composer,
        Arc::new(InMemoryPredictionCache::new(config.cache.ttl())),
    );
    let trends = gate.predict(composite, symbol, as_of).await?;
    tracing::info!(stats = ?gate.stats(), "prediction request served");
    println!("{}", serde_json::to_string_pretty(&trends)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            eprintln!("Set CAGR_FORECAST_CONFIG or run from a directory containing config/default.toml");
            std::process::exit(1);
        }
    };

    // stdout carries the JSON result
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(config.logging.level.as_str())
            }),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .json()
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    tracing::info!(
        dataset = %config.storage.dataset_path.display(),
        model_store = %config.storage.model_store_path.display(),
        "Starting cagr-forecast"
    );

    match command {
        Command::Train => run_train(&config).await,
        Command::Predict {
            composite_id,
            symbol,
            as_of,
        } => run_predict(&config, &composite_id, &symbol, as_of).await,
    }
}
