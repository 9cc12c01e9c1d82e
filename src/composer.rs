use std::collections::HashSet;
use std::sync::Arc;

use anyhow::anyhow;
use chrono::{Months, NaiveDate};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::archive::FundamentalsArchive;
use crate::cagr::project_price;
use crate::error::{ForecastError, ForecastResult};
use crate::model::{
    CompositeModel, DurationPredictor, FundamentalsSnapshot, PointOutcome, PricePointPrediction,
    PriceTrendPrediction,
};

/// Run `predictor` against `snapshot`.
///
/// Inference errors never escape: they come back as a `Failed` point.
pub fn predict_point(
    predictor: &DurationPredictor,
    snapshot: &FundamentalsSnapshot,
) -> PricePointPrediction {
    let months = predictor.target_duration.months();
    let ending_date = snapshot
        .date
        .checked_add_months(Months::new(months))
        .unwrap_or(NaiveDate::MAX);

    let outcome = match predictor.predict_cagr(snapshot) {
        Ok(cagr) => {
            let rmse = predictor.root_mean_squared_error;
            let start = snapshot.close_price;
            let low = project_price(start, cagr - rmse, months);
            let high = project_price(start, cagr + rmse, months);
            PointOutcome::Success {
                predicted_cagr: cagr,
                predicted_ending_price: project_price(start, cagr, months),
                cagr_range: (cagr - rmse, cagr + rmse),
                price_range: (low.min(high), low.max(high)),
            }
        }
        Err(e) => {
            let reason = format!("{:#}", e);
            let err = ForecastError::Inference {
                ticker: snapshot.ticker.clone(),
                reason: reason.clone(),
            };
            tracing::warn!(
                duration = %predictor.target_duration,
                error = %err,
                "point prediction failed"
            );
            PointOutcome::Failed { reason }
        }
    };

    PricePointPrediction {
        ticker: snapshot.ticker.clone(),
        period: predictor.target_duration,
        starting_date: snapshot.date,
        starting_price: snapshot.close_price,
        ending_date,
        outcome,
    }
}

/// One trend per distinct ticker, each holding a point for every predictor in
/// ascending duration order.
pub fn predict_trend(
    composite: &CompositeModel,
    snapshots: &[FundamentalsSnapshot],
) -> Vec<PriceTrendPrediction> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(snapshots.len());
    for snapshot in snapshots {
        if !seen.insert(snapshot.ticker.as_str()) {
            tracing::warn!(ticker = %snapshot.ticker, "duplicate snapshot ignored");
            continue;
        }
        out.push(PriceTrendPrediction {
            ticker: snapshot.ticker.clone(),
            points: composite
                .predictors()
                .iter()
                .map(|p| predict_point(p, snapshot))
                .collect(),
        });
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerResolution {
    pub symbol: String,
    pub is_index: bool,
    pub tickers: Vec<String>,
}

/// Expand an index symbol to its constituents; any other symbol maps to itself.
pub fn resolve_tickers(
    archive: &dyn FundamentalsArchive,
    symbol: &str,
) -> ForecastResult<TickerResolution> {
    let symbol = symbol.trim().to_ascii_uppercase();
    if symbol.is_empty() {
        return Err(ForecastError::DegenerateInput("empty symbol".to_string()));
    }
    let is_index = archive
        .is_index_ticker(&symbol)
        .map_err(ForecastError::Collaborator)?;
    let tickers = if is_index {
        archive
            .index_constituents(&symbol)
            .map_err(ForecastError::Collaborator)?
    } else {
        vec![symbol.clone()]
    };
    Ok(TickerResolution {
        symbol,
        is_index,
        tickers,
    })
}

/// Fetches snapshots and composes trends for a symbol, fanning tickers out
/// over a bounded number of blocking workers.
#[derive(Clone)]
pub struct PredictionComposer {
    archive: Arc<dyn FundamentalsArchive>,
    permits: Arc<Semaphore>,
}

impl PredictionComposer {
    pub fn new(archive: Arc<dyn FundamentalsArchive>, max_concurrency: usize) -> Self {
        Self {
            archive,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    pub fn resolve(&self, symbol: &str) -> ForecastResult<TickerResolution> {
        resolve_tickers(self.archive.as_ref(), symbol)
    }

    pub async fn predict_symbol(
        &self,
        composite: Arc<CompositeModel>,
        symbol: &str,
        as_of: Option<NaiveDate>,
    ) -> ForecastResult<Vec<PriceTrendPrediction>> {
        let resolution = self.resolve(symbol)?;
        self.predict_tickers(composite, resolution.tickers, as_of)
            .await
    }

    /// Trends sorted by ticker. Tickers whose snapshot cannot be fetched are
    /// skipped with a warning.
    pub async fn predict_tickers(
        &self,
        composite: Arc<CompositeModel>,
        tickers: Vec<String>,
        as_of: Option<NaiveDate>,
    ) -> ForecastResult<Vec<PriceTrendPrediction>> {
        let requested = tickers.len();
        let mut jobs = JoinSet::new();
        for ticker in tickers {
            let archive = self.archive.clone();
            let composite = composite.clone();
            let permits = self.permits.clone();
            jobs.spawn(async move {
                let _permit = permits.acquire_owned().await?;
                let trend = tokio::task::spawn_blocking(move || {
                    match archive.latest_snapshot(&ticker, as_of) {
                        Ok(snapshot) => predict_trend(&composite, std::slice::from_ref(&snapshot))
                            .into_iter()
                            .next(),
                        Err(e) => {
                            tracing::warn!(%ticker, error = %e, "snapshot fetch failed, skipping");
                            None
                        }
                    }
                })
                .await?;
                anyhow::Ok(trend)
            });
        }

        let mut trends = Vec::with_capacity(requested);
        while let Some(joined) = jobs.join_next().await {
            let trend = joined
                .map_err(|e| ForecastError::Collaborator(anyhow!(e)))?
                .map_err(ForecastError::Collaborator)?;
            trends.extend(trend);
        }
        trends.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        tracing::info!(
            requested,
            produced = trends.len(),
            failed_points = trends.iter().map(|t| t.failed_points()).sum::<usize>(),
            "trend predictions composed"
        );
        Ok(trends)
    }
}
