use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use serde::Serialize;

use crate::cache::PredictionCache;
use crate::composer::PredictionComposer;
use crate::error::ForecastResult;
use crate::model::{CompositeModel, PriceTrendPrediction};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheGateStats {
    pub hits: u64,
    pub misses: u64,
    pub backend_errors: u64,
}

pub fn cache_key(composite_id: &str, ticker: &str) -> String {
    format!(
        "{}:{}",
        composite_id.trim().to_ascii_lowercase(),
        ticker.trim().to_ascii_uppercase()
    )
}

/// Memoizes index-wide trend predictions per `(composite, index)`.
///
/// Single tickers, composites without an id and point-in-time (`as_of`)
/// requests always go straight to the composer. Concurrent misses on one key
/// wait for a single computation. Backend failures are logged and bypassed.
pub struct PredictionCacheGate {
    composer: PredictionComposer,
    cache: Arc<dyn PredictionCache>,
    in_flight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    backend_errors: AtomicU64,
}

impl PredictionCacheGate {
    pub fn new(composer: PredictionComposer, cache: Arc<dyn PredictionCache>) -> Self {
        Self {
            composer,
            cache,
            in_flight: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            backend_errors: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> CacheGateStats {
        CacheGateStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            backend_errors: self.backend_errors.load(Ordering::Relaxed),
        }
    }

    pub async fn predict(
        &self,
        composite: Arc<CompositeModel>,
        symbol: &str,
        as_of: Option<NaiveDate>,
    ) -> ForecastResult<Vec<PriceTrendPrediction>> {
        let resolution = self.composer.resolve(symbol)?;
        let cacheable = resolution.is_index && as_of.is_none();
        let key = match composite.id.as_deref() {
            Some(id) if cacheable => cache_key(id, &resolution.symbol),
            _ => {
                return self
                    .composer
                    .predict_tickers(composite, resolution.tickers, as_of)
                    .await
            }
        };

        let flight = self.flight(&key);
        let guard = match &flight {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        let result = match self.lookup(&key) {
            Some(trends) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(%key, "prediction cache hit");
                Ok(trends)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(%key, "prediction cache miss");
                let computed = self
                    .composer
                    .predict_tickers(composite, resolution.tickers, None)
                    .await;
                if let Ok(trends) = &computed {
                    self.store(&key, trends);
                }
                computed
            }
        };

        drop(guard);
        if let Some(lock) = flight {
            self.release(&key, lock);
        }
        result
    }

    fn flight(&self, key: &str) -> Option<Arc<tokio::sync::Mutex<()>>> {
        match self.in_flight.lock() {
            Ok(mut map) => Some(map.entry(key.to_string()).or_default().clone()),
            Err(_) => {
                tracing::warn!(%key, "in-flight table poisoned, computing without coalescing");
                None
            }
        }
    }

    fn release(&self, key: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        if let Ok(mut map) = self.in_flight.lock() {
            // our clone plus the map's
            if Arc::strong_count(&lock) <= 2 {
                map.remove(key);
            }
        }
    }

    fn lookup(&self, key: &str) -> Option<Vec<PriceTrendPrediction>> {
        let bytes = match self.cache.get(key) {
            Ok(found) => found?,
            Err(e) => {
                self.backend_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%key, error = %e, "prediction cache read failed");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(trends) => Some(trends),
            Err(e) => {
                self.backend_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%key, error = %e, "cached predictions unreadable");
                None
            }
        }
    }

    fn store(&self, key: &str, trends: &[PriceTrendPrediction]) {
        let bytes = match serde_json::to_vec(trends) {
            Ok(b) => b,
            Err(e) => {
                self.backend_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%key, error = %e, "failed to serialize predictions for cache");
                return;
            }
        };
        if let Err(e) = self.cache.set(key, bytes) {
            self.backend_errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(%key, error = %e, "prediction cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_case_normalized() {
        assert_eq!(cache_key("ABC-1", " spy "), "abc-1:SPY");
        assert_eq!(cache_key("abc-1", "SPY"), cache_key("Abc-1", "spy"));
    }
}
