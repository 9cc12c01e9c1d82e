mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};

use cagr_forecast::cache::{InMemoryPredictionCache, PredictionCache};
use cagr_forecast::cache_gate::{cache_key, CacheGateStats, PredictionCacheGate};
use cagr_forecast::composer::PredictionComposer;
use cagr_forecast::model::{CompositeModel, DurationPredictor, TargetDuration, TrainingParameters};

use common::{date, fixed};

struct UnavailableCache {
    calls: AtomicUsize,
}

impl PredictionCache for UnavailableCache {
    fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        bail!("connection refused")
    }

    fn set(&self, _key: &str, _value: Vec<u8>) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        bail!("connection refused")
    }
}

fn composite(id: Option<&str>) -> Arc<CompositeModel> {
    let params = TrainingParameters::new(
        common::INDEX,
        vec![TargetDuration::Months12, TargetDuration::Months36],
    );
    let model = CompositeModel::new(
        params,
        vec![
            DurationPredictor::new(TargetDuration::Months12, 1.5, fixed(8.0)),
            DurationPredictor::new(TargetDuration::Months36, 2.5, fixed(6.0)),
        ],
    )
    .expect("composite");
    Arc::new(match id {
        Some(id) => model.with_id(id),
        None => model,
    })
}

fn gate_with(cache: Arc<dyn PredictionCache>) -> PredictionCacheGate {
    let archive = Arc::new(common::synthetic_archive(2));
    PredictionCacheGate::new(PredictionComposer::new(archive, 4), cache)
}

#[tokio::test]
/// Two concurrent index requests coalesce: one computes, the other reads the
/// cached result, and both see the same trends.
async fn concurrent_index_requests_compute_once() {
    let cache = Arc::new(InMemoryPredictionCache::new(Duration::from_secs(60)));
    let gate = gate_with(cache.clone());
    let model = composite(Some("Model-1"));

    let (a, b) = tokio::join!(
        gate.predict(model.clone(), "test", None),
        gate.predict(model.clone(), "TEST", None)
    );
    let a = a.expect("first request");
    let b = b.expect("second request");
    assert_eq!(a.len(), 10);
    assert_eq!(a, b);
    assert_eq!(
        gate.stats(),
        CacheGateStats {
            hits: 1,
            misses: 1,
            backend_errors: 0
        }
    );
    assert!(cache
        .get(&cache_key("model-1", "test"))
        .expect("cache read")
        .is_some());

    let again = gate.predict(model, "Test", None).await.expect("third request");
    assert_eq!(again, a);
    assert_eq!(gate.stats().hits, 2);
}

#[tokio::test]
/// Single-ticker requests never touch the cache.
async fn single_ticker_requests_bypass_cache() {
    let cache = Arc::new(InMemoryPredictionCache::new(Duration::from_secs(60)));
    let gate = gate_with(cache.clone());
    let trends = gate
        .predict(composite(Some("m")), "T01", None)
        .await
        .expect("predict");
    assert_eq!(trends.len(), 1);
    assert_eq!(trends[0].points.len(), 2);
    assert_eq!(gate.stats(), CacheGateStats::default());
    assert!(cache.is_empty());
}

#[tokio::test]
/// Unsaved composites and point-in-time requests are computed fresh.
async fn unsaved_composite_and_as_of_requests_bypass_cache() {
    let cache = Arc::new(InMemoryPredictionCache::new(Duration::from_secs(60)));
    let gate = gate_with(cache.clone());

    let trends = gate
        .predict(composite(None), "TEST", None)
        .await
        .expect("predict");
    assert_eq!(trends.len(), 10);

    let dated = gate
        .predict(composite(Some("m")), "TEST", Some(date(2012, 6, 15)))
        .await
        .expect("predict");
    assert_eq!(dated.len(), 10);
    assert!(dated
        .iter()
        .all(|t| t.points[0].starting_date == date(2012, 6, 1)));

    assert_eq!(gate.stats(), CacheGateStats::default());
    assert!(cache.is_empty());
}

#[tokio::test]
/// A failing cache backend degrades to computing fresh; errors are counted, not returned.
async fn backend_failure_degrades_to_fresh_compute() {
    let cache = Arc::new(UnavailableCache {
        calls: AtomicUsize::new(0),
    });
    let gate = gate_with(cache.clone());
    let model = composite(Some("m"));

    let first = gate.predict(model.clone(), "TEST", None).await.expect("predict");
    let second = gate.predict(model, "TEST", None).await.expect("predict");
    assert_eq!(first, second);
    assert_eq!(first.len(), 10);

    let stats = gate.stats();
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.backend_errors, 4);
    assert_eq!(cache.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn unknown_symbol_is_an_empty_result_not_an_error() {
    let gate = gate_with(Arc::new(InMemoryPredictionCache::disabled()));
    let trends = gate
        .predict(composite(Some("m")), "NOPE", None)
        .await
        .expect("predict");
    assert!(trends.is_empty());
}
