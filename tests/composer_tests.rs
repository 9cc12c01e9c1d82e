mod common;

use std::sync::Arc;

use cagr_forecast::archive::InMemoryArchive;
use cagr_forecast::composer::{predict_point, predict_trend, resolve_tickers, PredictionComposer};
use cagr_forecast::model::{
    CompositeModel, DurationPredictor, FundamentalsBounds, PointOutcome, TargetDuration,
    TrainingParameters,
};

use common::{date, fixed, snapshot, BrokenRegressor};

fn composite_of(predictors: Vec<DurationPredictor>) -> CompositeModel {
    let params = TrainingParameters::new(common::INDEX, predictors.iter().map(|p| p.target_duration).collect());
    CompositeModel::new(params, predictors).expect("composite")
}

#[test]
/// 100 at 10%/yr over 24 months with a 2pt RMSE band: 121 expected, 116.64..125.44.
fn point_prediction_applies_cagr_and_rmse_band() {
    let predictor = DurationPredictor::new(TargetDuration::Months24, 2.0, fixed(10.0));
    let snap = snapshot("ACME", date(2024, 1, 31), 100.0, 15.0);
    let point = predict_point(&predictor, &snap);

    assert_eq!(point.ticker, "ACME");
    assert_eq!(point.period, TargetDuration::Months24);
    assert_eq!(point.starting_price, 100.0);
    assert_eq!(point.ending_date, date(2026, 1, 31));
    match point.outcome {
        PointOutcome::Success {
            predicted_cagr,
            predicted_ending_price,
            cagr_range,
            price_range,
        } => {
            assert_eq!(predicted_cagr, 10.0);
            assert!((predicted_ending_price - 121.0).abs() < 1e-9);
            assert_eq!(cagr_range, (8.0, 12.0));
            assert!((price_range.0 - 116.64).abs() < 1e-9);
            assert!((price_range.1 - 125.44).abs() < 1e-9);
        }
        PointOutcome::Failed { reason } => panic!("unexpected failure: {}", reason),
    }
}

#[test]
fn zero_cagr_keeps_starting_price() {
    let snap = snapshot("ACME", date(2023, 6, 30), 42.5, 15.0);
    for duration in TargetDuration::ALL {
        let predictor = DurationPredictor::new(duration, 0.0, fixed(0.0));
        let point = predict_point(&predictor, &snap);
        assert_eq!(point.predicted_ending_price(), Some(42.5));
    }
}

#[test]
/// Inference failure yields a null point with the rest of the record intact.
fn failed_inference_yields_null_point() {
    let predictor = DurationPredictor::new(TargetDuration::Months12, 3.0, Arc::new(BrokenRegressor));
    let snap = snapshot("BAD", date(2024, 2, 29), 80.0, 15.0);
    let point = predict_point(&predictor, &snap);
    assert!(point.is_failed());

    let v = serde_json::to_value(&point).expect("serialize");
    assert!(v["predicted_cagr"].is_null());
    assert!(v["predicted_ending_price"].is_null());
    assert!(v["expected_cagr_range_low"].is_null());
    assert!(v["expected_price_range_low"].is_null());
    assert_eq!(v["ticker"], "BAD");
    assert_eq!(v["starting_price"], 80.0);
    assert_eq!(v["starting_date"], "2024-02-29");
    assert_eq!(v["ending_date"], "2025-02-28");
    assert_eq!(v["period"], 12);
}

#[test]
/// Points within a trend come out in ascending duration order regardless of
/// the order predictors were supplied in, and one bad ticker does not stop the batch.
fn trend_orders_points_by_duration() {
    let composite = composite_of(vec![
        DurationPredictor::new(TargetDuration::Months60, 1.0, fixed(5.0)),
        DurationPredictor::new(TargetDuration::Months12, 1.0, fixed(9.0)),
        DurationPredictor::new(TargetDuration::Months36, 1.0, fixed(6.0)),
    ]);
    let snaps = vec![
        snapshot("AAA", date(2024, 1, 2), 10.0, 12.0),
        snapshot("BBB", date(2024, 1, 2), 20.0, 30.0),
    ];
    let trends = predict_trend(&composite, &snaps);
    assert_eq!(trends.len(), 2);
    for trend in &trends {
        let months: Vec<u32> = trend.points.iter().map(|p| p.period.months()).collect();
        assert_eq!(months, vec![12, 36, 60]);
        assert_eq!(trend.failed_points(), 0);
    }

    let mixed = composite_of(vec![
        DurationPredictor::new(TargetDuration::Months12, 1.0, fixed(9.0)),
        DurationPredictor::new(TargetDuration::Months24, 1.0, Arc::new(BrokenRegressor)),
    ]);
    let trends = predict_trend(&mixed, &snaps);
    assert_eq!(trends.len(), 2);
    assert!(trends.iter().all(|t| t.failed_points() == 1));
}

#[test]
fn index_symbol_expands_to_constituents() {
    let archive = common::synthetic_archive(1);
    let index = resolve_tickers(&archive, "test").expect("resolve");
    assert!(index.is_index);
    assert_eq!(index.tickers.len(), 10);

    let single = resolve_tickers(&archive, " t03 ").expect("resolve");
    assert!(!single.is_index);
    assert_eq!(single.tickers, vec!["T03".to_string()]);
}

#[tokio::test]
/// Index requests fan out per constituent; a constituent without any archived
/// snapshot is skipped and the rest come back sorted by ticker.
async fn predict_symbol_fans_out_and_skips_missing_snapshots() {
    let mut archive = InMemoryArchive::new(FundamentalsBounds::default());
    archive.insert_index("MINI", vec!["ZZZ".into(), "AAA".into(), "GONE".into(), "MMM".into()]);
    for (ticker, price) in [("ZZZ", 10.0), ("AAA", 20.0), ("MMM", 30.0)] {
        archive.insert_snapshot(snapshot(ticker, date(2024, 3, 1), price, 15.0));
    }
    let composer = PredictionComposer::new(Arc::new(archive), 2);
    let composite = Arc::new(composite_of(vec![
        DurationPredictor::new(TargetDuration::Months12, 1.0, fixed(10.0)),
        DurationPredictor::new(TargetDuration::Months24, 1.0, fixed(10.0)),
    ]));

    let trends = composer
        .predict_symbol(composite.clone(), "mini", None)
        .await
        .expect("predict");
    let tickers: Vec<&str> = trends.iter().map(|t| t.ticker.as_str()).collect();
    assert_eq!(tickers, vec!["AAA", "MMM", "ZZZ"]);
    assert!((trends[0].points[0].predicted_ending_price().expect("price") - 22.0).abs() < 1e-9);

    let none_yet = composer
        .predict_symbol(composite, "AAA", Some(date(2020, 1, 1)))
        .await
        .expect("predict");
    assert!(none_yet.is_empty());
}
