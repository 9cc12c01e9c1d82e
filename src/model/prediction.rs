use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::duration::TargetDuration;

/// Result of running one predictor against one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum PointOutcome {
    Success {
        predicted_cagr: f64,
        predicted_ending_price: f64,
        cagr_range: (f64, f64),
        price_range: (f64, f64),
    },
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "PricePointWire", from = "PricePointWire")]
pub struct PricePointPrediction {
    pub ticker: String,
    pub period: TargetDuration,
    pub starting_date: NaiveDate,
    pub starting_price: f64,
    pub ending_date: NaiveDate,
    pub outcome: PointOutcome,
}

impl PricePointPrediction {
    pub fn predicted_cagr(&self) -> Option<f64> {
        match &self.outcome {
            PointOutcome::Success { predicted_cagr, .. } => Some(*predicted_cagr),
            PointOutcome::Failed { .. } => None,
        }
    }

    pub fn predicted_ending_price(&self) -> Option<f64> {
        match &self.outcome {
            PointOutcome::Success {
                predicted_ending_price,
                ..
            } => Some(*predicted_ending_price),
            PointOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, PointOutcome::Failed { .. })
    }
}

/// Flat, nullable shape used at the serialization boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PricePointWire {
    ticker: String,
    period: TargetDuration,
    starting_date: NaiveDate,
    starting_price: f64,
    ending_date: NaiveDate,
    predicted_ending_price: Option<f64>,
    predicted_cagr: Option<f64>,
    expected_cagr_range_low: Option<f64>,
    expected_cagr_range_high: Option<f64>,
    expected_price_range_low: Option<f64>,
    expected_price_range_high: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure_reason: Option<String>,
}

impl From<PricePointPrediction> for PricePointWire {
    fn from(p: PricePointPrediction) -> Self {
        let mut wire = PricePointWire {
            ticker: p.ticker,
            period: p.period,
            starting_date: p.starting_date,
            starting_price: p.starting_price,
            ending_date: p.ending_date,
            predicted_ending_price: None,
            predicted_cagr: None,
            expected_cagr_range_low: None,
            expected_cagr_range_high: None,
            expected_price_range_low: None,
            expected_price_range_high: None,
            failure_reason: None,
        };
        match p.outcome {
            PointOutcome::Success {
                predicted_cagr,
                predicted_ending_price,
                cagr_range,
                price_range,
            } => {
                wire.predicted_cagr = Some(predicted_cagr);
                wire.predicted_ending_price = Some(predicted_ending_price);
                wire.expected_cagr_range_low = Some(cagr_range.0);
                wire.expected_cagr_range_high = Some(cagr_range.1);
                wire.expected_price_range_low = Some(price_range.0);
                wire.expected_price_range_high = Some(price_range.1);
            }
            PointOutcome::Failed { reason } => wire.failure_reason = Some(reason),
        }
        wire
    }
}

impl From<PricePointWire> for PricePointPrediction {
    fn from(w: PricePointWire) -> Self {
        let outcome = match (
            w.predicted_cagr,
            w.predicted_ending_price,
            w.expected_cagr_range_low,
            w.expected_cagr_range_high,
            w.expected_price_range_low,
            w.expected_price_range_high,
        ) {
            (Some(cagr), Some(price), Some(cl), Some(ch), Some(pl), Some(ph)) => {
                PointOutcome::Success {
                    predicted_cagr: cagr,
                    predicted_ending_price: price,
                    cagr_range: (cl, ch),
                    price_range: (pl, ph),
                }
            }
            _ => PointOutcome::Failed {
                reason: w
                    .failure_reason
                    .unwrap_or_else(|| "prediction unavailable".to_string()),
            },
        };
        Self {
            ticker: w.ticker,
            period: w.period,
            starting_date: w.starting_date,
            starting_price: w.starting_price,
            ending_date: w.ending_date,
            outcome,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTrendPrediction {
    pub ticker: String,
    pub points: Vec<PricePointPrediction>,
}

impl PriceTrendPrediction {
    pub fn failed_points(&self) -> usize {
        self.points.iter().filter(|p| p.is_failed()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(outcome: PointOutcome) -> PricePointPrediction {
        PricePointPrediction {
            ticker: "AAPL".to_string(),
            period: TargetDuration::Months24,
            starting_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            starting_price: 100.0,
            ending_date: NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
            outcome,
        }
    }

    #[test]
    fn failed_point_serializes_null_fields() {
        let p = point(PointOutcome::Failed {
            reason: "model error".to_string(),
        });
        let v = serde_json::to_value(&p).unwrap();
        assert!(v["predicted_cagr"].is_null());
        assert!(v["predicted_ending_price"].is_null());
        assert!(v["expected_cagr_range_low"].is_null());
        assert!(v["expected_price_range_high"].is_null());
        assert_eq!(v["period"], 24);
        assert_eq!(v["failure_reason"], "model error");
    }

    #[test]
    fn success_point_flattens_ranges() {
        let p = point(PointOutcome::Success {
            predicted_cagr: 10.0,
            predicted_ending_price: 121.0,
            cagr_range: (8.0, 12.0),
            price_range: (116.64, 125.44),
        });
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["predicted_cagr"], 10.0);
        assert_eq!(v["expected_cagr_range_low"], 8.0);
        assert_eq!(v["expected_price_range_high"], 125.44);
        assert!(v.get("failure_reason").is_none());

        let back: PricePointPrediction = serde_json::from_value(v).unwrap();
        assert_eq!(back, p);
    }
}
