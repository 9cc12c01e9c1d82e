use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, ForecastResult};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub mean_absolute_error: f64,
    pub root_mean_squared_error: f64,
    /// Mean squared error (L2 loss).
    pub loss: f64,
    pub r_squared: f64,
    pub sample_count: usize,
}

impl RegressionMetrics {
    pub fn from_pairs(actual: &[f64], predicted: &[f64]) -> ForecastResult<Self> {
        if actual.len() != predicted.len() {
            return Err(ForecastError::DegenerateInput(format!(
                "metric length mismatch: {} actual vs {} predicted",
                actual.len(),
                predicted.len()
            )));
        }
        let n = actual.len();
        if n == 0 {
            return Err(ForecastError::InsufficientData {
                needed: 1,
                actual: 0,
            });
        }

        let mean_y = actual.iter().sum::<f64>() / n as f64;
        let mut sum_abs = 0.0;
        let mut sse = 0.0;
        let mut sst = 0.0;
        for (y, yhat) in actual.iter().zip(predicted) {
            let err = y - yhat;
            sum_abs += err.abs();
            sse += err * err;
            let d = y - mean_y;
            sst += d * d;
        }
        let mse = sse / n as f64;
        let r_squared = if sst <= 1e-18 { 0.0 } else { 1.0 - (sse / sst) };

        Ok(Self {
            mean_absolute_error: sum_abs / n as f64,
            root_mean_squared_error: mse.sqrt(),
            loss: mse,
            r_squared,
            sample_count: n,
        })
    }
}

/// Average, minimum, and maximum of a non-empty sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spread {
    pub average: f64,
    pub minimum: f64,
    pub maximum: f64,
}

pub fn spread(values: &[f64]) -> Option<Spread> {
    if values.is_empty() {
        return None;
    }
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for v in values {
        sum += v;
        min = min.min(*v);
        max = max.max(*v);
    }
    Some(Spread {
        average: sum / values.len() as f64,
        minimum: min,
        maximum: max,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_prediction_metrics() {
        let y = [1.0, 2.0, 3.0, 4.0];
        let m = RegressionMetrics::from_pairs(&y, &y).unwrap();
        assert_eq!(m.mean_absolute_error, 0.0);
        assert_eq!(m.root_mean_squared_error, 0.0);
        assert_eq!(m.r_squared, 1.0);
        assert_eq!(m.sample_count, 4);
    }

    #[test]
    fn constant_offset_metrics() {
        let y = [1.0, 2.0, 3.0];
        let yhat = [3.0, 4.0, 5.0];
        let m = RegressionMetrics::from_pairs(&y, &yhat).unwrap();
        assert!((m.mean_absolute_error - 2.0).abs() < 1e-12);
        assert!((m.root_mean_squared_error - 2.0).abs() < 1e-12);
        assert!((m.loss - 4.0).abs() < 1e-12);
        // sse = 12, sst = 2
        assert!((m.r_squared - (1.0 - 6.0)).abs() < 1e-12);
    }

    #[test]
    fn empty_or_mismatched_input_fails() {
        assert!(RegressionMetrics::from_pairs(&[], &[]).is_err());
        assert!(RegressionMetrics::from_pairs(&[1.0], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn spread_summarizes() {
        let s = spread(&[2.0, 4.0, 9.0]).unwrap();
        assert_eq!(s.average, 5.0);
        assert_eq!(s.minimum, 2.0);
        assert_eq!(s.maximum, 9.0);
        assert!(spread(&[]).is_none());
    }
}
