use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::{Dataset, FEATURE_COUNT};
use crate::trainer::{Hyperparameters, RegressionTrainer, Regressor};

const RIDGE_DIM: usize = FEATURE_COUNT;
const MIN_FEATURE_SCALE: f64 = 1e-9;

/// Linear ridge regression fitted with one exact recursive-least-squares pass
/// over standardized features. Tree-shape hyperparameters are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct RidgeTrainer;

impl RidgeTrainer {
    pub fn new() -> Self {
        Self
    }

    pub fn decode(bytes: &[u8]) -> Result<Arc<dyn Regressor>> {
        let model: RidgeRegressor =
            serde_json::from_slice(bytes).context("failed to decode ridge regressor")?;
        if model.beta.len() != RIDGE_DIM
            || model.feature_means.len() != RIDGE_DIM
            || model.feature_scales.len() != RIDGE_DIM
        {
            bail!(
                "ridge regressor has {} coefficients, expected {}",
                model.beta.len(),
                RIDGE_DIM
            );
        }
        Ok(Arc::new(model))
    }
}

impl RegressionTrainer for RidgeTrainer {
    fn fit(&self, data: &Dataset, params: &Hyperparameters) -> Result<Arc<dyn Regressor>> {
        if data.len() < 2 {
            bail!("ridge fit needs at least 2 rows, got {}", data.len());
        }
        let rows: Vec<[f64; RIDGE_DIM]> = data.examples.iter().map(|e| e.snapshot.features()).collect();
        let labels = data.labels();
        if let Some(bad) = labels.iter().position(|y| !y.is_finite()) {
            bail!("non-finite label at row {}", bad);
        }

        let n = rows.len() as f64;
        let mut means = [0.0; RIDGE_DIM];
        for row in &rows {
            for (m, v) in means.iter_mut().zip(row) {
                *m += v / n;
            }
        }
        let mut scales = [0.0; RIDGE_DIM];
        for row in &rows {
            for i in 0..RIDGE_DIM {
                let d = row[i] - means[i];
                scales[i] += d * d / n;
            }
        }
        for s in scales.iter_mut() {
            *s = s.sqrt();
            if !s.is_finite() || *s < MIN_FEATURE_SCALE {
                *s = 1.0;
            }
        }
        if means.iter().any(|m| !m.is_finite()) {
            bail!("non-finite feature in training data");
        }

        let label_mean = labels.iter().sum::<f64>() / n;
        let mut beta = [0.0; RIDGE_DIM];
        let mut p = [[0.0; RIDGE_DIM]; RIDGE_DIM];
        init_rls_covariance(&mut p, params.l2_regularization);
        for (row, y) in rows.iter().zip(&labels) {
            let x = standardize(row, &means, &scales);
            rls_update(&mut beta, &mut p, &x, y - label_mean);
        }

        Ok(Arc::new(RidgeRegressor {
            feature_means: means.to_vec(),
            feature_scales: scales.to_vec(),
            label_mean,
            beta: beta.to_vec(),
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RidgeRegressor {
    feature_means: Vec<f64>,
    feature_scales: Vec<f64>,
    label_mean: f64,
    beta: Vec<f64>,
}

impl RidgeRegressor {
    pub fn coefficients(&self) -> &[f64] {
        &self.beta
    }
}

impl Regressor for RidgeRegressor {
    fn kind(&self) -> &'static str {
        "ridge-rls"
    }

    fn predict(&self, features: &[f64]) -> Result<f64> {
        if features.len() != RIDGE_DIM {
            bail!(
                "expected {} features, got {}",
                RIDGE_DIM,
                features.len()
            );
        }
        let mut y = self.label_mean;
        for i in 0..RIDGE_DIM {
            let v = features[i];
            if !v.is_finite() {
                bail!("non-finite feature at position {}", i);
            }
            y += self.beta[i] * (v - self.feature_means[i]) / self.feature_scales[i];
        }
        Ok(y)
    }

    fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).context("failed to encode ridge regressor")
    }
}

fn standardize(
    row: &[f64; RIDGE_DIM],
    means: &[f64; RIDGE_DIM],
    scales: &[f64; RIDGE_DIM],
) -> [f64; RIDGE_DIM] {
    let mut x = [0.0; RIDGE_DIM];
    for i in 0..RIDGE_DIM {
        x[i] = (row[i] - means[i]) / scales[i];
    }
    x
}

fn dot(a: &[f64; RIDGE_DIM], b: &[f64; RIDGE_DIM]) -> f64 {
    let mut s = 0.0;
    for i in 0..RIDGE_DIM {
        s += a[i] * b[i];
    }
    s
}

fn init_rls_covariance(p: &mut [[f64; RIDGE_DIM]; RIDGE_DIM], ridge: f64) {
    let v = 1.0 / ridge.max(1e-9);
    for (i, row) in p.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = if i == j { v } else { 0.0 };
        }
    }
}

// No forgetting: a single pass reproduces the batch ridge solution.
fn rls_update(
    beta: &mut [f64; RIDGE_DIM],
    p: &mut [[f64; RIDGE_DIM]; RIDGE_DIM],
    x: &[f64; RIDGE_DIM],
    y: f64,
) {
    let mut px = [0.0; RIDGE_DIM];
    for (i, px_i) in px.iter_mut().enumerate() {
        let mut v = 0.0;
        for (j, xj) in x.iter().enumerate() {
            v += p[i][j] * *xj;
        }
        *px_i = v;
    }
    let mut denom = 1.0;
    for (i, x_i) in x.iter().enumerate() {
        denom += *x_i * px[i];
    }
    if !denom.is_finite() || denom.abs() <= 1e-12 {
        return;
    }
    let mut k = [0.0; RIDGE_DIM];
    for i in 0..RIDGE_DIM {
        k[i] = px[i] / denom;
    }
    let err = y - dot(beta, x);
    for i in 0..RIDGE_DIM {
        beta[i] += k[i] * err;
    }

    // P is symmetric, so xᵀP == (Px)ᵀ.
    let mut next_p = [[0.0; RIDGE_DIM]; RIDGE_DIM];
    for i in 0..RIDGE_DIM {
        for j in 0..RIDGE_DIM {
            next_p[i][j] = p[i][j] - k[i] * px[j];
        }
    }
    *p = next_p;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FundamentalsSnapshot, TrainingExample};
    use chrono::NaiveDate;

    fn example(pe: f64, cagr: f64) -> TrainingExample {
        TrainingExample {
            snapshot: FundamentalsSnapshot {
                ticker: "T".to_string(),
                date: NaiveDate::from_ymd_opt(2020, 1, 2).unwrap(),
                close_price: 50.0,
                market_cap: 1.0e10,
                price_to_earnings: pe,
                price_to_sales: 3.0,
                price_to_book: 2.0,
                price_to_free_cash_flow: 20.0,
                ev_to_ebit: 15.0,
                ev_to_ebitda: 12.0,
                ev_to_revenue: 3.5,
                ev_to_gross_profit: 7.0,
                altman_z_score: 3.0,
                dividend_yield: 1.5,
                adjusted_price_to_earnings: pe,
            },
            cagr,
        }
    }

    #[test]
    fn learns_monotone_relationship() {
        let data = Dataset::new(
            (0..40)
                .map(|i| {
                    let pe = 5.0 + i as f64;
                    example(pe, 30.0 - 0.5 * pe)
                })
                .collect(),
        );
        let params = Hyperparameters {
            l2_regularization: 1e-3,
            ..Hyperparameters::default()
        };
        let model = RidgeTrainer::new().fit(&data, &params).unwrap();
        let low = model.predict(&example(8.0, 0.0).snapshot.features()).unwrap();
        let high = model.predict(&example(40.0, 0.0).snapshot.features()).unwrap();
        assert!(low > high);
        assert!((low - 26.0).abs() < 0.5, "low={low}");
    }

    #[test]
    fn encode_decode_preserves_predictions() {
        let data = Dataset::new((0..10).map(|i| example(10.0 + i as f64, i as f64)).collect());
        let model = RidgeTrainer::new()
            .fit(&data, &Hyperparameters::default())
            .unwrap();
        let bytes = model.encode().unwrap();
        let decoded = RidgeTrainer::decode(&bytes).unwrap();
        let f = example(13.0, 0.0).snapshot.features();
        assert_eq!(model.predict(&f).unwrap(), decoded.predict(&f).unwrap());
    }

    #[test]
    fn non_finite_feature_is_an_inference_error() {
        let data = Dataset::new((0..10).map(|i| example(10.0 + i as f64, i as f64)).collect());
        let model = RidgeTrainer::new()
            .fit(&data, &Hyperparameters::default())
            .unwrap();
        let mut f = example(13.0, 0.0).snapshot.features();
        f[3] = f64::NAN;
        assert!(model.predict(&f).is_err());
    }
}
