use crate::error::{ForecastError, ForecastResult};

fn check_pair(x: &[f64], y: &[f64]) -> ForecastResult<()> {
    if x.len() != y.len() {
        return Err(ForecastError::DegenerateInput(format!(
            "length mismatch: {} vs {}",
            x.len(),
            y.len()
        )));
    }
    if x.len() < 2 {
        return Err(ForecastError::DegenerateInput(format!(
            "need at least 2 observations, got {}",
            x.len()
        )));
    }
    if x.iter().chain(y).any(|v| !v.is_finite()) {
        return Err(ForecastError::DegenerateInput(
            "non-finite value in correlation input".to_string(),
        ));
    }
    Ok(())
}

/// Pearson product-moment correlation.
///
/// Fails with `DegenerateInput` when either side has zero variance or holds a
/// non-finite value.
pub fn pearson(x: &[f64], y: &[f64]) -> ForecastResult<f64> {
    check_pair(x, y)?;
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (a, b) in x.iter().zip(y) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    let denom = (sxx * syy).sqrt();
    if !denom.is_finite() || denom <= f64::EPSILON * f64::EPSILON {
        return Err(ForecastError::DegenerateInput(
            "zero variance in pearson input".to_string(),
        ));
    }
    Ok(sxy / denom)
}

/// 1-indexed ranks; tied values share the mean of the positions they occupy.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i + 1;
        while j < order.len() && values[order[j]] == values[order[i]] {
            j += 1;
        }
        // positions i..j (0-indexed) map to ranks i+1..=j
        let avg = (i + 1 + j) as f64 / 2.0;
        for &idx in &order[i..j] {
            ranks[idx] = avg;
        }
        i = j;
    }
    ranks
}

/// Spearman rank correlation via `1 - 6·Σd² / (n·(n²−1))` over average ranks.
///
/// Heavy ties can push the closed form outside [-1, 1]. That is logged and
/// returned as-is so callers can flag it.
pub fn spearman_rank_correlation(x: &[f64], y: &[f64]) -> ForecastResult<f64> {
    check_pair(x, y)?;
    let rx = average_ranks(x);
    let ry = average_ranks(y);
    let n = x.len() as f64;
    let sum_d2: f64 = rx
        .iter()
        .zip(&ry)
        .map(|(a, b)| {
            let d = a - b;
            d * d
        })
        .sum();
    let rho = 1.0 - (6.0 * sum_d2) / (n * (n * n - 1.0));
    if !is_valid_correlation(rho) {
        tracing::warn!(
            rho,
            n = x.len(),
            "spearman correlation outside [-1, 1]; input is likely tie-degenerate"
        );
    }
    Ok(rho)
}

pub fn is_valid_correlation(v: f64) -> bool {
    v.is_finite() && (-1.0..=1.0).contains(&v)
}
