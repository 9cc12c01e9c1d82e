use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{ForecastError, ForecastResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldSplit {
    pub train_indices: Vec<usize>,
    pub validation_indices: Vec<usize>,
}

/// Shuffle `0..n` with `seed` and cut it into `k` disjoint, near-equal folds.
pub fn k_fold(n: usize, k: usize, seed: u64) -> ForecastResult<Vec<FoldSplit>> {
    if k < 2 {
        return Err(ForecastError::DegenerateInput(format!(
            "k-fold needs at least 2 folds, got {}",
            k
        )));
    }
    if n < k {
        return Err(ForecastError::InsufficientData {
            needed: k,
            actual: n,
        });
    }

    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    let base = n / k;
    let extra = n % k;
    let mut bounds = Vec::with_capacity(k);
    let mut start = 0;
    for fold in 0..k {
        let len = base + usize::from(fold < extra);
        bounds.push((start, start + len));
        start += len;
    }

    Ok(bounds
        .iter()
        .map(|&(lo, hi)| FoldSplit {
            validation_indices: order[lo..hi].to_vec(),
            train_indices: order[..lo].iter().chain(&order[hi..]).copied().collect(),
        })
        .collect())
}

/// Single seeded random split; the test side gets `round(n * test_fraction)` rows.
pub fn train_test_indices(
    n: usize,
    test_fraction: f64,
    seed: u64,
) -> ForecastResult<(Vec<usize>, Vec<usize>)> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(ForecastError::DegenerateInput(format!(
            "test fraction must be in (0, 1), got {}",
            test_fraction
        )));
    }
    let test_len = ((n as f64) * test_fraction).round() as usize;
    if test_len == 0 || test_len >= n {
        return Err(ForecastError::InsufficientData {
            needed: 2,
            actual: n,
        });
    }
    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);
    let test = order[..test_len].to_vec();
    let train = order[test_len..].to_vec();
    Ok((train, test))
}
