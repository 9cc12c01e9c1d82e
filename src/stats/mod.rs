pub mod correlation;
pub mod regression;

pub use correlation::{average_ranks, is_valid_correlation, pearson, spearman_rank_correlation};
pub use regression::{spread, RegressionMetrics, Spread};
