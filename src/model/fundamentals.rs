use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ForecastResult;
use crate::evaluation::train_test_indices;

pub const FEATURE_COUNT: usize = 12;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "log_market_cap",
    "price_to_earnings",
    "price_to_sales",
    "price_to_book",
    "price_to_free_cash_flow",
    "ev_to_ebit",
    "ev_to_ebitda",
    "ev_to_revenue",
    "ev_to_gross_profit",
    "altman_z_score",
    "dividend_yield",
    "adjusted_price_to_earnings",
];

/// One ticker's ratios on one trading day. All fields are populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundamentalsSnapshot {
    pub ticker: String,
    pub date: NaiveDate,
    pub close_price: f64,
    pub market_cap: f64,
    pub price_to_earnings: f64,
    pub price_to_sales: f64,
    pub price_to_book: f64,
    pub price_to_free_cash_flow: f64,
    pub ev_to_ebit: f64,
    pub ev_to_ebitda: f64,
    pub ev_to_revenue: f64,
    pub ev_to_gross_profit: f64,
    pub altman_z_score: f64,
    pub dividend_yield: f64,
    pub adjusted_price_to_earnings: f64,
}

impl FundamentalsSnapshot {
    pub fn features(&self) -> [f64; FEATURE_COUNT] {
        [
            self.market_cap.max(1.0).ln(),
            self.price_to_earnings,
            self.price_to_sales,
            self.price_to_book,
            self.price_to_free_cash_flow,
            self.ev_to_ebit,
            self.ev_to_ebitda,
            self.ev_to_revenue,
            self.ev_to_gross_profit,
            self.altman_z_score,
            self.dividend_yield,
            self.adjusted_price_to_earnings,
        ]
    }
}

/// Archive row as stored upstream; ratio fields may be missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFundamentals {
    pub ticker: String,
    pub date: NaiveDate,
    pub close_price: f64,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub price_to_earnings: Option<f64>,
    #[serde(default)]
    pub price_to_sales: Option<f64>,
    #[serde(default)]
    pub price_to_book: Option<f64>,
    #[serde(default)]
    pub price_to_free_cash_flow: Option<f64>,
    #[serde(default)]
    pub ev_to_ebit: Option<f64>,
    #[serde(default)]
    pub ev_to_ebitda: Option<f64>,
    #[serde(default)]
    pub ev_to_revenue: Option<f64>,
    #[serde(default)]
    pub ev_to_gross_profit: Option<f64>,
    #[serde(default)]
    pub altman_z_score: Option<f64>,
    #[serde(default)]
    pub dividend_yield: Option<f64>,
    #[serde(default)]
    pub adjusted_price_to_earnings: Option<f64>,
}

impl RawFundamentals {
    /// Backfill every missing ratio with the domain minimum from `bounds`.
    pub fn into_snapshot(self, bounds: &FundamentalsBounds) -> FundamentalsSnapshot {
        FundamentalsSnapshot {
            ticker: self.ticker.trim().to_ascii_uppercase(),
            date: self.date,
            close_price: self.close_price,
            market_cap: self.market_cap.unwrap_or(bounds.market_cap.min),
            price_to_earnings: self.price_to_earnings.unwrap_or(bounds.price_to_earnings.min),
            price_to_sales: self.price_to_sales.unwrap_or(bounds.price_to_sales.min),
            price_to_book: self.price_to_book.unwrap_or(bounds.price_to_book.min),
            price_to_free_cash_flow: self
                .price_to_free_cash_flow
                .unwrap_or(bounds.price_to_free_cash_flow.min),
            ev_to_ebit: self.ev_to_ebit.unwrap_or(bounds.ev_multiple.min),
            ev_to_ebitda: self.ev_to_ebitda.unwrap_or(bounds.ev_multiple.min),
            ev_to_revenue: self.ev_to_revenue.unwrap_or(bounds.ev_multiple.min),
            ev_to_gross_profit: self.ev_to_gross_profit.unwrap_or(bounds.ev_multiple.min),
            altman_z_score: self.altman_z_score.unwrap_or(bounds.altman_z_score.min),
            dividend_yield: self.dividend_yield.unwrap_or(bounds.dividend_yield.min),
            adjusted_price_to_earnings: self
                .adjusted_price_to_earnings
                .unwrap_or(bounds.price_to_earnings.min),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioRange {
    pub min: f64,
    pub max: f64,
}

impl RatioRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, v: f64) -> bool {
        v.is_finite() && v >= self.min && v <= self.max
    }
}

/// Sane ranges for training rows. `min` doubles as the missing-value sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FundamentalsBounds {
    pub market_cap: RatioRange,
    pub price_to_earnings: RatioRange,
    pub price_to_sales: RatioRange,
    pub price_to_book: RatioRange,
    pub price_to_free_cash_flow: RatioRange,
    pub ev_multiple: RatioRange,
    pub altman_z_score: RatioRange,
    pub dividend_yield: RatioRange,
    pub cagr: RatioRange,
}

impl Default for FundamentalsBounds {
    fn default() -> Self {
        Self {
            market_cap: RatioRange::new(0.0, 1.0e13),
            price_to_earnings: RatioRange::new(-1_000.0, 1_000.0),
            price_to_sales: RatioRange::new(0.0, 500.0),
            price_to_book: RatioRange::new(-500.0, 500.0),
            price_to_free_cash_flow: RatioRange::new(-1_000.0, 1_000.0),
            ev_multiple: RatioRange::new(-1_000.0, 1_000.0),
            altman_z_score: RatioRange::new(-50.0, 100.0),
            dividend_yield: RatioRange::new(0.0, 50.0),
            cagr: RatioRange::new(-100.0, 200.0),
        }
    }
}

impl FundamentalsBounds {
    pub fn contains(&self, s: &FundamentalsSnapshot) -> bool {
        s.close_price.is_finite()
            && s.close_price > 0.0
            && self.market_cap.contains(s.market_cap)
            && self.price_to_earnings.contains(s.price_to_earnings)
            && self.price_to_earnings.contains(s.adjusted_price_to_earnings)
            && self.price_to_sales.contains(s.price_to_sales)
            && self.price_to_book.contains(s.price_to_book)
            && self.price_to_free_cash_flow.contains(s.price_to_free_cash_flow)
            && self.ev_multiple.contains(s.ev_to_ebit)
            && self.ev_multiple.contains(s.ev_to_ebitda)
            && self.ev_multiple.contains(s.ev_to_revenue)
            && self.ev_multiple.contains(s.ev_to_gross_profit)
            && self.altman_z_score.contains(s.altman_z_score)
            && self.dividend_yield.contains(s.dividend_yield)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub snapshot: FundamentalsSnapshot,
    /// Realized CAGR in percent over the dataset's target duration.
    pub cagr: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub examples: Vec<TrainingExample>,
}

impl Dataset {
    pub fn new(examples: Vec<TrainingExample>) -> Self {
        Self { examples }
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn labels(&self) -> Vec<f64> {
        self.examples.iter().map(|e| e.cagr).collect()
    }

    pub fn subset(&self, indices: &[usize]) -> Dataset {
        Dataset {
            examples: indices
                .iter()
                .filter_map(|&i| self.examples.get(i).cloned())
                .collect(),
        }
    }

    /// Seeded random `(train, test)` partition; see [`train_test_indices`].
    pub fn split(&self, test_fraction: f64, seed: u64) -> ForecastResult<(Dataset, Dataset)> {
        let (train, test) = train_test_indices(self.len(), test_fraction, seed)?;
        Ok((self.subset(&train), self.subset(&test)))
    }

    pub fn take(mut self, limit: Option<usize>) -> Dataset {
        if let Some(n) = limit {
            self.examples.truncate(n);
        }
        self
    }
}
