#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{Months, NaiveDate};

use cagr_forecast::archive::InMemoryArchive;
use cagr_forecast::model::{FundamentalsBounds, FundamentalsSnapshot};
use cagr_forecast::trainer::Regressor;

pub const INDEX: &str = "TEST";

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn snapshot(ticker: &str, on: NaiveDate, close_price: f64, pe: f64) -> FundamentalsSnapshot {
    FundamentalsSnapshot {
        ticker: ticker.to_string(),
        date: on,
        close_price,
        market_cap: 5.0e10,
        price_to_earnings: pe,
        price_to_sales: 3.0,
        price_to_book: 4.0,
        price_to_free_cash_flow: 20.0,
        ev_to_ebit: 18.0,
        ev_to_ebitda: 12.0,
        ev_to_revenue: 3.5,
        ev_to_gross_profit: 7.0,
        altman_z_score: 3.0,
        dividend_yield: 1.5,
        adjusted_price_to_earnings: pe,
    }
}

/// Growth rate (percent a year) the synthetic archive assigns to a P/E.
pub fn growth_for_pe(pe: f64) -> f64 {
    25.0 - pe / 2.0
}

/// Ten tickers with monthly rows; each compounds at a rate set by its P/E.
pub fn synthetic_archive(years: u32) -> InMemoryArchive {
    let mut archive = InMemoryArchive::new(FundamentalsBounds::default());
    let start = date(2012, 1, 1);
    let mut members = Vec::new();
    for i in 0..10 {
        let ticker = format!("T{:02}", i);
        let pe = 6.0 + 4.0 * i as f64;
        let growth = growth_for_pe(pe);
        for m in 0..=(years * 12) {
            let on = start
                .checked_add_months(Months::new(m))
                .expect("date in range");
            let price = 50.0 * (1.0 + growth / 100.0).powf(m as f64 / 12.0);
            archive.insert_snapshot(snapshot(&ticker, on, price, pe));
        }
        members.push(ticker);
    }
    archive.insert_index(INDEX, members);
    archive
}

/// Always predicts the same CAGR.
pub struct FixedRegressor(pub f64);

impl Regressor for FixedRegressor {
    fn kind(&self) -> &'static str {
        "fixed"
    }

    fn predict(&self, _features: &[f64]) -> Result<f64> {
        Ok(self.0)
    }

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.0.to_le_bytes().to_vec())
    }
}

pub struct BrokenRegressor;

impl Regressor for BrokenRegressor {
    fn kind(&self) -> &'static str {
        "broken"
    }

    fn predict(&self, _features: &[f64]) -> Result<f64> {
        bail!("model file is corrupt")
    }

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

pub fn fixed(cagr: f64) -> Arc<dyn Regressor> {
    Arc::new(FixedRegressor(cagr))
}
