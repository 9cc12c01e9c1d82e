use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::{Months, NaiveDate};
use serde::Deserialize;

use crate::cagr::implied_cagr;
use crate::model::{
    Dataset, FundamentalsBounds, FundamentalsSnapshot, RawFundamentals, TargetDuration,
    TrainingExample,
};

/// Upstream fundamentals archive.
pub trait FundamentalsArchive: Send + Sync {
    /// Bounds-checked rows for `index_ticker` labelled with realized CAGR over `duration`.
    fn training_dataset(
        &self,
        index_ticker: &str,
        duration: TargetDuration,
        size_limit: Option<usize>,
    ) -> Result<Dataset>;

    /// Most recent snapshot on or before `as_of` (or overall when `None`).
    fn latest_snapshot(&self, ticker: &str, as_of: Option<NaiveDate>)
        -> Result<FundamentalsSnapshot>;

    fn index_constituents(&self, index_ticker: &str) -> Result<Vec<String>>;

    fn is_index_ticker(&self, ticker: &str) -> Result<bool>;
}

/// Largest gap, in days, between the target date and the row used as the realized price.
const MAX_LABEL_GAP_DAYS: i64 = 10;

#[derive(Debug, Deserialize)]
struct ArchiveFile {
    #[serde(default)]
    indices: HashMap<String, Vec<String>>,
    rows: Vec<RawFundamentals>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryArchive {
    bounds: FundamentalsBounds,
    by_ticker: HashMap<String, Vec<FundamentalsSnapshot>>,
    indices: HashMap<String, Vec<String>>,
}

impl InMemoryArchive {
    pub fn new(bounds: FundamentalsBounds) -> Self {
        Self {
            bounds,
            by_ticker: HashMap::new(),
            indices: HashMap::new(),
        }
    }

    pub fn from_json_path(path: &Path, bounds: FundamentalsBounds) -> Result<Self> {
        let payload = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json_str(&payload, bounds)
            .with_context(|| format!("failed to load archive {}", path.display()))
    }

    pub fn from_json_str(payload: &str, bounds: FundamentalsBounds) -> Result<Self> {
        let file: ArchiveFile =
            serde_json::from_str(payload).context("failed to parse archive json")?;
        let mut archive = Self::new(bounds);
        for (index, members) in file.indices {
            archive.insert_index(&index, members);
        }
        for raw in file.rows {
            archive.insert_raw(raw);
        }
        Ok(archive)
    }

    pub fn insert_index(&mut self, index_ticker: &str, members: Vec<String>) {
        let mut members: Vec<String> = members
            .iter()
            .map(|m| m.trim().to_ascii_uppercase())
            .filter(|m| !m.is_empty())
            .collect();
        members.sort();
        members.dedup();
        self.indices
            .insert(index_ticker.trim().to_ascii_uppercase(), members);
    }

    pub fn insert_raw(&mut self, raw: RawFundamentals) {
        let snapshot = raw.into_snapshot(&self.bounds);
        self.insert_snapshot(snapshot);
    }

    pub fn insert_snapshot(&mut self, snapshot: FundamentalsSnapshot) {
        let rows = self
            .by_ticker
            .entry(snapshot.ticker.trim().to_ascii_uppercase())
            .or_default();
        match rows.binary_search_by_key(&snapshot.date, |s| s.date) {
            Ok(pos) => rows[pos] = snapshot,
            Err(pos) => rows.insert(pos, snapshot),
        }
    }

    fn row_on_or_before(
        rows: &[FundamentalsSnapshot],
        date: NaiveDate,
    ) -> Option<&FundamentalsSnapshot> {
        let idx = rows.partition_point(|s| s.date <= date);
        idx.checked_sub(1).map(|i| &rows[i])
    }

    /// Row closest to `date`, either side, within `MAX_LABEL_GAP_DAYS`.
    fn row_near(rows: &[FundamentalsSnapshot], date: NaiveDate) -> Option<&FundamentalsSnapshot> {
        let idx = rows.partition_point(|s| s.date < date);
        let after = rows.get(idx);
        let before = idx.checked_sub(1).and_then(|i| rows.get(i));
        let gap = |s: &FundamentalsSnapshot| (s.date - date).num_days().abs();
        let best = match (before, after) {
            (Some(b), Some(a)) => {
                if gap(a) < gap(b) {
                    a
                } else {
                    b
                }
            }
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => return None,
        };
        (gap(best) <= MAX_LABEL_GAP_DAYS).then_some(best)
    }

    fn labelled_rows(&self, ticker: &str, duration: TargetDuration) -> Vec<TrainingExample> {
        let Some(rows) = self.by_ticker.get(ticker) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for start in rows {
            if !self.bounds.contains(start) {
                continue;
            }
            let Some(target) = start.date.checked_add_months(Months::new(duration.months())) else {
                continue;
            };
            let Some(end) = Self::row_near(rows, target) else {
                continue;
            };
            if end.date <= start.date {
                continue;
            }
            let Some(cagr) = implied_cagr(start.close_price, end.close_price, duration.months())
            else {
                continue;
            };
            if !self.bounds.cagr.contains(cagr) {
                continue;
            }
            out.push(TrainingExample {
                snapshot: start.clone(),
                cagr,
            });
        }
        out
    }
}

impl FundamentalsArchive for InMemoryArchive {
    fn training_dataset(
        &self,
        index_ticker: &str,
        duration: TargetDuration,
        size_limit: Option<usize>,
    ) -> Result<Dataset> {
        let members = self.index_constituents(index_ticker)?;
        let mut examples = Vec::new();
        for ticker in &members {
            examples.extend(self.labelled_rows(ticker, duration));
        }
        examples.sort_by(|a, b| {
            a.snapshot
                .date
                .cmp(&b.snapshot.date)
                .then_with(|| a.snapshot.ticker.cmp(&b.snapshot.ticker))
        });
        Ok(Dataset::new(examples).take(size_limit))
    }

    fn latest_snapshot(
        &self,
        ticker: &str,
        as_of: Option<NaiveDate>,
    ) -> Result<FundamentalsSnapshot> {
        let key = ticker.trim().to_ascii_uppercase();
        let rows = self
            .by_ticker
            .get(&key)
            .ok_or_else(|| anyhow!("no fundamentals archived for {}", key))?;
        let found = match as_of {
            Some(date) => Self::row_on_or_before(rows, date),
            None => rows.last(),
        };
        found
            .cloned()
            .ok_or_else(|| anyhow!("no fundamentals for {} on or before {:?}", key, as_of))
    }

    fn index_constituents(&self, index_ticker: &str) -> Result<Vec<String>> {
        let key = index_ticker.trim().to_ascii_uppercase();
        self.indices
            .get(&key)
            .cloned()
            .ok_or_else(|| anyhow!("unknown index {}", key))
    }

    fn is_index_ticker(&self, ticker: &str) -> Result<bool> {
        Ok(self
            .indices
            .contains_key(&ticker.trim().to_ascii_uppercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARCHIVE: &str = r#"{
        "indices": { "tiny": ["aaa", "BBB", "aaa"] },
        "rows": [
            { "ticker": "AAA", "date": "2020-01-02", "close_price": 10.0, "price_to_earnings": 15.0 },
            { "ticker": "AAA", "date": "2021-01-04", "close_price": 12.1, "price_to_earnings": 16.0 },
            { "ticker": "AAA", "date": "2022-01-03", "close_price": 12.1, "price_to_earnings": 17.0 },
            { "ticker": "BBB", "date": "2020-01-02", "close_price": 50.0, "price_to_sales": 9999.0 },
            { "ticker": "BBB", "date": "2021-01-04", "close_price": 55.0 }
        ]
    }"#;

    #[test]
    fn index_membership_is_normalized() {
        let archive = InMemoryArchive::from_json_str(ARCHIVE, FundamentalsBounds::default()).unwrap();
        assert!(archive.is_index_ticker("Tiny").unwrap());
        assert!(!archive.is_index_ticker("AAA").unwrap());
        assert_eq!(
            archive.index_constituents("TINY").unwrap(),
            vec!["AAA".to_string(), "BBB".to_string()]
        );
    }

    #[test]
    fn dataset_labels_realized_cagr_and_drops_out_of_bounds_rows() {
        let archive = InMemoryArchive::from_json_str(ARCHIVE, FundamentalsBounds::default()).unwrap();
        let data = archive
            .training_dataset("tiny", TargetDuration::Months12, None)
            .unwrap();
        // AAA 2020 -> 2021 and 2021 -> 2022; BBB 2020 is out of bounds, BBB 2021 has no future.
        assert_eq!(data.len(), 2);
        assert!((data.examples[0].cagr - 21.0).abs() < 1e-9);
        assert!(data.examples[1].cagr.abs() < 1e-9);

        let limited = archive
            .training_dataset("tiny", TargetDuration::Months12, Some(1))
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn latest_snapshot_respects_as_of() {
        let archive = InMemoryArchive::from_json_str(ARCHIVE, FundamentalsBounds::default()).unwrap();
        let s = archive
            .latest_snapshot("aaa", NaiveDate::from_ymd_opt(2021, 6, 1))
            .unwrap();
        assert_eq!(s.date, NaiveDate::from_ymd_opt(2021, 1, 4).unwrap());
        assert_eq!(archive.latest_snapshot("AAA", None).unwrap().close_price, 12.1);
        assert!(archive
            .latest_snapshot("AAA", NaiveDate::from_ymd_opt(2019, 1, 1))
            .is_err());
        assert!(archive.latest_snapshot("ZZZ", None).is_err());
    }
}
