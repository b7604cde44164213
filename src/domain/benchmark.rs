//! Composite buy-and-hold benchmark.
//!
//! A fixed notional buys fractional share counts per the configured
//! weights on the first day all constituents have a positive price;
//! those counts never change. The daily series is normalized so the
//! first day reads 100.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::domain::error::PolicybackError;

pub const BENCHMARK_NOTIONAL: f64 = 100_000_000.0;
pub const WEIGHT_TOLERANCE: f64 = 1e-9;

#[derive(Debug)]
pub struct CompositeBenchmark {
    series: BTreeMap<NaiveDate, f64>,
}

impl CompositeBenchmark {
    /// Build the daily benchmark series over `[start, end]`.
    ///
    /// Weights must sum to 1.0 within [`WEIGHT_TOLERANCE`]. Days where
    /// any constituent lacks a positive price are skipped; if no day
    /// qualifies the benchmark cannot be anchored and the data is
    /// reported unavailable.
    pub fn build(
        weights: &BTreeMap<String, f64>,
        closes: &BTreeMap<String, BTreeMap<NaiveDate, f64>>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Self, PolicybackError> {
        let total: f64 = weights.values().sum();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(PolicybackError::BenchmarkWeights { total });
        }

        let mut shares: Option<BTreeMap<String, f64>> = None;
        let mut series = BTreeMap::new();

        let mut date = start;
        while date <= end {
            if let Some(prices) = complete_prices(weights, closes, date) {
                let shares = shares.get_or_insert_with(|| {
                    weights
                        .iter()
                        .map(|(asset, w)| {
                            (asset.clone(), BENCHMARK_NOTIONAL * w / prices[asset.as_str()])
                        })
                        .collect()
                });
                let value: f64 = shares
                    .iter()
                    .map(|(asset, count)| count * prices[asset.as_str()])
                    .sum();
                series.insert(date, value);
            }
            let Some(next) = date.succ_opt() else { break };
            date = next;
        }

        let Some(&anchor) = series.values().next() else {
            return Err(PolicybackError::DataUnavailable {
                name: "benchmark".to_string(),
                path: format!("no complete price day in {start}..{end}"),
            });
        };
        for value in series.values_mut() {
            *value = *value / anchor * 100.0;
        }

        Ok(Self { series })
    }

    pub fn series(&self) -> &BTreeMap<NaiveDate, f64> {
        &self.series
    }

    pub fn values(&self) -> Vec<f64> {
        self.series.values().copied().collect()
    }

    pub fn value_on(&self, date: NaiveDate) -> Option<f64> {
        self.series.get(&date).copied()
    }
}

fn complete_prices<'a>(
    weights: &BTreeMap<String, f64>,
    closes: &'a BTreeMap<String, BTreeMap<NaiveDate, f64>>,
    date: NaiveDate,
) -> Option<BTreeMap<&'a str, f64>> {
    let mut prices = BTreeMap::new();
    for asset in weights.keys() {
        let (name, &price) = closes.get_key_value(asset).and_then(|(name, series)| {
            series.get(&date).map(|p| (name.as_str(), p))
        })?;
        if price <= 0.0 {
            return None;
        }
        prices.insert(name, price);
    }
    Some(prices)
}
