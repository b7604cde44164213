//! Strategy and benchmark configuration loading.
//!
//! All validation happens here, before a run starts. Downstream code
//! can assume the loaded structs are well formed; the one check that
//! needs price data (the benchmark weight sum) lives with the
//! benchmark itself.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::domain::error::PolicybackError;
use crate::domain::evaluator::TieBreak;
use crate::domain::policy::TRADE_POLICY_SECTION;
use crate::ports::config_port::ConfigPort;

pub const STRATEGY_SECTION: &str = "StrategyConfig";
pub const BENCHMARK_SECTION: &str = "BenchmarkConfig";

#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub assets: Vec<String>,
    pub market_info_files: Vec<String>,
    pub min_cash_required: f64,
    pub transaction_cost: f64,
    pub initial_capital: f64,
    pub asset_data_path: PathBuf,
    pub market_data_path: PathBuf,
    pub sizer_name: String,
    pub tie_break: TieBreak,
}

impl StrategyConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, PolicybackError> {
        let assets = comma_list(&required(config, STRATEGY_SECTION, "assets")?);
        if assets.is_empty() {
            return Err(PolicybackError::ConfigInvalid {
                section: STRATEGY_SECTION.to_string(),
                key: "assets".to_string(),
                reason: "empty asset list".to_string(),
            });
        }

        let initial_capital = required(config, STRATEGY_SECTION, "initialcapital")?
            .parse::<f64>()
            .map_err(|_| invalid(STRATEGY_SECTION, "initialcapital", "not a number"))?;
        if initial_capital <= 0.0 {
            return Err(invalid(
                STRATEGY_SECTION,
                "initialcapital",
                "must be positive",
            ));
        }

        let asset_data_path =
            PathBuf::from(required(config, STRATEGY_SECTION, "assetdatapath")?);
        let market_data_path = config
            .get_string(STRATEGY_SECTION, "marketdatapath")
            .map(PathBuf::from)
            .unwrap_or_else(|| asset_data_path.clone());

        let market_info_files = config
            .get_string(STRATEGY_SECTION, "marketinfofiles")
            .map(|raw| comma_list(&raw))
            .unwrap_or_default();

        let min_cash_required = config.get_double(STRATEGY_SECTION, "mincashrequired", 0.0);
        if !(0.0..1.0).contains(&min_cash_required) {
            return Err(invalid(
                STRATEGY_SECTION,
                "mincashrequired",
                "must be in [0, 1)",
            ));
        }

        let sizer_name = required(config, TRADE_POLICY_SECTION, "policy")?;

        let tie_break = match config.get_string(TRADE_POLICY_SECTION, "tie_break") {
            Some(raw) => raw
                .parse::<TieBreak>()
                .map_err(|reason| invalid(TRADE_POLICY_SECTION, "tie_break", &reason))?,
            None => TieBreak::default(),
        };

        Ok(Self {
            assets,
            market_info_files,
            min_cash_required,
            transaction_cost: config.get_double(STRATEGY_SECTION, "transaction_cost", 0.0),
            initial_capital,
            asset_data_path,
            market_data_path,
            sizer_name,
            tie_break,
        })
    }
}

#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    pub weights: BTreeMap<String, f64>,
    pub price_path: Option<PathBuf>,
}

impl BenchmarkConfig {
    /// `None` when no `[BenchmarkConfig]` section exists; the run then
    /// proceeds without a benchmark.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Option<Self>, PolicybackError> {
        if !config.has_section(BENCHMARK_SECTION) {
            return Ok(None);
        }

        let assets = comma_list(&required(config, BENCHMARK_SECTION, "assets")?);
        let raw_weights = comma_list(&required(config, BENCHMARK_SECTION, "weights")?);
        if assets.len() != raw_weights.len() {
            return Err(invalid(
                BENCHMARK_SECTION,
                "weights",
                &format!(
                    "{} weights for {} assets",
                    raw_weights.len(),
                    assets.len()
                ),
            ));
        }

        let mut weights = BTreeMap::new();
        for (asset, raw) in assets.into_iter().zip(raw_weights) {
            let weight = raw
                .parse::<f64>()
                .map_err(|_| invalid(BENCHMARK_SECTION, "weights", &format!("bad weight {raw}")))?;
            weights.insert(asset, weight);
        }

        let price_path = config
            .get_string(BENCHMARK_SECTION, "pricepath")
            .map(PathBuf::from);

        Ok(Some(Self {
            weights,
            price_path,
        }))
    }
}

fn required(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<String, PolicybackError> {
    config
        .get_string(section, key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| PolicybackError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        })
}

fn invalid(section: &str, key: &str, reason: &str) -> PolicybackError {
    PolicybackError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn comma_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
