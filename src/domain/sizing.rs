//! Order sizing: turns per-asset actions into an order batch.
//!
//! Sizers are looked up by the `policy` key of `[TradePolicyConfig]` at
//! startup; an unknown name is a fatal configuration error rather than a
//! runtime fallback.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use log::debug;

use crate::domain::error::PolicybackError;
use crate::domain::evaluator::{Action, DayDecision};
use crate::domain::ledger::{Order, PortfolioLedger};
use crate::ports::config_port::ConfigPort;

pub trait OrderSizer: std::fmt::Debug {
    fn size(
        &self,
        date: NaiveDate,
        decision: &DayDecision,
        ledger: &PortfolioLedger,
        prices: &BTreeMap<String, f64>,
    ) -> Vec<Order>;
}

/// Splits the investable cash evenly across the asset universe,
/// scaled by how much of the portfolio currently sits in cash.
///
/// Exits liquidate the full holding. Entries spend
/// `cash × (1 − min_cash_buffer) × cash_pct / n_assets`, where
/// `cash_pct` is the ledger's cash share of total value, rounded down
/// to whole units; entries that round to zero are not emitted.
#[derive(Debug)]
pub struct CashSplitSizer {
    min_cash_buffer: f64,
    n_assets: usize,
}

impl CashSplitSizer {
    pub fn new(min_cash_buffer: f64, n_assets: usize) -> Self {
        Self {
            min_cash_buffer,
            n_assets,
        }
    }
}

impl OrderSizer for CashSplitSizer {
    fn size(
        &self,
        date: NaiveDate,
        decision: &DayDecision,
        ledger: &PortfolioLedger,
        prices: &BTreeMap<String, f64>,
    ) -> Vec<Order> {
        let mut orders = Vec::new();
        let total = ledger.total_value();
        let cash_pct = if total > 0.0 { ledger.cash() / total } else { 0.0 };
        let budget =
            ledger.cash() * (1.0 - self.min_cash_buffer) * cash_pct / self.n_assets.max(1) as f64;

        for (asset, &action) in &decision.actions {
            let Some(&price) = prices.get(asset) else {
                debug!("{date} no price for {asset}, skipping order");
                continue;
            };

            match action {
                Action::Hold => {}
                Action::Exit => {
                    let holding = ledger.asset(asset).map(|a| a.holding).unwrap_or(0.0);
                    if holding > 0.0 {
                        orders.push(Order {
                            asset: asset.clone(),
                            quantity: -holding,
                            price,
                        });
                    }
                }
                Action::Enter => {
                    if price <= 0.0 {
                        continue;
                    }
                    let quantity = (budget / price).floor();
                    if quantity > 0.0 {
                        orders.push(Order {
                            asset: asset.clone(),
                            quantity,
                            price,
                        });
                    }
                }
            }
        }
        orders
    }
}

/// Resolve the configured sizer name to a concrete sizer.
pub fn build_sizer(
    name: &str,
    config: &dyn ConfigPort,
    n_assets: usize,
) -> Result<Box<dyn OrderSizer>, PolicybackError> {
    match name.trim().to_lowercase().as_str() {
        "cashsplit" => {
            let min_cash_buffer = config.get_double("StrategyConfig", "mincashrequired", 0.0);
            Ok(Box::new(CashSplitSizer::new(min_cash_buffer, n_assets)))
        }
        _ => Err(PolicybackError::UnknownPolicy {
            name: name.trim().to_string(),
        }),
    }
}
