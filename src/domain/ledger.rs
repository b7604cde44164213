//! Portfolio ledger: cash, holdings and daily history.
//!
//! `update` is transactional over the whole order batch. Both the cash
//! pre-check and the negative-holding pre-check run before anything is
//! applied, so a rejected batch leaves the ledger exactly as it was.
//! Holdings never go negative and every daily history table is
//! append-only, one row per update call.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use log::info;

use crate::domain::error::PolicybackError;
use crate::domain::evaluator::InfoMap;

/// One instruction to trade: positive quantity buys, negative sells.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub asset: String,
    pub quantity: f64,
    pub price: f64,
}

impl Order {
    pub fn notional(&self) -> f64 {
        self.quantity * self.price
    }
}

/// Append-only record of an executed trade.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub date: NaiveDate,
    pub asset: String,
    pub quantity: f64,
    pub price: f64,
    pub cost: f64,
}

/// Per-asset state after the most recent update.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetLevel {
    pub holding: f64,
    pub value: f64,
    pub pct_holding: f64,
    pub current_price: f64,
    pub avg_purchase_price: f64,
    pub last_trade_date: Option<NaiveDate>,
    pub days_since_last_trade: i64,
    pub days_holding: i64,
    pub running_performance: f64,
}

impl Default for AssetLevel {
    fn default() -> Self {
        Self {
            holding: 0.0,
            value: 0.0,
            pct_holding: 0.0,
            current_price: 0.0,
            avg_purchase_price: 0.0,
            last_trade_date: None,
            days_since_last_trade: 0,
            days_holding: 0,
            running_performance: 0.0,
        }
    }
}

/// Portfolio-level totals after the most recent update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortfolioLevel {
    pub cash: f64,
    pub total_value: f64,
    pub cash_pct: f64,
    pub cumulative_cost: f64,
}

/// Per-asset row of the positions history table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionRow {
    pub holding: f64,
    pub value: f64,
    pub pct_holding: f64,
}

/// The five daily history tables, keyed by date in ascending order.
#[derive(Debug, Clone, Default)]
pub struct History {
    pub totals: BTreeMap<NaiveDate, PortfolioLevel>,
    pub positions: BTreeMap<NaiveDate, BTreeMap<String, PositionRow>>,
    pub performance: BTreeMap<NaiveDate, BTreeMap<String, f64>>,
    pub days_holding: BTreeMap<NaiveDate, BTreeMap<String, i64>>,
    pub days_since_trade: BTreeMap<NaiveDate, BTreeMap<String, i64>>,
}

#[derive(Debug)]
pub struct PortfolioLedger {
    cash: f64,
    cost_rate: f64,
    cumulative_cost: f64,
    assets: BTreeMap<String, AssetLevel>,
    trades: Vec<TradeRecord>,
    history: History,
}

impl PortfolioLedger {
    /// `cost_rate` is the proportional transaction cost charged on the
    /// absolute notional of every trade.
    pub fn new(initial_cash: f64, cost_rate: f64, assets: &[String]) -> Self {
        let assets = assets
            .iter()
            .map(|name| (name.clone(), AssetLevel::default()))
            .collect();
        Self {
            cash: initial_cash,
            cost_rate,
            cumulative_cost: 0.0,
            assets,
            trades: Vec::new(),
            history: History::default(),
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn total_value(&self) -> f64 {
        self.cash + self.assets.values().map(|a| a.value).sum::<f64>()
    }

    pub fn asset(&self, name: &str) -> Option<&AssetLevel> {
        self.assets.get(name)
    }

    pub fn assets(&self) -> &BTreeMap<String, AssetLevel> {
        &self.assets
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Execute a batch of orders, then revalue at `prices` and append
    /// the day's history rows. All-or-nothing: any pre-check failure
    /// rejects the entire batch with the ledger untouched.
    pub fn update(
        &mut self,
        date: NaiveDate,
        orders: &[Order],
        prices: &BTreeMap<String, f64>,
    ) -> Result<(), PolicybackError> {
        // History rows are keyed by date; revisiting a date would
        // silently overwrite the earlier row.
        debug_assert!(
            self.history.totals.keys().next_back().is_none_or(|&last| date > last),
            "ledger update for {date} does not advance past recorded history"
        );
        self.pre_check(date, orders)?;

        for order in orders {
            if order.quantity == 0.0 {
                continue;
            }
            self.apply(date, order);
        }

        self.revalue(date, prices);
        self.append_history(date);
        Ok(())
    }

    fn pre_check(&self, date: NaiveDate, orders: &[Order]) -> Result<(), PolicybackError> {
        let required: f64 = orders
            .iter()
            .map(|o| o.notional() + o.notional().abs() * self.cost_rate)
            .sum();
        if required > self.cash {
            return Err(PolicybackError::InsufficientFunds {
                date,
                available: self.cash,
                required,
            });
        }

        // Walk the batch in order so repeated orders for one asset are
        // checked against their running holding.
        let mut holdings: BTreeMap<&str, f64> = BTreeMap::new();
        for order in orders {
            let holding = holdings.entry(order.asset.as_str()).or_insert_with(|| {
                self.assets
                    .get(&order.asset)
                    .map(|a| a.holding)
                    .unwrap_or(0.0)
            });
            if *holding + order.quantity < 0.0 {
                return Err(PolicybackError::NegativeHolding {
                    date,
                    asset: order.asset.clone(),
                    holding: *holding,
                    quantity: order.quantity,
                });
            }
            *holding += order.quantity;
        }
        Ok(())
    }

    fn apply(&mut self, date: NaiveDate, order: &Order) {
        let cost = order.notional().abs() * self.cost_rate;
        let entry = self.assets.entry(order.asset.clone()).or_default();

        let new_holding = entry.holding + order.quantity;
        if order.quantity > 0.0 {
            entry.avg_purchase_price = (entry.avg_purchase_price * entry.holding
                + order.price * order.quantity)
                / new_holding;
        } else if new_holding == 0.0 {
            entry.avg_purchase_price = 0.0;
        }
        entry.holding = new_holding;
        entry.last_trade_date = Some(date);

        self.cash -= order.notional() + cost;
        self.cumulative_cost += cost;
        self.trades.push(TradeRecord {
            date,
            asset: order.asset.clone(),
            quantity: order.quantity,
            price: order.price,
            cost,
        });
        info!(
            "{date} trade {}: qty {} @ {} (cost {cost})",
            order.asset, order.quantity, order.price
        );
    }

    fn revalue(&mut self, date: NaiveDate, prices: &BTreeMap<String, f64>) {
        for (name, asset) in &mut self.assets {
            if let Some(&price) = prices.get(name) {
                asset.current_price = price;
            }
            asset.value = asset.holding * asset.current_price;

            asset.days_since_last_trade = asset
                .last_trade_date
                .map(|d| (date - d).num_days())
                .unwrap_or(0);

            if asset.holding > 0.0 {
                asset.days_holding += 1;
                asset.running_performance = if asset.avg_purchase_price > 0.0 {
                    (asset.current_price - asset.avg_purchase_price) / asset.avg_purchase_price
                } else {
                    0.0
                };
            } else {
                asset.days_holding = 0;
                asset.running_performance = 0.0;
            }
        }

        let total = self.total_value();
        for asset in self.assets.values_mut() {
            asset.pct_holding = if total > 0.0 { asset.value / total } else { 0.0 };
        }
    }

    fn append_history(&mut self, date: NaiveDate) {
        let total = self.total_value();
        self.history.totals.insert(
            date,
            PortfolioLevel {
                cash: self.cash,
                total_value: total,
                cash_pct: if total > 0.0 { self.cash / total } else { 0.0 },
                cumulative_cost: self.cumulative_cost,
            },
        );

        let mut positions = BTreeMap::new();
        let mut performance = BTreeMap::new();
        let mut days_holding = BTreeMap::new();
        let mut days_since_trade = BTreeMap::new();
        for (name, asset) in &self.assets {
            positions.insert(
                name.clone(),
                PositionRow {
                    holding: asset.holding,
                    value: asset.value,
                    pct_holding: asset.pct_holding,
                },
            );
            performance.insert(name.clone(), asset.running_performance);
            days_holding.insert(name.clone(), asset.days_holding);
            days_since_trade.insert(name.clone(), asset.days_since_last_trade);
        }
        self.history.positions.insert(date, positions);
        self.history.performance.insert(date, performance);
        self.history.days_holding.insert(date, days_holding);
        self.history.days_since_trade.insert(date, days_since_trade);
    }

    /// Field snapshot of one asset for signal evaluation.
    pub fn asset_info(&self, name: &str) -> InfoMap {
        let Some(asset) = self.assets.get(name) else {
            return InfoMap::new();
        };
        InfoMap::from([
            ("holding".to_string(), asset.holding),
            ("value".to_string(), asset.value),
            ("pctHolding".to_string(), asset.pct_holding),
            ("currentPrice".to_string(), asset.current_price),
            ("avgPurchasePrice".to_string(), asset.avg_purchase_price),
            (
                "daysSinceLastTrade".to_string(),
                asset.days_since_last_trade as f64,
            ),
            ("daysHolding".to_string(), asset.days_holding as f64),
            (
                "runningPerformance".to_string(),
                asset.running_performance,
            ),
        ])
    }

    /// Field snapshot of the portfolio for signal evaluation.
    pub fn portfolio_info(&self) -> InfoMap {
        let total = self.total_value();
        InfoMap::from([
            ("cash".to_string(), self.cash),
            ("totalValue".to_string(), total),
            (
                "cashPct".to_string(),
                if total > 0.0 { self.cash / total } else { 0.0 },
            ),
            ("cumulativeCost".to_string(), self.cumulative_cost),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn buy(asset: &str, quantity: f64, price: f64) -> Order {
        Order {
            asset: asset.to_string(),
            quantity,
            price,
        }
    }

    fn sell(asset: &str, quantity: f64, price: f64) -> Order {
        Order {
            asset: asset.to_string(),
            quantity: -quantity,
            price,
        }
    }

    fn prices(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(a, p)| (a.to_string(), *p)).collect()
    }

    fn assert_identity(ledger: &PortfolioLedger) {
        let total = ledger.total_value();
        let sum = ledger.cash() + ledger.assets().values().map(|a| a.value).sum::<f64>();
        assert!((total - sum).abs() < 1e-9);
    }

    #[test]
    fn buy_updates_cash_and_average_price() {
        let mut ledger = PortfolioLedger::new(1_000_000.0, 0.0, &["A".to_string()]);

        ledger
            .update(day(1), &[buy("A", 100.0, 10.0)], &prices(&[("A", 10.0)]))
            .unwrap();

        assert_eq!(ledger.cash(), 999_000.0);
        let a = ledger.asset("A").unwrap();
        assert_eq!(a.holding, 100.0);
        assert_eq!(a.avg_purchase_price, 10.0);
        assert_eq!(a.value, 1_000.0);
        assert_eq!(ledger.total_value(), 1_000_000.0);
        assert_identity(&ledger);
    }

    #[test]
    fn price_move_updates_value_and_performance() {
        let mut ledger = PortfolioLedger::new(1_000_000.0, 0.0, &["A".to_string()]);
        ledger
            .update(day(1), &[buy("A", 100.0, 10.0)], &prices(&[("A", 10.0)]))
            .unwrap();

        ledger.update(day(2), &[], &prices(&[("A", 12.0)])).unwrap();

        let a = ledger.asset("A").unwrap();
        assert_eq!(a.value, 1_200.0);
        assert!((a.running_performance - 0.2).abs() < 1e-12);
        assert_eq!(ledger.total_value(), 1_000_200.0);
        assert_identity(&ledger);
    }

    #[test]
    fn full_exit_resets_average_price() {
        let mut ledger = PortfolioLedger::new(1_000_000.0, 0.0, &["A".to_string()]);
        ledger
            .update(day(1), &[buy("A", 100.0, 10.0)], &prices(&[("A", 10.0)]))
            .unwrap();

        ledger
            .update(day(2), &[sell("A", 100.0, 12.0)], &prices(&[("A", 12.0)]))
            .unwrap();

        assert_eq!(ledger.cash(), 1_000_200.0);
        let a = ledger.asset("A").unwrap();
        assert_eq!(a.holding, 0.0);
        assert_eq!(a.avg_purchase_price, 0.0);
        assert_eq!(a.running_performance, 0.0);
        assert_identity(&ledger);
    }

    #[test]
    fn partial_exit_keeps_average_price() {
        let mut ledger = PortfolioLedger::new(1_000_000.0, 0.0, &["A".to_string()]);
        ledger
            .update(day(1), &[buy("A", 100.0, 10.0)], &prices(&[("A", 10.0)]))
            .unwrap();
        ledger
            .update(day(2), &[sell("A", 40.0, 12.0)], &prices(&[("A", 12.0)]))
            .unwrap();

        let a = ledger.asset("A").unwrap();
        assert_eq!(a.holding, 60.0);
        assert_eq!(a.avg_purchase_price, 10.0);
    }

    #[test]
    fn repeated_buys_use_weighted_average() {
        let mut ledger = PortfolioLedger::new(1_000_000.0, 0.0, &["A".to_string()]);
        ledger
            .update(day(1), &[buy("A", 100.0, 10.0)], &prices(&[("A", 10.0)]))
            .unwrap();
        ledger
            .update(day(2), &[buy("A", 100.0, 20.0)], &prices(&[("A", 20.0)]))
            .unwrap();

        let a = ledger.asset("A").unwrap();
        assert_eq!(a.holding, 200.0);
        assert!((a.avg_purchase_price - 15.0).abs() < 1e-12);
    }

    #[test]
    fn insufficient_funds_rejects_whole_batch() {
        let mut ledger = PortfolioLedger::new(
            1_000_000.0,
            0.0,
            &["A".to_string(), "B".to_string()],
        );

        // 600k + 500k = 1.1m against 1m cash.
        let err = ledger
            .update(
                day(1),
                &[buy("A", 60_000.0, 10.0), buy("B", 50_000.0, 10.0)],
                &prices(&[("A", 10.0), ("B", 10.0)]),
            )
            .unwrap_err();

        assert!(matches!(
            err,
            PolicybackError::InsufficientFunds {
                required,
                available,
                ..
            } if required == 1_100_000.0 && available == 1_000_000.0
        ));
        assert_eq!(ledger.cash(), 1_000_000.0);
        assert_eq!(ledger.asset("A").unwrap().holding, 0.0);
        assert_eq!(ledger.asset("B").unwrap().holding, 0.0);
        assert!(ledger.trades().is_empty());
        assert!(ledger.history().totals.is_empty());
    }

    #[test]
    fn transaction_cost_counts_toward_cash_check() {
        // 1000 notional + 2 cost against 1001 cash.
        let mut ledger = PortfolioLedger::new(1_001.0, 0.002, &["A".to_string()]);
        let err = ledger
            .update(day(1), &[buy("A", 100.0, 10.0)], &prices(&[("A", 10.0)]))
            .unwrap_err();
        assert!(matches!(err, PolicybackError::InsufficientFunds { .. }));

        let mut ledger = PortfolioLedger::new(1_002.0, 0.002, &["A".to_string()]);
        ledger
            .update(day(1), &[buy("A", 100.0, 10.0)], &prices(&[("A", 10.0)]))
            .unwrap();
        assert!((ledger.cash() - 0.0).abs() < 1e-12);
    }

    #[test]
    fn sell_proceeds_offset_buys_in_cash_check() {
        let mut ledger = PortfolioLedger::new(100.0, 0.0, &["A".to_string(), "B".to_string()]);
        ledger
            .update(day(1), &[buy("A", 10.0, 10.0)], &prices(&[("A", 10.0), ("B", 10.0)]))
            .unwrap();
        assert_eq!(ledger.cash(), 0.0);

        // No free cash, but the sale funds the purchase.
        ledger
            .update(
                day(2),
                &[sell("A", 10.0, 10.0), buy("B", 10.0, 10.0)],
                &prices(&[("A", 10.0), ("B", 10.0)]),
            )
            .unwrap();
        assert_eq!(ledger.asset("A").unwrap().holding, 0.0);
        assert_eq!(ledger.asset("B").unwrap().holding, 10.0);
    }

    #[test]
    fn oversell_rejects_whole_batch() {
        let mut ledger = PortfolioLedger::new(
            1_000_000.0,
            0.0,
            &["A".to_string(), "B".to_string()],
        );
        ledger
            .update(day(1), &[buy("A", 50.0, 10.0)], &prices(&[("A", 10.0), ("B", 10.0)]))
            .unwrap();
        let cash_before = ledger.cash();
        let trades_before = ledger.trades().len();

        let err = ledger
            .update(
                day(2),
                &[buy("B", 10.0, 10.0), sell("A", 100.0, 10.0)],
                &prices(&[("A", 10.0), ("B", 10.0)]),
            )
            .unwrap_err();

        assert!(matches!(err, PolicybackError::NegativeHolding { .. }));
        assert_eq!(ledger.cash(), cash_before);
        assert_eq!(ledger.asset("B").unwrap().holding, 0.0);
        assert_eq!(ledger.trades().len(), trades_before);
    }

    #[test]
    fn day_counters_advance() {
        let mut ledger = PortfolioLedger::new(1_000_000.0, 0.0, &["A".to_string()]);
        ledger
            .update(day(1), &[buy("A", 100.0, 10.0)], &prices(&[("A", 10.0)]))
            .unwrap();
        ledger.update(day(2), &[], &prices(&[("A", 10.0)])).unwrap();
        ledger.update(day(5), &[], &prices(&[("A", 10.0)])).unwrap();

        let a = ledger.asset("A").unwrap();
        assert_eq!(a.days_since_last_trade, 4);
        assert_eq!(a.days_holding, 3);

        ledger
            .update(day(6), &[sell("A", 100.0, 10.0)], &prices(&[("A", 10.0)]))
            .unwrap();
        let a = ledger.asset("A").unwrap();
        assert_eq!(a.days_since_last_trade, 0);
        assert_eq!(a.days_holding, 0);
    }

    #[test]
    fn history_is_append_only() {
        let mut ledger = PortfolioLedger::new(1_000_000.0, 0.0, &["A".to_string()]);
        ledger
            .update(day(1), &[buy("A", 100.0, 10.0)], &prices(&[("A", 10.0)]))
            .unwrap();
        let first_total = ledger.history().totals[&day(1)];

        ledger.update(day(2), &[], &prices(&[("A", 12.0)])).unwrap();

        assert_eq!(ledger.history().totals.len(), 2);
        assert_eq!(ledger.history().positions.len(), 2);
        assert_eq!(ledger.history().performance.len(), 2);
        assert_eq!(ledger.history().days_holding.len(), 2);
        assert_eq!(ledger.history().days_since_trade.len(), 2);
        // Day one's row is unchanged by day two's update.
        assert_eq!(ledger.history().totals[&day(1)], first_total);
        assert_eq!(ledger.history().positions[&day(1)]["A"].holding, 100.0);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "does not advance past recorded history")]
    fn revisiting_a_recorded_date_panics() {
        let mut ledger = PortfolioLedger::new(1_000_000.0, 0.0, &["A".to_string()]);
        ledger
            .update(day(2), &[buy("A", 100.0, 10.0)], &prices(&[("A", 10.0)]))
            .unwrap();
        let _ = ledger.update(day(2), &[], &prices(&[("A", 11.0)]));
    }

    #[test]
    fn snapshots_expose_evaluation_fields() {
        let mut ledger = PortfolioLedger::new(1_000_000.0, 0.0, &["A".to_string()]);
        ledger
            .update(day(1), &[buy("A", 100.0, 10.0)], &prices(&[("A", 10.0)]))
            .unwrap();
        ledger.update(day(2), &[], &prices(&[("A", 12.0)])).unwrap();

        let info = ledger.asset_info("A");
        assert_eq!(info["holding"], 100.0);
        assert_eq!(info["currentPrice"], 12.0);
        assert!((info["runningPerformance"] - 0.2).abs() < 1e-12);
        assert_eq!(info["daysHolding"], 2.0);

        let portfolio = ledger.portfolio_info();
        assert_eq!(portfolio["totalValue"], 1_000_200.0);
        assert_eq!(portfolio["cash"], 999_000.0);
        assert!(portfolio["cashPct"] < 1.0);

        assert!(ledger.asset_info("UNKNOWN").is_empty());
    }

    #[test]
    fn cash_pct_in_portfolio_history() {
        let mut ledger = PortfolioLedger::new(1_000.0, 0.0, &["A".to_string()]);
        ledger
            .update(day(1), &[buy("A", 50.0, 10.0)], &prices(&[("A", 10.0)]))
            .unwrap();

        let totals = ledger.history().totals[&day(1)];
        assert_eq!(totals.cash, 500.0);
        assert_eq!(totals.total_value, 1_000.0);
        assert!((totals.cash_pct - 0.5).abs() < 1e-12);
    }
}
