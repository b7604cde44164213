//! Simulation driver: the day-by-day run loop.
//!
//! Initialization loads every price and market series up front and
//! builds the ledger; the run loop then walks each calendar day from
//! start to end inclusive. Days where no asset has a usable price are
//! skipped for trading but still advance the date. A ledger rejection
//! aborts the run rather than skipping the day.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use log::{debug, info};

use crate::domain::config::StrategyConfig;
use crate::domain::error::PolicybackError;
use crate::domain::evaluator::{InfoMap, PolicyEvaluator};
use crate::domain::ledger::PortfolioLedger;
use crate::domain::policy::PolicyRegistry;
use crate::domain::sizing::OrderSizer;
use crate::ports::data_port::DataPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Initializing,
    Running,
    Done,
}

#[derive(Debug)]
pub struct SimulationDriver {
    strategy: StrategyConfig,
    registry: PolicyRegistry,
    sizer: Box<dyn OrderSizer>,
    ledger: PortfolioLedger,
    closes: BTreeMap<String, BTreeMap<NaiveDate, f64>>,
    market: BTreeMap<NaiveDate, HashMap<String, f64>>,
    state: DriverState,
}

impl SimulationDriver {
    /// Load all series and build the starting ledger. Any asset whose
    /// price series cannot be loaded fails initialization.
    pub fn initialize(
        strategy: StrategyConfig,
        registry: PolicyRegistry,
        sizer: Box<dyn OrderSizer>,
        price_data: &dyn DataPort,
        market_data: &dyn DataPort,
    ) -> Result<Self, PolicybackError> {
        let mut closes = BTreeMap::new();
        for asset in &strategy.assets {
            closes.insert(asset.clone(), price_data.fetch_closes(asset)?);
        }

        let mut market: BTreeMap<NaiveDate, HashMap<String, f64>> = BTreeMap::new();
        for file in &strategy.market_info_files {
            for (date, values) in market_data.fetch_factors(file)? {
                market.entry(date).or_default().extend(values);
            }
        }

        let ledger = PortfolioLedger::new(
            strategy.initial_capital,
            strategy.transaction_cost,
            &strategy.assets,
        );

        Ok(Self {
            strategy,
            registry,
            sizer,
            ledger,
            closes,
            market,
            state: DriverState::Running,
        })
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn ledger(&self) -> &PortfolioLedger {
        &self.ledger
    }

    /// Walk every calendar day in `[start, end]`. Returns the dates that
    /// actually traded (had at least one usable price).
    pub fn run(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, PolicybackError> {
        let mut traded = Vec::new();
        let mut date = start;

        while date <= end {
            let prices = self.prices_on(date);
            if prices.is_empty() {
                debug!("{date}: no prices, skipping");
            } else {
                self.step(date, &prices)?;
                traded.push(date);
            }
            let Some(next) = date.succ_opt() else { break };
            date = next;
        }

        self.state = DriverState::Done;
        info!(
            "run complete: {} trading days, {} trades, final value {}",
            traded.len(),
            self.ledger.trades().len(),
            self.ledger.total_value()
        );
        Ok(traded)
    }

    /// One trading day: snapshot → evaluate → size → settle.
    fn step(
        &mut self,
        date: NaiveDate,
        prices: &BTreeMap<String, f64>,
    ) -> Result<(), PolicybackError> {
        let assets: Vec<String> = prices.keys().cloned().collect();

        let asset_info: HashMap<String, InfoMap> = assets
            .iter()
            .map(|asset| (asset.clone(), self.asset_snapshot(asset, prices[asset])))
            .collect();
        let portfolio_info = self.ledger.portfolio_info();
        let market_info = self.market.get(&date);

        let evaluator = PolicyEvaluator::new(&self.registry, self.strategy.tie_break);
        let (_, decision) =
            evaluator.evaluate_day(&assets, &asset_info, &portfolio_info, market_info);

        let orders = self.sizer.size(date, &decision, &self.ledger, prices);
        self.ledger.update(date, &orders, prices)
    }

    /// Today's usable prices: present in the series and positive, so
    /// the leading forward-fill sentinel never trades.
    fn prices_on(&self, date: NaiveDate) -> BTreeMap<String, f64> {
        self.closes
            .iter()
            .filter_map(|(asset, series)| {
                series
                    .get(&date)
                    .filter(|&&p| p > 0.0)
                    .map(|&p| (asset.clone(), p))
            })
            .collect()
    }

    /// The ledger snapshot refreshed with today's price, so signals see
    /// the price they would trade at.
    fn asset_snapshot(&self, asset: &str, price: f64) -> InfoMap {
        let mut info = self.ledger.asset_info(asset);
        info.insert("currentPrice".to_string(), price);
        if let Some(level) = self.ledger.asset(asset) {
            info.insert("value".to_string(), level.holding * price);
            if level.holding > 0.0 && level.avg_purchase_price > 0.0 {
                info.insert(
                    "runningPerformance".to_string(),
                    (price - level.avg_purchase_price) / level.avg_purchase_price,
                );
            }
        }
        info
    }
}
