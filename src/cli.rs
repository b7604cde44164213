//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::benchmark::CompositeBenchmark;
use crate::domain::config::{BenchmarkConfig, StrategyConfig, STRATEGY_SECTION};
use crate::domain::driver::SimulationDriver;
use crate::domain::error::PolicybackError;
use crate::domain::policy::PolicyRegistry;
use crate::domain::sizing::build_sizer;
use crate::domain::stats;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;

#[derive(Parser, Debug)]
#[command(name = "policyback", about = "Policy-driven portfolio backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a simulation
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// Overrides startDate from the config
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Overrides endDate from the config
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    /// Validate a configuration without running
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Run { config, start, end } => run_simulation(&config, start, end),
        Command::Validate { config } => run_validate(&config),
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = PolicybackError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn run_simulation(
    config_path: &PathBuf,
    start_override: Option<NaiveDate>,
    end_override: Option<NaiveDate>,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    match run_simulation_inner(&adapter, start_override, end_override) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn run_simulation_inner(
    adapter: &FileConfigAdapter,
    start_override: Option<NaiveDate>,
    end_override: Option<NaiveDate>,
) -> Result<(), PolicybackError> {
    let strategy = StrategyConfig::from_config(adapter)?;
    let registry = PolicyRegistry::from_config(adapter)?;
    let sizer = build_sizer(&strategy.sizer_name, adapter, strategy.assets.len())?;

    let start = resolve_date(adapter, "startdate", start_override)?;
    let end = resolve_date(adapter, "enddate", end_override)?;
    if end < start {
        return Err(PolicybackError::ConfigInvalid {
            section: STRATEGY_SECTION.to_string(),
            key: "enddate".to_string(),
            reason: format!("end {end} before start {start}"),
        });
    }

    let benchmark_config = BenchmarkConfig::from_config(adapter)?;

    let price_data = CsvAdapter::new(strategy.asset_data_path.clone());
    let market_data = CsvAdapter::new(strategy.market_data_path.clone());

    let benchmark = match &benchmark_config {
        Some(cfg) => {
            let benchmark_data = CsvAdapter::new(
                cfg.price_path
                    .clone()
                    .unwrap_or_else(|| strategy.asset_data_path.clone()),
            );
            let mut closes = std::collections::BTreeMap::new();
            for asset in cfg.weights.keys() {
                closes.insert(asset.clone(), benchmark_data.fetch_closes(asset)?);
            }
            Some(CompositeBenchmark::build(&cfg.weights, &closes, start, end)?)
        }
        None => None,
    };

    eprintln!(
        "Running simulation: {} assets, {start} to {end}",
        strategy.assets.len()
    );

    let mut driver =
        SimulationDriver::initialize(strategy, registry, sizer, &price_data, &market_data)?;
    let traded = driver.run(start, end)?;

    print_summary(&driver, &traded, benchmark.as_ref());
    Ok(())
}

fn resolve_date(
    config: &dyn ConfigPort,
    key: &str,
    cli_override: Option<NaiveDate>,
) -> Result<NaiveDate, PolicybackError> {
    if let Some(date) = cli_override {
        return Ok(date);
    }
    let raw = config.get_string(STRATEGY_SECTION, key).ok_or_else(|| {
        PolicybackError::ConfigMissing {
            section: STRATEGY_SECTION.to_string(),
            key: key.to_string(),
        }
    })?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| PolicybackError::ConfigInvalid {
        section: STRATEGY_SECTION.to_string(),
        key: key.to_string(),
        reason: "invalid date format (expected YYYY-MM-DD)".to_string(),
    })
}

fn print_summary(
    driver: &SimulationDriver,
    traded: &[NaiveDate],
    benchmark: Option<&CompositeBenchmark>,
) {
    let ledger = driver.ledger();
    let values: Vec<f64> = ledger
        .history()
        .totals
        .values()
        .map(|t| t.total_value)
        .collect();
    let returns = stats::simple_returns(&values);
    let calendar_days = match (traded.first(), traded.last()) {
        (Some(&first), Some(&last)) => (last - first).num_days(),
        _ => 0,
    };

    eprintln!("\n=== Portfolio ===");
    eprintln!("Trading Days:     {}", traded.len());
    eprintln!("Total Trades:     {}", ledger.trades().len());
    eprintln!("Final Value:      {:.2}", ledger.total_value());
    eprintln!("Final Cash:       {:.2}", ledger.cash());
    eprintln!(
        "Total Return:     {:.2}%",
        stats::cumulative_return(&values) * 100.0
    );
    eprintln!(
        "Annualized:       {:.2}%",
        stats::annualized_return(&values, calendar_days) * 100.0
    );
    eprintln!(
        "Volatility:       {:.2}%",
        stats::annualized_volatility(&returns) * 100.0
    );
    eprintln!("Sharpe Ratio:     {:.2}", stats::sharpe_ratio(&returns, 0.0));
    eprintln!(
        "Sortino Ratio:    {:.2}",
        stats::sortino_ratio(&returns, 0.0)
    );
    eprintln!(
        "Max Drawdown:     {:.1}%",
        stats::max_drawdown(&values) * 100.0
    );
    eprintln!(
        "VaR 95% (hist):   {:.2}%",
        stats::historical_var(&returns, 0.95) * 100.0
    );
    eprintln!(
        "CVaR 95% (hist):  {:.2}%",
        stats::historical_cvar(&returns, 0.95) * 100.0
    );
    eprintln!(
        "VaR 95% (gauss):  {:.2}%",
        stats::gaussian_var(&returns, 0.95) * 100.0
    );

    let Some(benchmark) = benchmark else {
        return;
    };

    // Align the two series on the days both have a value.
    let mut portfolio_aligned = Vec::new();
    let mut benchmark_aligned = Vec::new();
    for (date, totals) in &ledger.history().totals {
        if let Some(value) = benchmark.value_on(*date) {
            portfolio_aligned.push(totals.total_value);
            benchmark_aligned.push(value);
        }
    }
    let portfolio_returns = stats::simple_returns(&portfolio_aligned);
    let benchmark_returns = stats::simple_returns(&benchmark_aligned);

    eprintln!("\n=== Versus Benchmark ===");
    eprintln!(
        "Benchmark Return: {:.2}%",
        stats::cumulative_return(&benchmark_aligned) * 100.0
    );
    eprintln!(
        "Beta:             {:.2}",
        stats::beta(&portfolio_returns, &benchmark_returns)
    );
    eprintln!(
        "Correlation:      {:.2}",
        stats::correlation(&portfolio_returns, &benchmark_returns)
    );
    eprintln!(
        "Tracking Error:   {:.2}%",
        stats::tracking_error(&portfolio_returns, &benchmark_returns) * 100.0
    );
    eprintln!(
        "Info Ratio:       {:.2}",
        stats::information_ratio(&portfolio_returns, &benchmark_returns)
    );
}

fn run_validate(config_path: &PathBuf) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    match validate(&adapter) {
        Ok(()) => {
            eprintln!("\nConfiguration is valid.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn validate(adapter: &FileConfigAdapter) -> Result<(), PolicybackError> {
    let strategy = StrategyConfig::from_config(adapter)?;
    let registry = PolicyRegistry::from_config(adapter)?;
    build_sizer(&strategy.sizer_name, adapter, strategy.assets.len())?;
    BenchmarkConfig::from_config(adapter)?;

    eprintln!("\nAssets: {}", strategy.assets.join(", "));
    eprintln!("Sizing policy: {}", strategy.sizer_name);
    eprintln!("Policies:");
    for policy in registry.policies() {
        let scopes: Vec<&str> = policy.scopes.keys().map(|s| s.key()).collect();
        eprintln!("  {} ({:?}, scopes: {})", policy.name, policy.kind, scopes.join(", "));
    }
    Ok(())
}
