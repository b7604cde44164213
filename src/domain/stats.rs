//! Performance statistics over daily price and return series.
//!
//! All functions are pure and total: degenerate input (empty series,
//! zero variance, non-positive prices) yields 0.0 rather than an error.
//! Returns are daily simple returns; annualization uses 252 trading
//! days, while horizon-based annualized return uses 365 calendar days.

use statrs::distribution::{Continuous, ContinuousCDF, Normal};

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;
pub const DAYS_PER_YEAR: f64 = 365.0;

/// Daily simple returns: `p[i] / p[i-1] - 1`.
pub fn simple_returns(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}

pub fn cumulative_return(prices: &[f64]) -> f64 {
    match (prices.first(), prices.last()) {
        (Some(&first), Some(&last)) if first > 0.0 => last / first - 1.0,
        _ => 0.0,
    }
}

/// Geometric annualization over the actual calendar span in days.
pub fn annualized_return(prices: &[f64], calendar_days: i64) -> f64 {
    if calendar_days <= 0 {
        return 0.0;
    }
    match (prices.first(), prices.last()) {
        (Some(&first), Some(&last)) if first > 0.0 && last > 0.0 => {
            (last / first).powf(DAYS_PER_YEAR / calendar_days as f64) - 1.0
        }
        _ => 0.0,
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

pub fn annualized_volatility(returns: &[f64]) -> f64 {
    std_dev(returns) * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Historical VaR: the `(1 − confidence)` quantile of the return
/// distribution. Negative for a losing tail.
pub fn historical_var(returns: &[f64], confidence: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let idx = ((1.0 - confidence) * sorted.len() as f64).floor() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Historical CVaR: mean of the returns at or below the VaR quantile.
pub fn historical_cvar(returns: &[f64], confidence: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let var = historical_var(returns, confidence);
    let tail: Vec<f64> = returns.iter().copied().filter(|&r| r <= var).collect();
    mean(&tail)
}

/// Parametric VaR under a normal return distribution.
pub fn gaussian_var(returns: &[f64], confidence: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let normal = Normal::new(0.0, 1.0).unwrap();
    let z = normal.inverse_cdf(1.0 - confidence);
    mean(returns) + std_dev(returns) * z
}

/// Parametric CVaR under a normal return distribution.
pub fn gaussian_cvar(returns: &[f64], confidence: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let alpha = 1.0 - confidence;
    if alpha <= 0.0 {
        return 0.0;
    }
    let normal = Normal::new(0.0, 1.0).unwrap();
    let z = normal.inverse_cdf(alpha);
    mean(returns) - std_dev(returns) * normal.pdf(z) / alpha
}

/// Per-day drawdown from the running peak, as a non-positive fraction.
pub fn drawdown_series(prices: &[f64]) -> Vec<f64> {
    let mut peak = f64::MIN;
    prices
        .iter()
        .map(|&p| {
            peak = peak.max(p);
            if peak > 0.0 { p / peak - 1.0 } else { 0.0 }
        })
        .collect()
}

pub fn max_drawdown(prices: &[f64]) -> f64 {
    drawdown_series(prices)
        .into_iter()
        .fold(0.0, f64::min)
}

/// Annualized Sharpe ratio against a daily risk-free rate.
pub fn sharpe_ratio(returns: &[f64], risk_free_daily: f64) -> f64 {
    let sd = std_dev(returns);
    if sd == 0.0 {
        return 0.0;
    }
    (mean(returns) - risk_free_daily) / sd * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Annualized Sortino ratio: downside deviation in the denominator.
pub fn sortino_ratio(returns: &[f64], risk_free_daily: f64) -> f64 {
    let downside: Vec<f64> = returns
        .iter()
        .map(|&r| (r - risk_free_daily).min(0.0))
        .collect();
    if downside.is_empty() {
        return 0.0;
    }
    let dd =
        (downside.iter().map(|d| d * d).sum::<f64>() / downside.len() as f64).sqrt();
    if dd == 0.0 {
        return 0.0;
    }
    (mean(returns) - risk_free_daily) / dd * TRADING_DAYS_PER_YEAR.sqrt()
}

pub fn calmar_ratio(prices: &[f64], calendar_days: i64) -> f64 {
    let mdd = max_drawdown(prices).abs();
    if mdd == 0.0 {
        return 0.0;
    }
    annualized_return(prices, calendar_days) / mdd
}

fn covariance(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let ma = mean(&a[..n]);
    let mb = mean(&b[..n]);
    a[..n]
        .iter()
        .zip(&b[..n])
        .map(|(x, y)| (x - ma) * (y - mb))
        .sum::<f64>()
        / (n - 1) as f64
}

pub fn beta(returns: &[f64], benchmark_returns: &[f64]) -> f64 {
    let var = std_dev(benchmark_returns).powi(2);
    if var == 0.0 {
        return 0.0;
    }
    covariance(returns, benchmark_returns) / var
}

pub fn correlation(a: &[f64], b: &[f64]) -> f64 {
    let denom = std_dev(a) * std_dev(b);
    if denom == 0.0 {
        return 0.0;
    }
    covariance(a, b) / denom
}

fn excess_returns(returns: &[f64], benchmark_returns: &[f64]) -> Vec<f64> {
    returns
        .iter()
        .zip(benchmark_returns)
        .map(|(r, b)| r - b)
        .collect()
}

/// Annualized standard deviation of the excess return.
pub fn tracking_error(returns: &[f64], benchmark_returns: &[f64]) -> f64 {
    annualized_volatility(&excess_returns(returns, benchmark_returns))
}

/// Annualized mean excess return over tracking error.
pub fn information_ratio(returns: &[f64], benchmark_returns: &[f64]) -> f64 {
    let excess = excess_returns(returns, benchmark_returns);
    let te = tracking_error(returns, benchmark_returns);
    if te == 0.0 {
        return 0.0;
    }
    mean(&excess) * TRADING_DAYS_PER_YEAR / te
}
