//! Objective functions scoring a set of backtest trades, lower is better.
//!
//! Only the scoring interface lives here; nothing in the crate searches
//! parameters with it.

use chrono::{DateTime, Utc};

use super::metrics::TradeRecord;
use crate::error::{EngineError, Result};

/// Total profit ratio treated as a perfect score
const EXPECTED_MAX_PROFIT: f64 = 3.0;
const TARGET_TRADES: f64 = 600.0;
const MAX_ACCEPTED_TRADE_DURATION: f64 = 300.0;
/// Per-trade slippage assumed by the Sharpe loss
const SLIPPAGE_PER_TRADE: f64 = 0.0005;

pub trait LossFunction: Send + Sync {
    fn name(&self) -> &str;

    /// Score `trades` taken between `min_date` and `max_date`
    fn loss(&self, trades: &[TradeRecord], min_date: DateTime<Utc>, max_date: DateTime<Utc>) -> f64;
}

fn total_profit(trades: &[TradeRecord]) -> f64 {
    trades.iter().map(|t| t.profit_ratio).sum()
}

/// Rewards total profit and nothing else
#[derive(Debug, Default, Clone, Copy)]
pub struct OnlyProfitLoss;

impl LossFunction for OnlyProfitLoss {
    fn name(&self) -> &str {
        "only_profit"
    }

    fn loss(&self, trades: &[TradeRecord], _min: DateTime<Utc>, _max: DateTime<Utc>) -> f64 {
        1.0 - total_profit(trades) / EXPECTED_MAX_PROFIT
    }
}

/// Negated annualised Sharpe ratio of per-trade returns
#[derive(Debug, Default, Clone, Copy)]
pub struct SharpeLoss;

impl LossFunction for SharpeLoss {
    fn name(&self) -> &str {
        "sharpe"
    }

    fn loss(&self, trades: &[TradeRecord], min_date: DateTime<Utc>, max_date: DateTime<Utc>) -> f64 {
        if trades.is_empty() {
            return 20.0;
        }

        let returns: Vec<f64> = trades
            .iter()
            .map(|t| t.profit_ratio - SLIPPAGE_PER_TRADE)
            .collect();
        // Periods shorter than a day count as one day
        let days = (max_date - min_date).num_days().max(1) as f64;
        let expected_yearly_return = returns.iter().sum::<f64>() / days;

        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let std_dev = (returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
            / returns.len() as f64)
            .sqrt();

        let sharpe = if std_dev != 0.0 {
            expected_yearly_return / std_dev * 365f64.sqrt()
        } else {
            -20.0
        };
        -sharpe
    }
}

/// Weighted mix of trade count, profit and trade duration
#[derive(Debug, Default, Clone, Copy)]
pub struct ShortTradeDurationLoss;

impl LossFunction for ShortTradeDurationLoss {
    fn name(&self) -> &str {
        "short_trade_duration"
    }

    fn loss(&self, trades: &[TradeRecord], _min: DateTime<Utc>, _max: DateTime<Utc>) -> f64 {
        let trade_count = trades.len() as f64;
        let avg_duration = if trades.is_empty() {
            0.0
        } else {
            trades.iter().map(|t| t.duration_minutes).sum::<i64>() as f64 / trade_count
        };

        let trade_loss = 1.0 - 0.25 * (-(trade_count - TARGET_TRADES).powi(2) / 10f64.powf(5.8)).exp();
        let profit_loss = (1.0 - total_profit(trades) / EXPECTED_MAX_PROFIT).max(0.0);
        let duration_loss = 0.4 * (avg_duration / MAX_ACCEPTED_TRADE_DURATION).min(1.0);
        trade_loss + profit_loss + duration_loss
    }
}

pub fn loss_by_name(name: &str) -> Result<Box<dyn LossFunction>> {
    match name {
        "only_profit" => Ok(Box::new(OnlyProfitLoss)),
        "sharpe" => Ok(Box::new(SharpeLoss)),
        "short_trade_duration" => Ok(Box::new(ShortTradeDurationLoss)),
        other => Err(EngineError::Configuration(format!(
            "unknown loss function '{}'",
            other
        ))),
    }
}
