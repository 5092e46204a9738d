use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::execution::{ExitReason, Position};

/// Record of a single closed trade for analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub pair: String,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: f64,
    /// Fee-adjusted
    pub profit_ratio: f64,
    /// Fee-adjusted, in stake currency
    pub profit_abs: f64,
    pub exit_reason: ExitReason,
    pub duration_minutes: i64,
}

impl TradeRecord {
    /// `None` while the position is still open
    pub fn from_position(position: &Position) -> Option<Self> {
        let (Some(exit_price), Some(exit_time), Some(exit_reason)) =
            (position.exit_price, position.exit_time, position.exit_reason)
        else {
            return None;
        };

        Some(Self {
            pair: position.pair.clone(),
            entry_time: position.entry_time,
            exit_time,
            entry_price: position.entry_price,
            exit_price,
            quantity: position.quantity,
            profit_ratio: position.profit_ratio(exit_price),
            profit_abs: position.profit_abs(exit_price),
            exit_reason,
            duration_minutes: (exit_time - position.entry_time).num_minutes(),
        })
    }
}

/// Aggregate backtest performance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestMetrics {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Percentage of trades with positive profit
    pub win_rate: f64,

    pub total_profit_abs: f64,
    pub total_profit_ratio: f64,
    pub avg_profit_ratio: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    /// Gross wins / gross losses
    pub profit_factor: f64,

    /// Deepest peak-to-trough fall of cumulative absolute profit
    pub max_drawdown: f64,

    pub avg_holding_minutes: f64,
    pub exit_reasons: BTreeMap<String, usize>,

    pub trades: Vec<TradeRecord>,
}

impl BacktestMetrics {
    pub fn from_trades(trades: Vec<TradeRecord>) -> Self {
        let total_trades = trades.len();
        let winners: Vec<&TradeRecord> = trades.iter().filter(|t| t.profit_abs > 0.0).collect();
        let winning_trades = winners.len();
        let losing_trades = total_trades - winning_trades;

        let win_rate = if total_trades > 0 {
            (winning_trades as f64 / total_trades as f64) * 100.0
        } else {
            0.0
        };

        let total_profit_abs: f64 = trades.iter().map(|t| t.profit_abs).sum();
        let total_profit_ratio: f64 = trades.iter().map(|t| t.profit_ratio).sum();
        let avg_profit_ratio = if total_trades > 0 {
            total_profit_ratio / total_trades as f64
        } else {
            0.0
        };

        let largest_win = winners.iter().map(|t| t.profit_abs).fold(0.0, f64::max);
        let largest_loss = trades
            .iter()
            .map(|t| t.profit_abs)
            .filter(|p| *p <= 0.0)
            .fold(0.0, f64::min);

        let gross_wins: f64 = winners.iter().map(|t| t.profit_abs).sum();
        let gross_losses: f64 = trades
            .iter()
            .filter(|t| t.profit_abs <= 0.0)
            .map(|t| t.profit_abs.abs())
            .sum();
        let profit_factor = if gross_losses > 0.0 {
            gross_wins / gross_losses
        } else if gross_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let avg_holding_minutes = if total_trades > 0 {
            trades.iter().map(|t| t.duration_minutes).sum::<i64>() as f64 / total_trades as f64
        } else {
            0.0
        };

        let mut exit_reasons = BTreeMap::new();
        for trade in &trades {
            *exit_reasons.entry(trade.exit_reason.to_string()).or_insert(0) += 1;
        }

        Self {
            total_trades,
            winning_trades,
            losing_trades,
            win_rate,
            total_profit_abs,
            total_profit_ratio,
            avg_profit_ratio,
            largest_win,
            largest_loss,
            profit_factor,
            max_drawdown: Self::calculate_drawdown(&trades),
            avg_holding_minutes,
            exit_reasons,
            trades,
        }
    }

    /// Closed positions only; open ones are ignored
    pub fn from_positions(positions: &[Position]) -> Self {
        let mut trades: Vec<TradeRecord> =
            positions.iter().filter_map(TradeRecord::from_position).collect();
        trades.sort_by_key(|t| t.exit_time);
        Self::from_trades(trades)
    }

    /// Trades must be in exit order
    fn calculate_drawdown(trades: &[TradeRecord]) -> f64 {
        let mut peak = 0.0_f64;
        let mut cumulative = 0.0;
        let mut max_dd = 0.0_f64;

        for trade in trades {
            cumulative += trade.profit_abs;
            peak = peak.max(cumulative);
            max_dd = max_dd.max(peak - cumulative);
        }
        max_dd
    }

    /// Print a formatted report to stdout
    pub fn print_report(&self) {
        println!("\n=== BACKTEST REPORT ===\n");
        println!("Trades:         {}", self.total_trades);
        println!(
            "Win / loss:     {} / {} ({:.1}% win rate)",
            self.winning_trades, self.losing_trades, self.win_rate
        );
        println!("Total profit:   {:.4} ({:.2}%)", self.total_profit_abs, self.total_profit_ratio * 100.0);
        println!("Avg profit:     {:.2}%", self.avg_profit_ratio * 100.0);
        println!("Largest win:    {:.4}", self.largest_win);
        println!("Largest loss:   {:.4}", self.largest_loss);
        println!("Profit factor:  {:.2}", self.profit_factor);
        println!("Max drawdown:   {:.4}", self.max_drawdown);
        println!("Avg holding:    {:.1} min", self.avg_holding_minutes);

        if !self.exit_reasons.is_empty() {
            println!("\nExit reasons:");
            for (reason, count) in &self.exit_reasons {
                println!("  {:<20} {}", reason, count);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn trade(profit_abs: f64, minutes: i64, reason: ExitReason) -> TradeRecord {
        let entry_time = Utc::now();
        TradeRecord {
            pair: "ETH/USDT".to_string(),
            entry_time,
            exit_time: entry_time + Duration::minutes(minutes),
            entry_price: 100.0,
            exit_price: 100.0 + profit_abs,
            quantity: 1.0,
            profit_ratio: profit_abs / 100.0,
            profit_abs,
            exit_reason: reason,
            duration_minutes: minutes,
        }
    }

    #[test]
    fn test_empty_metrics() {
        let metrics = BacktestMetrics::from_trades(vec![]);
        assert_eq!(metrics.total_trades, 0);
        assert_eq!(metrics.win_rate, 0.0);
        assert_eq!(metrics.profit_factor, 0.0);
        assert_eq!(metrics.max_drawdown, 0.0);
    }

    #[test]
    fn test_win_loss_statistics() {
        let metrics = BacktestMetrics::from_trades(vec![
            trade(10.0, 30, ExitReason::Roi),
            trade(-5.0, 60, ExitReason::StopLoss),
            trade(5.0, 90, ExitReason::Roi),
            trade(-5.0, 20, ExitReason::SellSignal),
        ]);

        assert_eq!(metrics.total_trades, 4);
        assert_eq!(metrics.winning_trades, 2);
        assert_eq!(metrics.losing_trades, 2);
        assert_eq!(metrics.win_rate, 50.0);
        assert!((metrics.total_profit_abs - 5.0).abs() < 1e-12);
        assert!((metrics.profit_factor - 1.5).abs() < 1e-12);
        assert_eq!(metrics.largest_win, 10.0);
        assert_eq!(metrics.largest_loss, -5.0);
        assert_eq!(metrics.avg_holding_minutes, 50.0);
        assert_eq!(metrics.exit_reasons["roi"], 2);
        assert_eq!(metrics.exit_reasons["stop_loss"], 1);
    }

    #[test]
    fn test_drawdown_from_cumulative_profit() {
        let metrics = BacktestMetrics::from_trades(vec![
            trade(10.0, 5, ExitReason::Roi),
            trade(-4.0, 5, ExitReason::StopLoss),
            trade(-3.0, 5, ExitReason::StopLoss),
            trade(8.0, 5, ExitReason::Roi),
            trade(-2.0, 5, ExitReason::StopLoss),
        ]);
        // Peak 10, trough 3
        assert!((metrics.max_drawdown - 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_all_winners_profit_factor() {
        let metrics = BacktestMetrics::from_trades(vec![trade(1.0, 5, ExitReason::Roi)]);
        assert!(metrics.profit_factor.is_infinite());
    }
}
