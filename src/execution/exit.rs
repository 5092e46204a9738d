use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::position::Position;
use crate::clock;
use crate::config::{EngineConfig, ExitPricingConfig};
use crate::error::{EngineError, Result};
use crate::models::{Candle, Signals};
use crate::risk::{RoiDecision, RoiTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TrailingStopLoss,
    Roi,
    SellSignal,
    /// Closed by the driver, e.g. at the end of a backtest
    ForceExit,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TrailingStopLoss => "trailing_stop_loss",
            ExitReason::Roi => "roi",
            ExitReason::SellSignal => "sell_signal",
            ExitReason::ForceExit => "force_exit",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldReason {
    /// `ignore_roi_if_buy_signal` with a live entry signal
    EntrySignalActive,
    /// Exit signal suppressed by `sell_profit_only`
    NotProfitable,
    NoExitCondition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitDecision {
    Hold(HoldReason),
    Exit(ExitReason),
}

impl ExitDecision {
    pub fn is_exit(&self) -> bool {
        matches!(self, ExitDecision::Exit(_))
    }

    pub fn exit_reason(&self) -> Option<ExitReason> {
        match self {
            ExitDecision::Exit(reason) => Some(*reason),
            ExitDecision::Hold(_) => None,
        }
    }
}

/// Combines stoploss, ROI and strategy signals into one exit decision
///
/// Precedence, highest first:
/// 1. stop triggered
/// 2. `ignore_roi_if_buy_signal` with an active entry signal holds
/// 3. ROI
/// 4. exit signal, subject to `use_sell_signal` and `sell_profit_only`
#[derive(Debug, Clone)]
pub struct ExitOrchestrator {
    minimal_roi: RoiTable,
    rules: ExitPricingConfig,
}

impl ExitOrchestrator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            minimal_roi: config.minimal_roi.clone(),
            rules: config.exit,
        }
    }

    pub fn minimal_roi(&self) -> &RoiTable {
        &self.minimal_roi
    }

    /// Decide whether `position` exits at `rate`
    ///
    /// Always feeds the tick into the stop state first, so the trailing stop
    /// keeps ratcheting even on rounds that end in a hold.
    pub fn evaluate_exit(
        &self,
        position: &mut Position,
        rate: f64,
        now: DateTime<Utc>,
        signals: Signals,
    ) -> Result<ExitDecision> {
        if !position.is_open() {
            return Err(EngineError::invariant(
                &position.pair,
                "exit evaluated on a closed position",
            ));
        }

        let profit = position.profit_ratio(rate);
        let update = position.stoploss.apply_tick(&position.pair, rate, profit)?;
        position.update_rate_extremes(rate);

        if update.triggered {
            let reason = if update.trailing_activated {
                ExitReason::TrailingStopLoss
            } else {
                ExitReason::StopLoss
            };
            tracing::info!(
                pair = %position.pair,
                rate = rate,
                stop = update.stop_price,
                profit = profit,
                "Stoploss hit"
            );
            return Ok(ExitDecision::Exit(reason));
        }

        if self.rules.ignore_roi_if_buy_signal && signals.entry {
            tracing::debug!(pair = %position.pair, "Entry signal active, ignoring ROI and exit signal");
            return Ok(ExitDecision::Hold(HoldReason::EntrySignalActive));
        }

        let elapsed = clock::elapsed_minutes(position.entry_time, now);
        if self.minimal_roi.evaluate(elapsed, profit) == RoiDecision::Exit {
            tracing::info!(
                pair = %position.pair,
                elapsed_minutes = elapsed,
                profit = profit,
                "ROI reached"
            );
            return Ok(ExitDecision::Exit(ExitReason::Roi));
        }

        if self.rules.use_sell_signal && signals.exit {
            if self.rules.sell_profit_only && profit <= 0.0 {
                tracing::debug!(
                    pair = %position.pair,
                    profit = profit,
                    "Exit signal ignored, position not in profit"
                );
                return Ok(ExitDecision::Hold(HoldReason::NotProfitable));
            }
            tracing::info!(pair = %position.pair, profit = profit, "Exit signal");
            return Ok(ExitDecision::Exit(ExitReason::SellSignal));
        }

        Ok(ExitDecision::Hold(HoldReason::NoExitCondition))
    }

    /// Stop check over a whole candle, for replays that only see OHLC
    ///
    /// The high is fed into the stop first, then the low is tested against
    /// it. A hit fills at the stop price, or at the open when the candle
    /// gapped through the stop.
    pub fn check_candle_stop(
        &self,
        position: &mut Position,
        candle: &Candle,
    ) -> Result<Option<(ExitReason, f64)>> {
        if !position.is_open() {
            return Err(EngineError::invariant(
                &position.pair,
                "stop checked on a closed position",
            ));
        }

        let profit = position.profit_ratio(candle.high);
        let update = position
            .stoploss
            .apply_tick(&position.pair, candle.high, profit)?;
        position.update_rate_extremes(candle.high);
        position.update_rate_extremes(candle.low);

        if candle.low > update.stop_price {
            return Ok(None);
        }

        let reason = if update.trailing_activated {
            ExitReason::TrailingStopLoss
        } else {
            ExitReason::StopLoss
        };
        let fill = if candle.open <= update.stop_price {
            candle.open
        } else {
            update.stop_price
        };
        let fill = fill.min(candle.high).max(candle.low);
        tracing::info!(
            pair = %position.pair,
            low = candle.low,
            stop = update.stop_price,
            fill = fill,
            "Stoploss hit inside candle"
        );
        Ok(Some((reason, fill)))
    }

    /// Would exiting at `rate` satisfy the ROI table right now?
    ///
    /// Used to rank order-book levels when pricing an exit.
    pub fn roi_satisfied(&self, position: &Position, rate: f64, now: DateTime<Utc>) -> bool {
        let elapsed = clock::elapsed_minutes(position.entry_time, now);
        self.minimal_roi.evaluate(elapsed, position.profit_ratio(rate)) == RoiDecision::Exit
    }
}
