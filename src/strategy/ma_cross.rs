use super::Strategy;
use crate::error::{EngineError, Result};
use crate::models::{Candle, Signals};
use crate::risk::RoiTable;

/// Simple moving average of the `period` values ending at `end` (exclusive)
fn sma(prices: &[f64], end: usize, period: usize) -> Option<f64> {
    if period == 0 || end < period || end > prices.len() {
        return None;
    }
    let sum: f64 = prices[end - period..end].iter().sum();
    Some(sum / period as f64)
}

/// Moving-average crossover
///
/// Enters when the fast SMA crosses above the slow SMA on the latest candle
/// and exits on the opposite cross.
#[derive(Debug, Clone)]
pub struct MaCrossStrategy {
    fast_period: usize,
    slow_period: usize,
    minimal_roi: Option<RoiTable>,
    stoploss: Option<f64>,
}

impl MaCrossStrategy {
    pub fn new(fast_period: usize, slow_period: usize) -> Self {
        Self {
            fast_period,
            slow_period,
            minimal_roi: None,
            stoploss: None,
        }
    }

    pub fn with_minimal_roi(mut self, table: RoiTable) -> Self {
        self.minimal_roi = Some(table);
        self
    }

    pub fn with_stoploss(mut self, ratio: f64) -> Self {
        self.stoploss = Some(ratio);
        self
    }
}

impl Default for MaCrossStrategy {
    fn default() -> Self {
        Self::new(5, 20)
    }
}

impl Strategy for MaCrossStrategy {
    fn populate_signals(&self, pair: &str, candles: &[Candle]) -> Result<Signals> {
        if candles.len() < self.min_candles_required() {
            return Err(EngineError::data_unavailable(
                pair,
                format!(
                    "insufficient data: {} candles, need {}",
                    candles.len(),
                    self.min_candles_required()
                ),
            ));
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let n = closes.len();
        let averages = (
            sma(&closes, n - 1, self.fast_period),
            sma(&closes, n - 1, self.slow_period),
            sma(&closes, n, self.fast_period),
            sma(&closes, n, self.slow_period),
        );
        let (Some(prev_fast), Some(prev_slow), Some(fast), Some(slow)) = averages else {
            return Ok(Signals::default());
        };

        Ok(Signals {
            entry: prev_fast <= prev_slow && fast > slow,
            exit: prev_fast >= prev_slow && fast < slow,
        })
    }

    fn name(&self) -> &str {
        "MaCross"
    }

    fn min_candles_required(&self) -> usize {
        self.slow_period.max(self.fast_period) + 1
    }

    fn minimal_roi(&self) -> Option<RoiTable> {
        self.minimal_roi.clone()
    }

    fn stoploss(&self) -> Option<f64> {
        self.stoploss
    }
}
