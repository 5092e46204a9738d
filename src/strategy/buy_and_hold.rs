use super::Strategy;
use crate::error::{EngineError, Result};
use crate::models::{Candle, Signals};

/// Buy-and-hold baseline
///
/// Always signals an entry and never an exit, so positions close only
/// through stoploss, ROI or the end of a backtest.
#[derive(Debug, Clone, Default)]
pub struct BuyAndHoldStrategy;

impl BuyAndHoldStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Strategy for BuyAndHoldStrategy {
    fn populate_signals(&self, pair: &str, candles: &[Candle]) -> Result<Signals> {
        if candles.is_empty() {
            return Err(EngineError::data_unavailable(pair, "no candles provided"));
        }
        Ok(Signals {
            entry: true,
            exit: false,
        })
    }

    fn name(&self) -> &str {
        "BuyAndHold"
    }

    fn min_candles_required(&self) -> usize {
        1
    }
}
