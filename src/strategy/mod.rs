// Strategy collaborator: entry/exit signals and optional risk overrides
pub mod buy_and_hold;
pub mod ma_cross;

use std::sync::Arc;

use crate::error::{EngineError, Result};
use crate::execution::TimeoutHook;
use crate::models::{Candle, Signals};
use crate::risk::RoiTable;

pub use buy_and_hold::BuyAndHoldStrategy;
pub use ma_cross::MaCrossStrategy;

/// Base trait for all trading strategies
pub trait Strategy: Send + Sync {
    /// Entry/exit flags for `pair` given its candles, oldest first
    fn populate_signals(&self, pair: &str, candles: &[Candle]) -> Result<Signals>;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum candles required for this strategy
    fn min_candles_required(&self) -> usize;

    /// ROI table replacing the configured one
    fn minimal_roi(&self) -> Option<RoiTable> {
        None
    }

    /// Stoploss ratio replacing the configured one
    fn stoploss(&self) -> Option<f64> {
        None
    }

    /// Custom unfilled-order timeout rule
    fn timeout_hook(&self) -> Option<Arc<dyn TimeoutHook>> {
        None
    }
}

/// Built-in strategies by name
pub fn strategy_by_name(name: &str) -> Result<Arc<dyn Strategy>> {
    match name {
        "ma_cross" => Ok(Arc::new(MaCrossStrategy::default())),
        "buy_and_hold" => Ok(Arc::new(BuyAndHoldStrategy::new())),
        other => Err(EngineError::Configuration(format!(
            "unknown strategy '{}'",
            other
        ))),
    }
}
