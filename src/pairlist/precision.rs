use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use super::{require_tickers, PairlistContext};
use crate::error::Result;

/// Drops markets whose tick size is too coarse for the stoploss distance
///
/// A pair is removed when one tick exceeds a tenth of the distance between
/// the ask and the stop price.
#[derive(Debug, Clone)]
pub struct PrecisionFilter {
    stoploss: f64,
}

impl PrecisionFilter {
    pub fn new(stoploss: f64) -> Self {
        Self { stoploss }
    }

    fn precise_enough(&self, tick_size: f64, ask: f64) -> bool {
        let (Some(tick), Some(ask), Some(distance)) = (
            Decimal::from_f64(tick_size),
            Decimal::from_f64(ask),
            Decimal::from_f64(self.stoploss.abs()),
        ) else {
            return false;
        };
        tick <= ask * distance * Decimal::new(1, 1)
    }

    pub fn filter(&self, pairs: &[String], ctx: &PairlistContext<'_>) -> Result<Vec<String>> {
        require_tickers("PrecisionFilter", pairs, ctx)?;

        Ok(pairs
            .iter()
            .filter(|pair| {
                let (Some(market), Some(ticker)) = (ctx.markets.get(*pair), ctx.tickers.get(*pair))
                else {
                    tracing::debug!(pair = %pair, "No market data, removed by PrecisionFilter");
                    return false;
                };
                let keep = self.precise_enough(market.tick_size, ticker.ask);
                if !keep {
                    tracing::info!(
                        pair = %pair,
                        tick_size = market.tick_size,
                        "Removed from whitelist: stoploss cannot be expressed at this precision"
                    );
                }
                keep
            })
            .cloned()
            .collect())
    }
}
