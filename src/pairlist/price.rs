use super::{require_tickers, PairlistContext};
use crate::config::PriceFilterConfig;
use crate::error::Result;

/// Drops pairs whose one-tick move is too large a share of the price, or
/// whose price falls outside the configured bounds
#[derive(Debug, Clone)]
pub struct PriceFilter {
    config: PriceFilterConfig,
}

impl PriceFilter {
    pub fn new(config: PriceFilterConfig) -> Self {
        Self { config }
    }

    fn validate_pair(&self, pair: &str, ctx: &PairlistContext<'_>) -> bool {
        let Some(last) = ctx.tickers.get(pair).and_then(|t| t.last) else {
            tracing::info!(pair = %pair, "Removed from whitelist: no last price");
            return false;
        };
        if !last.is_finite() || last <= 0.0 {
            return false;
        }

        if self.config.low_price_ratio > 0.0 {
            let Some(market) = ctx.markets.get(pair) else {
                return false;
            };
            let one_tick = market.tick_size / last;
            if one_tick > self.config.low_price_ratio {
                tracing::info!(
                    pair = %pair,
                    one_tick_ratio = one_tick,
                    "Removed from whitelist: one tick is too large a price move"
                );
                return false;
            }
        }

        if self.config.min_price.is_some_and(|min| last < min) {
            tracing::info!(pair = %pair, price = last, "Removed from whitelist: price below min_price");
            return false;
        }
        if self.config.max_price.is_some_and(|max| last > max) {
            tracing::info!(pair = %pair, price = last, "Removed from whitelist: price above max_price");
            return false;
        }
        true
    }

    pub fn filter(&self, pairs: &[String], ctx: &PairlistContext<'_>) -> Result<Vec<String>> {
        require_tickers("PriceFilter", pairs, ctx)?;
        Ok(pairs
            .iter()
            .filter(|pair| self.validate_pair(pair, ctx))
            .cloned()
            .collect())
    }
}
