use super::{require_tickers, PairlistContext};
use crate::error::Result;

/// Drops pairs whose bid/ask spread is wider than `max_spread_ratio`
#[derive(Debug, Clone)]
pub struct SpreadFilter {
    max_spread_ratio: f64,
}

impl SpreadFilter {
    pub fn new(max_spread_ratio: f64) -> Self {
        Self { max_spread_ratio }
    }

    pub fn filter(&self, pairs: &[String], ctx: &PairlistContext<'_>) -> Result<Vec<String>> {
        require_tickers("SpreadFilter", pairs, ctx)?;

        Ok(pairs
            .iter()
            .filter(|pair| {
                let Some(ticker) = ctx.tickers.get(*pair) else {
                    tracing::info!(pair = %pair, "Removed from whitelist: no ticker");
                    return false;
                };
                if !(ticker.ask > 0.0) {
                    return false;
                }
                let spread = 1.0 - ticker.bid / ticker.ask;
                if spread > self.max_spread_ratio {
                    tracing::info!(
                        pair = %pair,
                        spread = spread,
                        "Removed from whitelist: spread above {:.3}%",
                        self.max_spread_ratio * 100.0
                    );
                    return false;
                }
                true
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pairlist::test_support::{market, pairs, ticker, Fixture};

    #[test]
    fn test_wide_spread_dropped() {
        let fixture = Fixture::default()
            .with_market(market("ETH/USDT", 0.01), Some(ticker("ETH/USDT", 99.9, 100.0, 1.0)))
            .with_market(market("ILLQ/USDT", 0.01), Some(ticker("ILLQ/USDT", 9.0, 10.0, 1.0)));

        let stage = SpreadFilter::new(0.005);
        let result = stage
            .filter(&pairs(&["ILLQ/USDT", "ETH/USDT", "NOTICK/USDT"]), &fixture.ctx())
            .unwrap();
        assert_eq!(result, pairs(&["ETH/USDT"]));
    }
}
