use std::collections::HashMap;

use crate::error::Result;
use crate::models::{resample_daily, Candle, MarketCatalog, OrderBookSnapshot, Ticker};

/// Market-data collaborator
///
/// Implementations own all exchange I/O. The engine only ever sees the
/// immutable snapshots they return.
pub trait MarketFeed: Send + Sync {
    /// All markets with their active flag and tick size
    fn markets(&self) -> Result<MarketCatalog>;

    fn ticker(&self, pair: &str) -> Result<Ticker>;

    /// Top `depth` levels of each side
    fn order_book(&self, pair: &str, depth: usize) -> Result<OrderBookSnapshot>;

    /// Most recent `limit` candles, oldest first
    fn candles(&self, pair: &str, limit: usize) -> Result<Vec<Candle>>;

    /// Last `days` daily candles, oldest first, built from the full history
    fn daily_candles(&self, pair: &str, days: usize) -> Result<Vec<Candle>> {
        let daily = resample_daily(&self.candles(pair, usize::MAX)?);
        let start = daily.len().saturating_sub(days);
        Ok(daily[start..].to_vec())
    }

    /// Tickers for `pairs`; pairs that fail are logged and left out
    fn tickers(&self, pairs: &[String]) -> HashMap<String, Ticker> {
        pairs
            .iter()
            .filter_map(|pair| match self.ticker(pair) {
                Ok(ticker) => Some((pair.clone(), ticker)),
                Err(e) => {
                    tracing::warn!(pair = %pair, error = %e, "Ticker unavailable");
                    None
                }
            })
            .collect()
    }

    /// Order books for `pairs`; pairs that fail are logged and left out
    fn order_books(&self, pairs: &[String], depth: usize) -> HashMap<String, OrderBookSnapshot> {
        pairs
            .iter()
            .filter_map(|pair| match self.order_book(pair, depth) {
                Ok(book) => Some((pair.clone(), book)),
                Err(e) => {
                    tracing::warn!(pair = %pair, error = %e, "Order book unavailable");
                    None
                }
            })
            .collect()
    }

    /// Daily candles for `pairs`; pairs that fail are logged and left out
    fn daily_candles_for(&self, pairs: &[String], days: usize) -> HashMap<String, Vec<Candle>> {
        pairs
            .iter()
            .filter_map(|pair| match self.daily_candles(pair, days) {
                Ok(candles) => Some((pair.clone(), candles)),
                Err(e) => {
                    tracing::warn!(pair = %pair, error = %e, "Daily candles unavailable");
                    None
                }
            })
            .collect()
    }
}
