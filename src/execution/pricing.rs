//! Order price selection from tickers and order books.

use crate::config::{EngineConfig, EntryPricingConfig, ExitPricingConfig};
use crate::error::{EngineError, Result};
use crate::models::{BookSide, OrderBookSnapshot, OrderSide, Ticker};

fn usable(pair: &str, price: f64, what: &str) -> Result<f64> {
    if price.is_finite() && price > 0.0 {
        Ok(price)
    } else {
        Err(EngineError::data_unavailable(
            pair,
            format!("{} price {} is unusable", what, price),
        ))
    }
}

fn require_book<'a>(pair: &str, book: Option<&'a OrderBookSnapshot>) -> Result<&'a OrderBookSnapshot> {
    book.ok_or_else(|| EngineError::data_unavailable(pair, "order book required but not supplied"))
}

/// Move `side_price` towards `last` by `balance` (0 = side price, 1 = last)
pub fn interpolate_with_last(side_price: f64, last: f64, balance: f64) -> f64 {
    side_price + balance * (last - side_price)
}

/// Price for a new entry order
pub fn select_entry_price(
    config: &EntryPricingConfig,
    ticker: &Ticker,
    book: Option<&OrderBookSnapshot>,
) -> Result<f64> {
    let pair = ticker.pair.as_str();

    if config.use_order_book {
        let book = require_book(pair, book)?;
        let price = book
            .price_at(config.price_side, config.order_book_top)
            .ok_or_else(|| {
                EngineError::data_unavailable(
                    pair,
                    format!("order book has no level {}", config.order_book_top),
                )
            })?;
        tracing::debug!(pair = %pair, level = config.order_book_top, price = price, "Entry price from order book");
        return usable(pair, price, "order book");
    }

    let side_price = usable(pair, ticker.side_price(config.price_side), "ticker")?;
    match ticker.last {
        // Buying above the last trade is the unfavourable case
        Some(last) if side_price > last => Ok(interpolate_with_last(
            side_price,
            last,
            config.price_last_balance,
        )),
        _ => Ok(side_price),
    }
}

/// Price for a new exit order
///
/// With the order book enabled, levels `order_book_min..=order_book_max` are
/// scanned best-first and the first price accepted by `qualifies` wins; if
/// none does, level `order_book_min` is used.
pub fn select_exit_price(
    config: &ExitPricingConfig,
    pair: &str,
    ticker: Option<&Ticker>,
    book: Option<&OrderBookSnapshot>,
    qualifies: impl Fn(f64) -> bool,
) -> Result<f64> {
    if config.use_order_book {
        let book = require_book(pair, book)?;
        let level = |depth: usize| {
            book.price_at(config.price_side, depth).ok_or_else(|| {
                EngineError::data_unavailable(pair, format!("order book has no level {}", depth))
            })
        };

        for depth in config.order_book_min..=config.order_book_max {
            let price = level(depth)?;
            if qualifies(price) {
                tracing::debug!(pair = %pair, level = depth, price = price, "Exit price from order book");
                return usable(pair, price, "order book");
            }
        }
        let fallback = level(config.order_book_min)?;
        tracing::debug!(pair = %pair, price = fallback, "No order book level qualified, using minimum level");
        return usable(pair, fallback, "order book");
    }

    let ticker = ticker.ok_or_else(|| EngineError::data_unavailable(pair, "ticker missing"))?;
    ticker_exit_rate(config, ticker)
}

/// Ticker-only exit rate, also used as the "current rate" for exit evaluation
pub fn ticker_exit_rate(config: &ExitPricingConfig, ticker: &Ticker) -> Result<f64> {
    let side_price = usable(&ticker.pair, ticker.side_price(config.price_side), "ticker")?;
    match ticker.last {
        // Selling below the last trade is the unfavourable case
        Some(last) if side_price < last => Ok(interpolate_with_last(
            side_price,
            last,
            config.price_last_balance,
        )),
        _ => Ok(side_price),
    }
}

/// Single entry point for quoting either side
///
/// `qualifies` only affects order-book exits.
pub fn select_order_price(
    side: OrderSide,
    config: &EngineConfig,
    pair: &str,
    ticker: Option<&Ticker>,
    book: Option<&OrderBookSnapshot>,
    qualifies: impl Fn(f64) -> bool,
) -> Result<f64> {
    match side {
        OrderSide::Entry => {
            let ticker =
                ticker.ok_or_else(|| EngineError::data_unavailable(pair, "ticker missing"))?;
            select_entry_price(&config.entry, ticker, book)
        }
        OrderSide::Exit => select_exit_price(&config.exit, pair, ticker, book, qualifies),
    }
}

/// Are there enough resting bids relative to asks to enter?
pub fn check_depth_of_market(book: &OrderBookSnapshot, bids_to_ask_delta: f64) -> Result<bool> {
    let asks = book.total_quantity(BookSide::Ask);
    if asks <= 0.0 {
        return Err(EngineError::data_unavailable(&book.pair, "order book ask side empty"));
    }
    let bids = book.total_quantity(BookSide::Bid);
    let ratio = bids / asks;
    tracing::debug!(pair = %book.pair, bids_ask_ratio = ratio, required = bids_to_ask_delta, "Depth of market");
    Ok(ratio >= bids_to_ask_delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BookLevel;
    use chrono::Utc;

    fn ticker(bid: f64, ask: f64, last: Option<f64>) -> Ticker {
        Ticker {
            pair: "ETH/USDT".to_string(),
            bid,
            ask,
            last,
            quote_volume: None,
            bid_volume: None,
            ask_volume: None,
            timestamp: Utc::now(),
        }
    }

    fn book() -> OrderBookSnapshot {
        let level = |price, quantity| BookLevel { price, quantity };
        OrderBookSnapshot {
            pair: "ETH/USDT".to_string(),
            bids: vec![level(99.0, 1.0), level(98.0, 2.0), level(97.0, 3.0)],
            asks: vec![level(100.0, 1.0), level(101.0, 1.0), level(102.0, 1.0)],
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_entry_balance_extremes() {
        let t = ticker(99.0, 101.0, Some(100.0));
        let mut config = EntryPricingConfig::default();

        config.price_last_balance = 0.0;
        assert_eq!(select_entry_price(&config, &t, None).unwrap(), 101.0);

        config.price_last_balance = 1.0;
        assert_eq!(select_entry_price(&config, &t, None).unwrap(), 100.0);

        config.price_last_balance = 0.5;
        assert_eq!(select_entry_price(&config, &t, None).unwrap(), 100.5);
    }

    #[test]
    fn test_entry_keeps_favourable_ask() {
        let t = ticker(99.0, 101.0, Some(102.0));
        let config = EntryPricingConfig {
            price_last_balance: 1.0,
            ..EntryPricingConfig::default()
        };
        assert_eq!(select_entry_price(&config, &t, None).unwrap(), 101.0);

        // No last trade: side price as is
        let t = ticker(99.0, 101.0, None);
        assert_eq!(select_entry_price(&config, &t, None).unwrap(), 101.0);
    }

    #[test]
    fn test_exit_balance_extremes() {
        let t = ticker(99.0, 101.0, Some(100.0));
        let mut config = ExitPricingConfig::default();

        assert_eq!(ticker_exit_rate(&config, &t).unwrap(), 99.0);
        config.price_last_balance = 1.0;
        assert_eq!(ticker_exit_rate(&config, &t).unwrap(), 100.0);
    }

    #[test]
    fn test_entry_from_order_book_level() {
        let config = EntryPricingConfig {
            use_order_book: true,
            order_book_top: 2,
            ..EntryPricingConfig::default()
        };
        let t = ticker(99.0, 101.0, Some(100.0));
        assert_eq!(select_entry_price(&config, &t, Some(&book())).unwrap(), 101.0);

        let missing = select_entry_price(&config, &t, None);
        assert!(matches!(missing, Err(EngineError::DataUnavailable { .. })));
    }

    #[test]
    fn test_exit_scan_picks_first_qualifying_level() {
        let config = ExitPricingConfig {
            use_order_book: true,
            price_side: BookSide::Ask,
            order_book_min: 1,
            order_book_max: 3,
            ..ExitPricingConfig::default()
        };
        let book = book();

        let price = select_exit_price(&config, "ETH/USDT", None, Some(&book), |p| p >= 101.0).unwrap();
        assert_eq!(price, 101.0);

        // Nothing qualifies: fall back to the minimum level
        let price = select_exit_price(&config, "ETH/USDT", None, Some(&book), |_| false).unwrap();
        assert_eq!(price, 100.0);
    }

    #[test]
    fn test_exit_scan_degenerate_range() {
        let config = ExitPricingConfig {
            use_order_book: true,
            order_book_min: 2,
            order_book_max: 2,
            ..ExitPricingConfig::default()
        };
        let price = select_exit_price(&config, "ETH/USDT", None, Some(&book()), |_| false).unwrap();
        assert_eq!(price, 98.0);
    }

    #[test]
    fn test_exit_scan_missing_level() {
        let config = ExitPricingConfig {
            use_order_book: true,
            order_book_min: 1,
            order_book_max: 5,
            ..ExitPricingConfig::default()
        };
        let result = select_exit_price(&config, "ETH/USDT", None, Some(&book()), |_| false);
        assert!(matches!(result, Err(EngineError::DataUnavailable { .. })));
    }

    #[test]
    fn test_select_order_price_dispatch() {
        let config = EngineConfig::default();
        let t = ticker(99.0, 101.0, Some(100.0));
        let entry = select_order_price(OrderSide::Entry, &config, "ETH/USDT", Some(&t), None, |_| true);
        let exit = select_order_price(OrderSide::Exit, &config, "ETH/USDT", Some(&t), None, |_| true);
        assert_eq!(entry.unwrap(), 101.0);
        assert_eq!(exit.unwrap(), 99.0);
    }

    #[test]
    fn test_depth_of_market() {
        let book = book();
        // 6 bid units vs 3 ask units
        assert!(check_depth_of_market(&book, 2.0).unwrap());
        assert!(!check_depth_of_market(&book, 2.5).unwrap());

        let mut empty = book.clone();
        empty.asks.clear();
        assert!(check_depth_of_market(&empty, 1.0).is_err());
    }
}
