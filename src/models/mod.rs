use chrono::{DateTime, NaiveTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Side of the order book a price is read from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookSide {
    Bid,
    Ask,
}

/// One price level of an order book
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BookLevel {
    pub price: f64,
    pub quantity: f64,
}

/// Immutable order book snapshot handed in by the caller for one round
///
/// Bids are best-first (descending), asks are best-first (ascending).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub pair: String,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    pub timestamp: DateTime<Utc>,
}

impl OrderBookSnapshot {
    pub fn levels(&self, side: BookSide) -> &[BookLevel] {
        match side {
            BookSide::Bid => &self.bids,
            BookSide::Ask => &self.asks,
        }
    }

    /// Price at 1-indexed `depth` on `side` (1 = best)
    pub fn price_at(&self, side: BookSide, depth: usize) -> Option<f64> {
        if depth == 0 {
            return None;
        }
        self.levels(side).get(depth - 1).map(|level| level.price)
    }

    /// Total quantity resting on `side`
    pub fn total_quantity(&self, side: BookSide) -> f64 {
        self.levels(side).iter().map(|level| level.quantity).sum()
    }
}

/// Ticker snapshot for one pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub pair: String,
    pub bid: f64,
    pub ask: f64,
    /// Last traded price; absent when the market had no trade recently
    pub last: Option<f64>,
    pub quote_volume: Option<f64>,
    pub bid_volume: Option<f64>,
    pub ask_volume: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Ticker {
    pub fn side_price(&self, side: BookSide) -> f64 {
        match side {
            BookSide::Bid => self.bid,
            BookSide::Ask => self.ask,
        }
    }
}

/// Exchange metadata for one market
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Market {
    pub pair: String,
    pub base: String,
    pub quote: String,
    pub active: bool,
    /// Minimum price increment
    pub tick_size: f64,
}

impl Market {
    pub fn new(base: &str, quote: &str, tick_size: f64) -> Self {
        Self {
            pair: format!("{}/{}", base, quote),
            base: base.to_string(),
            quote: quote.to_string(),
            active: true,
            tick_size,
        }
    }

    /// Round `price` to the nearest multiple of the market's tick size
    pub fn price_to_precision(&self, price: f64) -> f64 {
        let (Some(p), Some(tick)) = (Decimal::from_f64(price), Decimal::from_f64(self.tick_size))
        else {
            return price;
        };
        if tick.is_zero() {
            return price;
        }
        ((p / tick).round() * tick).to_f64().unwrap_or(price)
    }
}

/// All markets known to the exchange, keyed by pair
pub type MarketCatalog = BTreeMap<String, Market>;

/// Whether a pending order opens or closes a position
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Entry,
    Exit,
}

/// An order submitted to the exchange that has not filled yet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOrder {
    pub id: String,
    pub pair: String,
    pub side: OrderSide,
    pub price: f64,
    pub quantity: f64,
    pub submitted_at: DateTime<Utc>,
    /// Per-order lifetime in minutes; `None` uses the configured timeout for its side
    pub timeout_minutes: Option<u64>,
}

/// OHLCV candle, used by strategies and the backtest runner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub pair: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Merge candles (oldest first) into one candle per UTC day
///
/// Each daily candle is stamped with midnight of its day.
pub fn resample_daily(candles: &[Candle]) -> Vec<Candle> {
    let mut days: Vec<Candle> = Vec::new();
    for candle in candles {
        let day = candle.timestamp.date_naive();
        match days.last_mut() {
            Some(current) if current.timestamp.date_naive() == day => {
                current.high = current.high.max(candle.high);
                current.low = current.low.min(candle.low);
                current.close = candle.close;
                current.volume += candle.volume;
            }
            _ => days.push(Candle {
                timestamp: day.and_time(NaiveTime::MIN).and_utc(),
                ..candle.clone()
            }),
        }
    }
    days
}

/// Entry/exit flags produced by the strategy for one pair this round
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Signals {
    pub entry: bool,
    pub exit: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> OrderBookSnapshot {
        OrderBookSnapshot {
            pair: "ETH/USDT".to_string(),
            bids: vec![
                BookLevel { price: 99.0, quantity: 2.0 },
                BookLevel { price: 98.5, quantity: 3.0 },
            ],
            asks: vec![
                BookLevel { price: 100.0, quantity: 1.0 },
                BookLevel { price: 100.5, quantity: 4.0 },
            ],
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_price_at_is_one_indexed() {
        let book = book();
        assert_eq!(book.price_at(BookSide::Bid, 1), Some(99.0));
        assert_eq!(book.price_at(BookSide::Ask, 2), Some(100.5));
        assert_eq!(book.price_at(BookSide::Ask, 3), None);
        assert_eq!(book.price_at(BookSide::Bid, 0), None);
    }

    #[test]
    fn test_total_quantity() {
        let book = book();
        assert_eq!(book.total_quantity(BookSide::Bid), 5.0);
        assert_eq!(book.total_quantity(BookSide::Ask), 5.0);
    }

    #[test]
    fn test_price_to_precision() {
        let market = Market::new("XRP", "USDT", 0.001);
        assert_eq!(market.pair, "XRP/USDT");
        assert!((market.price_to_precision(0.51234) - 0.512).abs() < 1e-12);
        assert!((market.price_to_precision(0.5126) - 0.513).abs() < 1e-12);
    }

    #[test]
    fn test_resample_daily() {
        let start = DateTime::parse_from_rfc3339("2024-03-01T22:00:00Z").unwrap().with_timezone(&Utc);
        let candles: Vec<Candle> = [(10.0, 12.0, 9.0, 11.0), (11.0, 15.0, 10.0, 14.0), (14.0, 14.5, 8.0, 9.0)]
            .iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Candle {
                pair: "ETH/USDT".to_string(),
                timestamp: start + chrono::Duration::hours(i as i64),
                open,
                high,
                low,
                close,
                volume: 1.0,
            })
            .collect();

        let days = resample_daily(&candles);
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].high, 15.0);
        assert_eq!(days[0].close, 14.0);
        assert_eq!(days[0].volume, 2.0);
        assert_eq!(days[1].open, 14.0);
        assert_eq!(days[1].low, 8.0);
        assert_eq!(days[1].timestamp.to_rfc3339(), "2024-03-02T00:00:00+00:00");
        assert!(resample_daily(&[]).is_empty());
    }
}
