use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::{EngineError, Result};
use crate::execution::MarketFeed;
use crate::models::{BookLevel, Candle, Market, MarketCatalog, OrderBookSnapshot, Ticker};

/// Market scenario types for synthetic data generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketScenario {
    /// Steady uptrend with noise (+2% daily average)
    Uptrend,
    /// Steady downtrend with noise (-2% daily average)
    Downtrend,
    /// Sideways/choppy market (±1% around mean)
    Sideways,
    /// High volatility (±5% large swings)
    Volatile,
    /// Contains time gaps (missing candles)
    WithGaps,
    /// Slow climb followed by a 25% slide, exercises stoplosses
    Drawdown,
}

impl MarketScenario {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "uptrend" => Ok(Self::Uptrend),
            "downtrend" => Ok(Self::Downtrend),
            "sideways" => Ok(Self::Sideways),
            "volatile" => Ok(Self::Volatile),
            "with_gaps" => Ok(Self::WithGaps),
            "drawdown" => Ok(Self::Drawdown),
            other => Err(EngineError::Configuration(format!(
                "unknown market scenario '{}'",
                other
            ))),
        }
    }
}

/// Generates synthetic price data for backtesting
pub struct SyntheticDataGenerator {
    rng: StdRng,
    pair: String,
    base_price: f64,
    base_volume: f64,
}

impl SyntheticDataGenerator {
    /// Create a new generator with a seed for reproducibility
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            pair: "SYNTH/USDT".to_string(),
            base_price: 150.0,
            base_volume: 1_000_000.0,
        }
    }

    pub fn with_pair(mut self, pair: impl Into<String>) -> Self {
        self.pair = pair.into();
        self
    }

    pub fn with_base_price(mut self, base_price: f64) -> Self {
        self.base_price = base_price;
        self
    }

    pub fn base_price(&self) -> f64 {
        self.base_price
    }

    /// Generate candles ending now
    ///
    /// `interval_minutes` is the spacing between candles (5 is typical).
    pub fn generate(
        &mut self,
        scenario: MarketScenario,
        num_candles: usize,
        interval_minutes: i64,
    ) -> Vec<Candle> {
        let start_time = Utc::now() - Duration::minutes(num_candles as i64 * interval_minutes);
        self.generate_from(start_time, scenario, num_candles, interval_minutes)
    }

    /// Generate candles starting at `start_time`
    pub fn generate_from(
        &mut self,
        start_time: DateTime<Utc>,
        scenario: MarketScenario,
        num_candles: usize,
        interval_minutes: i64,
    ) -> Vec<Candle> {
        let mut candles = Vec::with_capacity(num_candles);
        let mut current_price = self.base_price;
        let mut slot: i64 = 0;

        for i in 0..num_candles {
            // Every 50th candle is missing, leaving a double-interval hole
            if scenario == MarketScenario::WithGaps && i % 50 == 49 {
                slot += 2;
                continue;
            }

            let timestamp = start_time + Duration::minutes(slot * interval_minutes);
            current_price = self.step(
                scenario,
                current_price,
                self.base_price,
                i,
                num_candles,
                interval_minutes,
            );
            let pair = self.pair.clone();
            candles.push(self.create_candle(&pair, current_price, timestamp));
            slot += 1;
        }

        candles
    }

    /// Next close after `price` for candle `i` of `total`
    ///
    /// `anchor` is the price sideways markets revert to and volatile ones
    /// never fall below half of.
    pub fn step(
        &mut self,
        scenario: MarketScenario,
        price: f64,
        anchor: f64,
        i: usize,
        total: usize,
        interval_minutes: i64,
    ) -> f64 {
        // 2% per day spread over the candles of one day
        let daily_drift = 0.02 / (24.0 * 60.0 / interval_minutes.max(1) as f64);

        match scenario {
            MarketScenario::Uptrend => {
                price + price * daily_drift + price * self.rng.gen_range(-0.001..0.001)
            }
            MarketScenario::Downtrend => {
                price - price * daily_drift + price * self.rng.gen_range(-0.001..0.001)
            }
            MarketScenario::Sideways => {
                let reversion = (anchor - price) * 0.1;
                price + reversion + price * self.rng.gen_range(-0.01..0.01)
            }
            MarketScenario::Volatile => {
                let next = price + price * self.rng.gen_range(-0.05..0.05);
                next.max(anchor * 0.5)
            }
            MarketScenario::WithGaps => price + price * self.rng.gen_range(-0.01..0.01),
            MarketScenario::Drawdown => {
                if i < total / 2 {
                    price + price * self.rng.gen_range(-0.005..0.01)
                } else {
                    let drop_rate = -0.25 / (total as f64 / 2.0);
                    price + price * drop_rate + price * self.rng.gen_range(-0.005..0.005)
                }
            }
        }
    }

    /// Candle closing at `price` with a little intrabar movement
    pub fn create_candle(&mut self, pair: &str, price: f64, timestamp: DateTime<Utc>) -> Candle {
        let noise_pct = 0.002;

        let high = price * (1.0 + self.rng.gen_range(0.0..noise_pct));
        let low = price * (1.0 - self.rng.gen_range(0.0..noise_pct));
        let open = (price * (1.0 + self.rng.gen_range(-noise_pct..noise_pct))).clamp(low, high);

        // ±30% volume
        let volume = self.base_volume * self.rng.gen_range(0.7..1.3);

        Candle {
            pair: pair.to_string(),
            timestamp,
            open,
            high,
            low,
            close: price,
            volume,
        }
    }
}

struct SimulatedMarket {
    market: Market,
    scenario: MarketScenario,
    anchor: f64,
    price: f64,
    /// Relative bid/ask spread
    spread: f64,
    quote_volume: f64,
    history: Vec<Candle>,
}

struct FeedState {
    generator: SyntheticDataGenerator,
    markets: BTreeMap<String, SimulatedMarket>,
    now: DateTime<Utc>,
    interval_minutes: i64,
}

/// Seeded in-memory exchange used by the dry-run driver
///
/// Prices only move when [`SyntheticFeed::advance`] is called, so every
/// snapshot taken between two advances is consistent.
pub struct SyntheticFeed {
    state: Mutex<FeedState>,
}

impl SyntheticFeed {
    pub fn new(seed: u64, interval_minutes: i64) -> Self {
        Self {
            state: Mutex::new(FeedState {
                generator: SyntheticDataGenerator::new(seed),
                markets: BTreeMap::new(),
                now: Utc::now(),
                interval_minutes,
            }),
        }
    }

    /// Feed with a small mixed universe: liquid and illiquid USDT pairs,
    /// a cheap coin with a coarse tick, a BTC-quoted pair and a delisted one
    pub fn with_default_markets(seed: u64, interval_minutes: i64) -> Self {
        let feed = Self::new(seed, interval_minutes);
        let universe = [
            (Market::new("BTC", "USDT", 0.01), MarketScenario::Sideways, 60_000.0, 0.0002, 9.0e8),
            (Market::new("ETH", "USDT", 0.01), MarketScenario::Uptrend, 3_000.0, 0.0003, 4.0e8),
            (Market::new("SOL", "USDT", 0.001), MarketScenario::Volatile, 150.0, 0.0005, 1.5e8),
            (Market::new("XRP", "USDT", 0.0001), MarketScenario::Drawdown, 0.6, 0.001, 8.0e7),
            (Market::new("DOGE", "USDT", 0.001), MarketScenario::Sideways, 0.12, 0.002, 5.0e7),
            (Market::new("LOWCAP", "USDT", 0.01), MarketScenario::Volatile, 0.05, 0.02, 1.0e5),
            (Market::new("ETH", "BTC", 0.00001), MarketScenario::Sideways, 0.05, 0.0005, 2.0e3),
        ];
        for (market, scenario, price, spread, quote_volume) in universe {
            feed.add_market(market, scenario, price, spread, quote_volume);
        }

        let mut delisted = Market::new("OLD", "USDT", 0.001);
        delisted.active = false;
        feed.add_market(delisted, MarketScenario::Downtrend, 1.0, 0.001, 1.0e6);
        feed
    }

    pub fn add_market(
        &self,
        market: Market,
        scenario: MarketScenario,
        price: f64,
        spread: f64,
        quote_volume: f64,
    ) {
        let Ok(mut state) = self.state.lock() else {
            tracing::error!(pair = %market.pair, "Synthetic feed state poisoned, market not added");
            return;
        };
        let now = state.now;
        let candle = state.generator.create_candle(&market.pair, price, now);
        state.markets.insert(
            market.pair.clone(),
            SimulatedMarket {
                market,
                scenario,
                anchor: price,
                price,
                spread,
                quote_volume,
                history: vec![candle],
            },
        );
    }

    /// Move every market forward by one interval
    pub fn advance(&self) -> Result<DateTime<Utc>> {
        let mut state = self.lock("*")?;
        let FeedState {
            generator,
            markets,
            now,
            interval_minutes,
        } = &mut *state;

        *now += Duration::minutes(*interval_minutes);
        for simulated in markets.values_mut() {
            let i = simulated.history.len();
            // Scenario shape repeats every 500 candles
            let next = generator.step(
                simulated.scenario,
                simulated.price,
                simulated.anchor,
                i % 500,
                500,
                *interval_minutes,
            );
            simulated.price = next.max(simulated.market.tick_size);
            simulated.quote_volume *= generator.rng.gen_range(0.9..1.1);
            let candle = generator.create_candle(&simulated.market.pair, simulated.price, *now);
            simulated.history.push(candle);
        }
        Ok(*now)
    }

    /// Simulated exchange time
    pub fn now(&self) -> Result<DateTime<Utc>> {
        Ok(self.lock("*")?.now)
    }

    fn lock(&self, pair: &str) -> Result<std::sync::MutexGuard<'_, FeedState>> {
        self.state
            .lock()
            .map_err(|_| EngineError::data_unavailable(pair, "synthetic feed state poisoned"))
    }
}

fn unknown(pair: &str) -> EngineError {
    EngineError::data_unavailable(pair, "unknown market")
}

impl MarketFeed for SyntheticFeed {
    fn markets(&self) -> Result<MarketCatalog> {
        let state = self.lock("*")?;
        Ok(state
            .markets
            .iter()
            .map(|(pair, simulated)| (pair.clone(), simulated.market.clone()))
            .collect())
    }

    fn ticker(&self, pair: &str) -> Result<Ticker> {
        let state = self.lock(pair)?;
        let simulated = state.markets.get(pair).ok_or_else(|| unknown(pair))?;
        let market = &simulated.market;
        let half_spread = simulated.price * simulated.spread / 2.0;

        Ok(Ticker {
            pair: pair.to_string(),
            bid: market.price_to_precision(simulated.price - half_spread),
            ask: market.price_to_precision(simulated.price + half_spread),
            last: Some(market.price_to_precision(simulated.price)),
            quote_volume: Some(simulated.quote_volume),
            bid_volume: Some(simulated.quote_volume * 0.48),
            ask_volume: Some(simulated.quote_volume * 0.52),
            timestamp: state.now,
        })
    }

    fn order_book(&self, pair: &str, depth: usize) -> Result<OrderBookSnapshot> {
        let ticker = self.ticker(pair)?;
        let state = self.lock(pair)?;
        let simulated = state.markets.get(pair).ok_or_else(|| unknown(pair))?;
        let tick = simulated.market.tick_size.max(f64::EPSILON);
        let base_quantity = simulated.quote_volume / simulated.price / 10_000.0;

        let level = |price: f64, n: usize| BookLevel {
            price,
            quantity: base_quantity * (1.0 + n as f64 * 0.5),
        };
        let bids = (0..depth)
            .map(|n| level(ticker.bid - tick * n as f64, n))
            .filter(|l| l.price > 0.0)
            .collect();
        let asks = (0..depth).map(|n| level(ticker.ask + tick * n as f64, n)).collect();

        Ok(OrderBookSnapshot {
            pair: pair.to_string(),
            bids,
            asks,
            timestamp: state.now,
        })
    }

    fn candles(&self, pair: &str, limit: usize) -> Result<Vec<Candle>> {
        let state = self.lock(pair)?;
        let simulated = state.markets.get(pair).ok_or_else(|| unknown(pair))?;
        let start = simulated.history.len().saturating_sub(limit);
        Ok(simulated.history[start..].to_vec())
    }
}
