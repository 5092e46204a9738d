//! Tradable-universe pipeline.
//!
//! A leading stage sources pairs (static whitelist or volume ranking), then
//! each following stage narrows or reorders the list. Every stage caches its
//! own result; the manager applies blacklist, market-activity and
//! open-position rules on top.

pub mod age;
pub mod cache;
pub mod manager;
pub mod performance;
pub mod precision;
pub mod price;
pub mod range_stability;
pub mod shuffle;
pub mod spread;
pub mod static_list;
pub mod volume;

use std::collections::HashMap;

use crate::config::{EngineConfig, StageConfig};
use crate::error::{EngineError, Result};
use crate::models::{Candle, MarketCatalog, Ticker};

pub use age::AgeFilter;
pub use cache::CachedStage;
pub use manager::PairlistManager;
pub use performance::{PairPerformance, PerformanceFilter};
pub use precision::PrecisionFilter;
pub use price::PriceFilter;
pub use range_stability::RangeStabilityFilter;
pub use shuffle::ShuffleFilter;
pub use spread::SpreadFilter;
pub use static_list::StaticPairList;
pub use volume::VolumePairList;

/// Read-only inputs for one pairlist refresh
#[derive(Debug, Clone, Copy)]
pub struct PairlistContext<'a> {
    pub markets: &'a MarketCatalog,
    pub tickers: &'a HashMap<String, Ticker>,
    /// Pairs with an open position, in position order
    pub open_pairs: &'a [String],
    pub performance: &'a HashMap<String, PairPerformance>,
    /// Daily candles, oldest first; only fetched when a stage needs them
    pub daily_candles: &'a HashMap<String, Vec<Candle>>,
}

impl<'a> PairlistContext<'a> {
    pub(crate) fn is_active(&self, pair: &str) -> bool {
        self.markets.get(pair).is_some_and(|m| m.active)
    }
}

/// One pipeline stage
pub enum PairlistStage {
    Static(StaticPairList),
    Volume(VolumePairList),
    Precision(PrecisionFilter),
    Price(PriceFilter),
    Spread(SpreadFilter),
    Shuffle(ShuffleFilter),
    Performance(PerformanceFilter),
    Age(AgeFilter),
    RangeStability(RangeStabilityFilter),
}

impl PairlistStage {
    pub fn from_config(stage: &StageConfig, config: &EngineConfig) -> Self {
        match stage {
            StageConfig::StaticPairList(_) => {
                PairlistStage::Static(StaticPairList::new(config.pairlist.whitelist.clone()))
            }
            StageConfig::VolumePairList(c) => {
                PairlistStage::Volume(VolumePairList::new(c.clone(), &config.stake_currency))
            }
            StageConfig::PrecisionFilter(_) => {
                PairlistStage::Precision(PrecisionFilter::new(config.stoploss.stoploss))
            }
            StageConfig::PriceFilter(c) => PairlistStage::Price(PriceFilter::new(c.clone())),
            StageConfig::SpreadFilter(c) => {
                PairlistStage::Spread(SpreadFilter::new(c.max_spread_ratio))
            }
            StageConfig::ShuffleFilter(c) => PairlistStage::Shuffle(ShuffleFilter::new(c.seed)),
            StageConfig::PerformanceFilter(_) => PairlistStage::Performance(PerformanceFilter),
            StageConfig::AgeFilter(c) => PairlistStage::Age(AgeFilter::new(c.min_days_listed)),
            StageConfig::RangeStabilityFilter(c) => PairlistStage::RangeStability(
                RangeStabilityFilter::new(c.lookback_days, c.min_rate_of_change),
            ),
            StageConfig::VolatilityFilter(c) => PairlistStage::RangeStability(
                RangeStabilityFilter::volatility(c.volatility_over_days, c.min_volatility),
            ),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PairlistStage::Static(_) => "StaticPairList",
            PairlistStage::Volume(_) => "VolumePairList",
            PairlistStage::Precision(_) => "PrecisionFilter",
            PairlistStage::Price(_) => "PriceFilter",
            PairlistStage::Spread(_) => "SpreadFilter",
            PairlistStage::Shuffle(_) => "ShuffleFilter",
            PairlistStage::Performance(_) => "PerformanceFilter",
            PairlistStage::Age(_) => "AgeFilter",
            PairlistStage::RangeStability(stage) => stage.name(),
        }
    }

    /// Days of daily candles this stage reads, if any
    pub fn daily_candle_days(&self) -> Option<usize> {
        match self {
            PairlistStage::Age(stage) => Some(stage.days_needed()),
            PairlistStage::RangeStability(stage) => Some(stage.days_needed()),
            _ => None,
        }
    }

    /// Source pairs from the market catalog (leading position)
    pub fn generate(&self, ctx: &PairlistContext<'_>) -> Result<Vec<String>> {
        match self {
            PairlistStage::Static(stage) => Ok(stage.generate(ctx)),
            PairlistStage::Volume(stage) => stage.generate(ctx),
            _ => Err(EngineError::Configuration(format!(
                "{} cannot be the leading pairlist stage",
                self.name()
            ))),
        }
    }

    /// Narrow or reorder the previous stage's output
    pub fn filter(&mut self, pairs: &[String], ctx: &PairlistContext<'_>) -> Result<Vec<String>> {
        match self {
            PairlistStage::Static(_) => Err(EngineError::Configuration(
                "StaticPairList can only be used as the leading stage".to_string(),
            )),
            PairlistStage::Volume(stage) => stage.filter(pairs, ctx),
            PairlistStage::Precision(stage) => stage.filter(pairs, ctx),
            PairlistStage::Price(stage) => stage.filter(pairs, ctx),
            PairlistStage::Spread(stage) => stage.filter(pairs, ctx),
            PairlistStage::Shuffle(stage) => Ok(stage.filter(pairs)),
            PairlistStage::Performance(stage) => Ok(stage.filter(pairs, ctx)),
            PairlistStage::Age(stage) => stage.filter(pairs, ctx),
            PairlistStage::RangeStability(stage) => stage.filter(pairs, ctx),
        }
    }
}

/// Filters that read tickers cannot work from an empty ticker map
pub(crate) fn require_tickers(stage: &str, pairs: &[String], ctx: &PairlistContext<'_>) -> Result<()> {
    if !pairs.is_empty() && ctx.tickers.is_empty() {
        return Err(EngineError::StageFailed {
            stage: stage.to_string(),
            reason: "no tickers available".to_string(),
        });
    }
    Ok(())
}

/// Same contract as [`require_tickers`], for stages that read daily candles
pub(crate) fn require_daily_candles(stage: &str, pairs: &[String], ctx: &PairlistContext<'_>) -> Result<()> {
    if !pairs.is_empty() && ctx.daily_candles.is_empty() {
        return Err(EngineError::StageFailed {
            stage: stage.to_string(),
            reason: "no daily candles available".to_string(),
        });
    }
    Ok(())
}
