//! Configuration types
//!
//! Every field carries a serde default so a partial TOML file (or none at all)
//! still yields a complete configuration. Validation is a separate step.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::models::{BookSide, OrderSide};
use crate::risk::{RoiTable, StoplossPolicy};
use crate::strategy::Strategy;

/// Execution context the engine runs in
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Live,
    #[default]
    DryRun,
    Backtest,
}

impl RunMode {
    /// Live and dry-run wait on wall-clock time; backtests do not
    pub fn uses_wall_clock(&self) -> bool {
        !matches!(self, RunMode::Backtest)
    }
}

/// Root engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub stake_currency: String,
    pub run_mode: RunMode,
    pub fees: FeeConfig,
    pub stoploss: StoplossConfig,
    pub minimal_roi: RoiTable,
    pub exit: ExitPricingConfig,
    pub entry: EntryPricingConfig,
    pub unfilled_timeout: UnfilledTimeoutConfig,
    pub pairlist: PairlistConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stake_currency: "USDT".to_string(),
            run_mode: RunMode::default(),
            fees: FeeConfig::default(),
            stoploss: StoplossConfig::default(),
            minimal_roi: RoiTable::default(),
            exit: ExitPricingConfig::default(),
            entry: EntryPricingConfig::default(),
            unfilled_timeout: UnfilledTimeoutConfig::default(),
            pairlist: PairlistConfig::default(),
        }
    }
}

/// Fractional exchange fees charged on each side
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeeConfig {
    pub entry: f64,
    pub exit: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoplossConfig {
    /// Negative fraction below entry, e.g. -0.10
    pub stoploss: f64,
    pub trailing_stop: bool,
    pub trailing_stop_positive: Option<f64>,
    pub trailing_stop_positive_offset: f64,
    pub trailing_only_offset_is_reached: bool,
}

impl Default for StoplossConfig {
    fn default() -> Self {
        Self {
            stoploss: -0.10,
            trailing_stop: false,
            trailing_stop_positive: None,
            trailing_stop_positive_offset: 0.0,
            trailing_only_offset_is_reached: false,
        }
    }
}

/// Exit signal handling and exit order pricing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExitPricingConfig {
    pub use_sell_signal: bool,
    pub sell_profit_only: bool,
    pub ignore_roi_if_buy_signal: bool,
    pub price_side: BookSide,
    pub use_order_book: bool,
    pub order_book_min: usize,
    pub order_book_max: usize,
    pub price_last_balance: f64,
}

impl Default for ExitPricingConfig {
    fn default() -> Self {
        Self {
            use_sell_signal: true,
            sell_profit_only: false,
            ignore_roi_if_buy_signal: false,
            price_side: BookSide::Bid,
            use_order_book: false,
            order_book_min: 1,
            order_book_max: 1,
            price_last_balance: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DepthOfMarketConfig {
    pub enabled: bool,
    pub bids_to_ask_delta: f64,
}

/// Entry order pricing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EntryPricingConfig {
    pub price_side: BookSide,
    pub use_order_book: bool,
    pub order_book_top: usize,
    pub price_last_balance: f64,
    pub check_depth_of_market: DepthOfMarketConfig,
}

impl Default for EntryPricingConfig {
    fn default() -> Self {
        Self {
            price_side: BookSide::Ask,
            use_order_book: false,
            order_book_top: 1,
            price_last_balance: 0.0,
            check_depth_of_market: DepthOfMarketConfig::default(),
        }
    }
}

/// Minutes an order may stay unfilled; `None` disables the default rule for that side
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UnfilledTimeoutConfig {
    pub entry: Option<u64>,
    pub exit: Option<u64>,
}

impl Default for UnfilledTimeoutConfig {
    fn default() -> Self {
        Self {
            entry: Some(10),
            exit: Some(30),
        }
    }
}

impl UnfilledTimeoutConfig {
    pub fn for_side(&self, side: OrderSide) -> Option<u64> {
        match side {
            OrderSide::Entry => self.entry,
            OrderSide::Exit => self.exit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PairlistConfig {
    pub whitelist: Vec<String>,
    pub blacklist: Vec<String>,
    pub stages: Vec<StageConfig>,
}

impl Default for PairlistConfig {
    fn default() -> Self {
        Self {
            whitelist: Vec::new(),
            blacklist: Vec::new(),
            stages: vec![StageConfig::StaticPairList(StaticPairListConfig::default())],
        }
    }
}

/// One pipeline stage, selected by its `method` name
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "method")]
pub enum StageConfig {
    StaticPairList(StaticPairListConfig),
    VolumePairList(VolumePairListConfig),
    PrecisionFilter(PrecisionFilterConfig),
    PriceFilter(PriceFilterConfig),
    SpreadFilter(SpreadFilterConfig),
    ShuffleFilter(ShuffleFilterConfig),
    PerformanceFilter(PerformanceFilterConfig),
    AgeFilter(AgeFilterConfig),
    RangeStabilityFilter(RangeStabilityFilterConfig),
    VolatilityFilter(VolatilityFilterConfig),
}

impl StageConfig {
    pub fn name(&self) -> &'static str {
        match self {
            StageConfig::StaticPairList(_) => "StaticPairList",
            StageConfig::VolumePairList(_) => "VolumePairList",
            StageConfig::PrecisionFilter(_) => "PrecisionFilter",
            StageConfig::PriceFilter(_) => "PriceFilter",
            StageConfig::SpreadFilter(_) => "SpreadFilter",
            StageConfig::ShuffleFilter(_) => "ShuffleFilter",
            StageConfig::PerformanceFilter(_) => "PerformanceFilter",
            StageConfig::AgeFilter(_) => "AgeFilter",
            StageConfig::RangeStabilityFilter(_) => "RangeStabilityFilter",
            StageConfig::VolatilityFilter(_) => "VolatilityFilter",
        }
    }

    /// Seconds a stage result stays valid
    pub fn refresh_period(&self) -> u64 {
        match self {
            StageConfig::StaticPairList(c) => c.refresh_period,
            StageConfig::VolumePairList(c) => c.refresh_period,
            StageConfig::PrecisionFilter(c) => c.refresh_period,
            StageConfig::PriceFilter(c) => c.refresh_period,
            StageConfig::SpreadFilter(c) => c.refresh_period,
            StageConfig::ShuffleFilter(c) => c.refresh_period,
            StageConfig::PerformanceFilter(c) => c.refresh_period,
            StageConfig::AgeFilter(c) => c.refresh_period,
            StageConfig::RangeStabilityFilter(c) => c.refresh_period,
            StageConfig::VolatilityFilter(c) => c.refresh_period,
        }
    }

    /// Can this stage source pairs from the market catalog?
    pub fn can_lead(&self) -> bool {
        matches!(
            self,
            StageConfig::StaticPairList(_) | StageConfig::VolumePairList(_)
        )
    }

    fn validate(&self) -> Result<()> {
        let invalid = |detail: String| {
            Err(EngineError::Configuration(format!(
                "pairlist stage {}: {}",
                self.name(),
                detail
            )))
        };

        match self {
            StageConfig::VolumePairList(c) => {
                if c.number_assets == 0 {
                    return invalid("number_assets must be at least 1".to_string());
                }
                if !c.min_value.is_finite() || c.min_value < 0.0 {
                    return invalid(format!("min_value must be >= 0, got {}", c.min_value));
                }
            }
            StageConfig::PriceFilter(c) => {
                if !c.low_price_ratio.is_finite() || c.low_price_ratio < 0.0 {
                    return invalid(format!(
                        "low_price_ratio must be >= 0, got {}",
                        c.low_price_ratio
                    ));
                }
                if let (Some(min), Some(max)) = (c.min_price, c.max_price) {
                    if min > max {
                        return invalid(format!("min_price {} above max_price {}", min, max));
                    }
                }
            }
            StageConfig::SpreadFilter(c) => {
                if !(c.max_spread_ratio > 0.0 && c.max_spread_ratio < 1.0) {
                    return invalid(format!(
                        "max_spread_ratio must be between 0 and 1, got {}",
                        c.max_spread_ratio
                    ));
                }
            }
            StageConfig::AgeFilter(c) => {
                if c.min_days_listed == 0 {
                    return invalid("min_days_listed must be at least 1".to_string());
                }
            }
            StageConfig::RangeStabilityFilter(c) => {
                if c.lookback_days == 0 {
                    return invalid("lookback_days must be at least 1".to_string());
                }
                if !c.min_rate_of_change.is_finite() || c.min_rate_of_change < 0.0 {
                    return invalid(format!(
                        "min_rate_of_change must be >= 0, got {}",
                        c.min_rate_of_change
                    ));
                }
            }
            StageConfig::VolatilityFilter(c) => {
                if c.volatility_over_days == 0 {
                    return invalid("volatility_over_days must be at least 1".to_string());
                }
                if !c.min_volatility.is_finite() || c.min_volatility < 0.0 {
                    return invalid(format!("min_volatility must be >= 0, got {}", c.min_volatility));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StaticPairListConfig {
    pub refresh_period: u64,
}

/// Metric the volume stage ranks by
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VolumeSortKey {
    #[default]
    QuoteVolume,
    BidVolume,
    AskVolume,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VolumePairListConfig {
    pub number_assets: usize,
    pub sort_key: VolumeSortKey,
    pub min_value: f64,
    pub refresh_period: u64,
}

impl Default for VolumePairListConfig {
    fn default() -> Self {
        Self {
            number_assets: 30,
            sort_key: VolumeSortKey::QuoteVolume,
            min_value: 0.0,
            refresh_period: 1800,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PrecisionFilterConfig {
    pub refresh_period: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PriceFilterConfig {
    /// Largest allowed one-tick move relative to price; 0 disables the check
    pub low_price_ratio: f64,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub refresh_period: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpreadFilterConfig {
    pub max_spread_ratio: f64,
    pub refresh_period: u64,
}

impl Default for SpreadFilterConfig {
    fn default() -> Self {
        Self {
            max_spread_ratio: 0.005,
            refresh_period: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShuffleFilterConfig {
    pub seed: Option<u64>,
    pub refresh_period: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PerformanceFilterConfig {
    pub refresh_period: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgeFilterConfig {
    /// Daily candles a pair needs beyond this count to be kept
    pub min_days_listed: usize,
    pub refresh_period: u64,
}

impl Default for AgeFilterConfig {
    fn default() -> Self {
        Self {
            min_days_listed: 10,
            refresh_period: 0,
        }
    }
}

/// Keeps pairs whose daily high-low range over `lookback_days` is wide enough
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RangeStabilityFilterConfig {
    pub lookback_days: usize,
    pub min_rate_of_change: f64,
    pub refresh_period: u64,
}

impl Default for RangeStabilityFilterConfig {
    fn default() -> Self {
        Self {
            lookback_days: 10,
            min_rate_of_change: 0.01,
            refresh_period: 1440,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VolatilityFilterConfig {
    pub volatility_over_days: usize,
    pub min_volatility: f64,
    pub refresh_period: u64,
}

impl Default for VolatilityFilterConfig {
    fn default() -> Self {
        Self {
            volatility_over_days: 10,
            min_volatility: 0.01,
            refresh_period: 1440,
        }
    }
}

impl EngineConfig {
    /// Check every section; the first problem found is returned
    pub fn validate(&self) -> Result<()> {
        if self.stake_currency.trim().is_empty() {
            return Err(EngineError::Configuration(
                "stake_currency must not be empty".to_string(),
            ));
        }

        for (side, fee) in [("entry", self.fees.entry), ("exit", self.fees.exit)] {
            if !(0.0..1.0).contains(&fee) {
                return Err(EngineError::Configuration(format!(
                    "fees.{} must be in [0, 1), got {}",
                    side, fee
                )));
            }
        }

        StoplossPolicy::new(&self.stoploss)?;

        for (section, balance) in [
            ("entry", self.entry.price_last_balance),
            ("exit", self.exit.price_last_balance),
        ] {
            if !(0.0..=1.0).contains(&balance) {
                return Err(EngineError::Configuration(format!(
                    "{}.price_last_balance must be in [0, 1], got {}",
                    section, balance
                )));
            }
        }

        if self.entry.order_book_top == 0 {
            return Err(EngineError::Configuration(
                "entry.order_book_top is 1-indexed and must be at least 1".to_string(),
            ));
        }
        if self.exit.order_book_min == 0 || self.exit.order_book_max < self.exit.order_book_min {
            return Err(EngineError::Configuration(format!(
                "exit order book range {}..={} is invalid",
                self.exit.order_book_min, self.exit.order_book_max
            )));
        }

        let dom = &self.entry.check_depth_of_market;
        if !dom.bids_to_ask_delta.is_finite() || dom.bids_to_ask_delta < 0.0 {
            return Err(EngineError::Configuration(format!(
                "check_depth_of_market.bids_to_ask_delta must be >= 0, got {}",
                dom.bids_to_ask_delta
            )));
        }

        self.validate_pairlist()
    }

    fn validate_pairlist(&self) -> Result<()> {
        let stages = &self.pairlist.stages;
        let Some(leading) = stages.first() else {
            return Err(EngineError::Configuration(
                "pairlist needs at least one stage".to_string(),
            ));
        };
        if !leading.can_lead() {
            return Err(EngineError::Configuration(format!(
                "{} cannot be the leading pairlist stage",
                leading.name()
            )));
        }
        if let Some(stage) = stages
            .iter()
            .skip(1)
            .find(|s| matches!(s, StageConfig::StaticPairList(_)))
        {
            return Err(EngineError::Configuration(format!(
                "{} can only be used as the leading stage",
                stage.name()
            )));
        }
        for stage in stages {
            stage.validate()?;
        }

        if matches!(leading, StageConfig::StaticPairList(_)) && self.pairlist.whitelist.is_empty() {
            tracing::warn!("StaticPairList with an empty whitelist will never select a pair");
        }
        Ok(())
    }

    /// Apply strategy-level ROI and stoploss overrides and re-validate
    pub fn with_strategy_overrides(&self, strategy: &dyn Strategy) -> Result<Self> {
        let mut resolved = self.clone();
        if let Some(roi) = strategy.minimal_roi() {
            tracing::info!(strategy = strategy.name(), "Using strategy minimal_roi");
            resolved.minimal_roi = roi;
        }
        if let Some(stoploss) = strategy.stoploss() {
            tracing::info!(
                strategy = strategy.name(),
                stoploss = stoploss,
                "Using strategy stoploss"
            );
            resolved.stoploss.stoploss = stoploss;
        }
        resolved.validate()?;
        Ok(resolved)
    }
}
