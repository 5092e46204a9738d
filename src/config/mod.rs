pub mod loader;
pub mod types;

pub use loader::{load_config, load_from_str};
pub use types::{
    AgeFilterConfig, DepthOfMarketConfig, EngineConfig, EntryPricingConfig, ExitPricingConfig,
    FeeConfig, PairlistConfig, PerformanceFilterConfig, PrecisionFilterConfig, PriceFilterConfig,
    RangeStabilityFilterConfig, RunMode, ShuffleFilterConfig, SpreadFilterConfig, StageConfig,
    StaticPairListConfig, StoplossConfig, UnfilledTimeoutConfig, VolatilityFilterConfig,
    VolumePairListConfig, VolumeSortKey,
};
