// Candle replay, trade statistics and synthetic market data
pub mod loss;
pub mod metrics;
pub mod runner;
pub mod synthetic;

pub use loss::{loss_by_name, LossFunction, OnlyProfitLoss, SharpeLoss, ShortTradeDurationLoss};
pub use metrics::{BacktestMetrics, TradeRecord};
pub use runner::{BacktestResult, BacktestRunner};
pub use synthetic::{MarketScenario, SyntheticDataGenerator, SyntheticFeed};
