// Exit decisions, order pricing and the per-round driver
pub mod executor;
pub mod exit;
pub mod position;
pub mod price_feed;
pub mod pricing;
pub mod timeout;

pub use executor::{
    ExecutionAction, ExecutionDecision, Executor, RoundInputs, RoundReport, SkippedPair,
};
pub use exit::{ExitDecision, ExitOrchestrator, ExitReason, HoldReason};
pub use position::{Position, PositionBook, PositionStatus};
pub use price_feed::MarketFeed;
pub use pricing::{check_depth_of_market, select_entry_price, select_exit_price, select_order_price};
pub use timeout::{is_order_expired, TimeoutContext, TimeoutEvaluator, TimeoutHook};
