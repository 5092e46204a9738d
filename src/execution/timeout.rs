use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use super::position::Position;
use crate::clock;
use crate::config::{EngineConfig, UnfilledTimeoutConfig};
use crate::error::{EngineError, Result};
use crate::models::{OrderBookSnapshot, PendingOrder};

/// Strategy-supplied override for the unfilled-order timeout
///
/// When installed, its answer replaces the default elapsed-time rule.
pub trait TimeoutHook: Send + Sync {
    fn check_timeout(
        &self,
        pair: &str,
        position: Option<&Position>,
        order: &PendingOrder,
        book: Option<&OrderBookSnapshot>,
    ) -> bool;
}

/// What the hook may look at besides the order itself
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeoutContext<'a> {
    pub position: Option<&'a Position>,
    pub book: Option<&'a OrderBookSnapshot>,
}

/// Has `order` been outstanding for at least `timeout_minutes`?
///
/// A hook, when present, decides alone. Without one, `None` never expires.
pub fn is_order_expired(
    order: &PendingOrder,
    now: DateTime<Utc>,
    timeout_minutes: Option<u64>,
    hook: Option<&dyn TimeoutHook>,
    context: TimeoutContext<'_>,
) -> bool {
    if let Some(hook) = hook {
        return hook.check_timeout(&order.pair, context.position, order, context.book);
    }

    match timeout_minutes {
        Some(minutes) => i64::try_from(minutes)
            .ok()
            .and_then(Duration::try_minutes)
            .is_some_and(|window| clock::has_elapsed(order.submitted_at, window, now)),
        None => false,
    }
}

/// Polls pending orders once per round in live and dry-run modes
#[derive(Clone)]
pub struct TimeoutEvaluator {
    timeouts: UnfilledTimeoutConfig,
    hook: Option<Arc<dyn TimeoutHook>>,
}

impl TimeoutEvaluator {
    /// Fails in backtest mode, where no wall-clock time passes between fills
    pub fn new(config: &EngineConfig) -> Result<Self> {
        if !config.run_mode.uses_wall_clock() {
            return Err(EngineError::Configuration(
                "unfilled order timeouts are not evaluated in backtest mode".to_string(),
            ));
        }
        Ok(Self {
            timeouts: config.unfilled_timeout,
            hook: None,
        })
    }

    pub fn with_hook(mut self, hook: Arc<dyn TimeoutHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Timeout applying to `order`: its own, else the configured one for its side
    pub fn timeout_for(&self, order: &PendingOrder) -> Option<u64> {
        order
            .timeout_minutes
            .or_else(|| self.timeouts.for_side(order.side))
    }

    pub fn is_expired(
        &self,
        order: &PendingOrder,
        now: DateTime<Utc>,
        context: TimeoutContext<'_>,
    ) -> bool {
        let expired = is_order_expired(
            order,
            now,
            self.timeout_for(order),
            self.hook.as_deref(),
            context,
        );
        if expired {
            tracing::info!(
                pair = %order.pair,
                order_id = %order.id,
                side = ?order.side,
                "Unfilled order timed out"
            );
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunMode;
    use crate::models::OrderSide;

    fn order(submitted_at: DateTime<Utc>, side: OrderSide) -> PendingOrder {
        PendingOrder {
            id: "order-1".to_string(),
            pair: "ETH/USDT".to_string(),
            side,
            price: 100.0,
            quantity: 1.0,
            submitted_at,
            timeout_minutes: None,
        }
    }

    struct AlwaysExpire;

    impl TimeoutHook for AlwaysExpire {
        fn check_timeout(
            &self,
            _pair: &str,
            _position: Option<&Position>,
            _order: &PendingOrder,
            _book: Option<&OrderBookSnapshot>,
        ) -> bool {
            true
        }
    }

    struct NeverExpire;

    impl TimeoutHook for NeverExpire {
        fn check_timeout(
            &self,
            _pair: &str,
            _position: Option<&Position>,
            _order: &PendingOrder,
            _book: Option<&OrderBookSnapshot>,
        ) -> bool {
            false
        }
    }

    #[test]
    fn test_expiry_boundary() {
        let t = Utc::now();
        let order = order(t, OrderSide::Entry);
        let ctx = TimeoutContext::default();

        let before = t + Duration::minutes(9) + Duration::seconds(59);
        assert!(!is_order_expired(&order, before, Some(10), None, ctx));
        assert!(is_order_expired(&order, t + Duration::minutes(10), Some(10), None, ctx));
    }

    #[test]
    fn test_no_timeout_never_expires() {
        let t = Utc::now();
        let order = order(t, OrderSide::Exit);
        let later = t + Duration::days(365);
        assert!(!is_order_expired(&order, later, None, None, TimeoutContext::default()));
    }

    #[test]
    fn test_hook_replaces_default_rule() {
        let t = Utc::now();
        let order = order(t, OrderSide::Entry);
        let ctx = TimeoutContext::default();

        assert!(is_order_expired(&order, t, Some(10), Some(&AlwaysExpire), ctx));
        let much_later = t + Duration::hours(5);
        assert!(!is_order_expired(&order, much_later, Some(10), Some(&NeverExpire), ctx));
    }

    #[test]
    fn test_evaluator_uses_side_defaults() {
        let evaluator = TimeoutEvaluator::new(&EngineConfig::default()).unwrap();
        let t = Utc::now();
        let ctx = TimeoutContext::default();

        let entry = order(t, OrderSide::Entry);
        let exit = order(t, OrderSide::Exit);
        let now = t + Duration::minutes(15);
        assert!(evaluator.is_expired(&entry, now, ctx));
        assert!(!evaluator.is_expired(&exit, now, ctx));

        let mut custom = order(t, OrderSide::Exit);
        custom.timeout_minutes = Some(5);
        assert!(evaluator.is_expired(&custom, now, ctx));
    }

    #[test]
    fn test_evaluator_hook() {
        let evaluator = TimeoutEvaluator::new(&EngineConfig::default())
            .unwrap()
            .with_hook(Arc::new(NeverExpire));
        let t = Utc::now();
        let entry = order(t, OrderSide::Entry);
        assert!(!evaluator.is_expired(&entry, t + Duration::hours(1), TimeoutContext::default()));
    }

    #[test]
    fn test_rejected_in_backtest() {
        let config = EngineConfig {
            run_mode: RunMode::Backtest,
            ..EngineConfig::default()
        };
        assert!(matches!(
            TimeoutEvaluator::new(&config),
            Err(EngineError::Configuration(_))
        ));
    }
}
