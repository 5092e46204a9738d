//! Paper-trading loop: every round refreshes the pairlist, evaluates exits
//! and pending orders, then places simulated entry orders.
//!
//! Fills are simulated. Exits fill immediately at the quoted price; entry
//! orders rest until the market ask reaches the order price or they time out.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{EngineConfig, RunMode};
use crate::error::{EngineError, Result};
use crate::execution::{ExecutionAction, Executor, MarketFeed, PositionBook, RoundInputs};
use crate::models::{OrderSide, PendingOrder, Signals};
use crate::pairlist::{PairPerformance, PairlistContext, PairlistManager};
use crate::risk::StoplossPolicy;
use crate::strategy::Strategy;

/// What happened in one round
#[derive(Debug, Clone, Default)]
pub struct RoundSummary {
    pub now: Option<DateTime<Utc>>,
    pub whitelist: Vec<String>,
    pub exits: usize,
    pub cancelled: usize,
    pub filled: usize,
    pub placed: usize,
    pub skipped: usize,
}

pub struct DryRunEngine {
    executor: Executor,
    pairlist: PairlistManager,
    positions: PositionBook,
    pending: Vec<PendingOrder>,
    performance: HashMap<String, PairPerformance>,
    strategy: Arc<dyn Strategy>,
    feed: Arc<dyn MarketFeed>,
    stake_amount: f64,
}

impl DryRunEngine {
    pub fn new(
        config: &EngineConfig,
        strategy: Arc<dyn Strategy>,
        feed: Arc<dyn MarketFeed>,
        stake_amount: f64,
    ) -> Result<Self> {
        if config.run_mode == RunMode::Backtest {
            return Err(EngineError::Configuration(
                "dry-run engine cannot run in backtest mode".to_string(),
            ));
        }
        if !stake_amount.is_finite() || stake_amount <= 0.0 {
            return Err(EngineError::Configuration(format!(
                "stake amount must be positive, got {}",
                stake_amount
            )));
        }

        let config = config.with_strategy_overrides(strategy.as_ref())?;
        let policy = StoplossPolicy::new(&config.stoploss)?;
        let positions = PositionBook::new(config.fees, policy);
        let pairlist = PairlistManager::new(&config)?;

        let mut executor = Executor::new(config)?;
        if let Some(hook) = strategy.timeout_hook() {
            executor = executor.with_timeout_hook(hook);
        }

        tracing::info!(
            strategy = strategy.name(),
            stages = ?pairlist.stage_names(),
            stake_amount = stake_amount,
            "Dry-run engine ready"
        );

        Ok(Self {
            executor,
            pairlist,
            positions,
            pending: Vec::new(),
            performance: HashMap::new(),
            strategy,
            feed,
            stake_amount,
        })
    }

    pub fn positions(&self) -> &PositionBook {
        &self.positions
    }

    pub fn pending_orders(&self) -> &[PendingOrder] {
        &self.pending
    }

    pub fn pairlist(&self) -> &PairlistManager {
        &self.pairlist
    }

    pub fn pairlist_mut(&mut self) -> &mut PairlistManager {
        &mut self.pairlist
    }

    pub fn performance(&self) -> &HashMap<String, PairPerformance> {
        &self.performance
    }

    /// One full decision round at `now`
    ///
    /// Recoverable errors (a missing catalog, a failed leading stage) end
    /// the round early; the caller decides whether to keep going.
    pub fn run_round(&mut self, now: DateTime<Utc>) -> Result<RoundSummary> {
        let config = self.executor.config().clone();
        let markets = self.feed.markets()?;
        let active: Vec<String> = markets
            .values()
            .filter(|m| m.active)
            .map(|m| m.pair.clone())
            .collect();
        let tickers = self.feed.tickers(&active);
        let daily_candles = match self.pairlist.daily_candle_days() {
            Some(days) => self.feed.daily_candles_for(&active, days),
            None => HashMap::new(),
        };

        let open_pairs = self.positions.open_pairs();
        let ctx = PairlistContext {
            markets: &markets,
            tickers: &tickers,
            open_pairs: &open_pairs,
            performance: &self.performance,
            daily_candles: &daily_candles,
        };
        let whitelist = match self.pairlist.refresh_pairlist(now, &ctx) {
            Ok(whitelist) => whitelist,
            Err(e) if e.is_recoverable() => {
                tracing::warn!(error = %e, "Pairlist refresh failed, keeping previous whitelist");
                self.pairlist.whitelist().to_vec()
            }
            Err(e) => return Err(e),
        };

        let mut watched: BTreeSet<String> = whitelist.iter().cloned().collect();
        watched.extend(open_pairs.iter().cloned());
        watched.extend(self.pending.iter().map(|o| o.pair.clone()));
        let watched: Vec<String> = watched.into_iter().collect();

        let books = if needs_order_books(&config) {
            self.feed.order_books(&watched, book_depth(&config))
        } else {
            HashMap::new()
        };
        let signals = self.collect_signals(&watched);

        let inputs = RoundInputs {
            now,
            tickers: &tickers,
            books: &books,
            signals: &signals,
        };
        let mut summary = RoundSummary {
            now: Some(now),
            whitelist: whitelist.clone(),
            ..RoundSummary::default()
        };

        let report = self
            .executor
            .evaluate_exits(self.positions.positions_mut(), &inputs)?;
        summary.skipped = report.skipped.len();

        let mut exited = BTreeSet::new();
        for decision in report.exits() {
            if let ExecutionAction::Exit { reason, price } = decision.action {
                let ratio = self
                    .positions
                    .get(decision.position_id)
                    .map(|p| p.profit_ratio(price))
                    .unwrap_or_default();
                self.positions
                    .close_position(decision.position_id, price, now, reason)?;
                let stats = self.performance.entry(decision.pair.clone()).or_default();
                stats.profit += ratio;
                stats.count += 1;
                exited.insert(decision.pair.clone());
                summary.exits += 1;
            }
        }

        let expired = self
            .executor
            .expired_orders(&self.pending, self.positions.all_positions(), &inputs);
        if !expired.is_empty() {
            self.pending.retain(|order| {
                let cancel = expired.contains(&order.id);
                if cancel {
                    tracing::info!(pair = %order.pair, order = %order.id, "Cancelled unfilled order");
                }
                !cancel
            });
            summary.cancelled = expired.len();
        }

        summary.filled = self.fill_pending(now, &inputs)?;
        summary.placed = self.place_entries(now, &whitelist, &exited, &inputs)?;

        tracing::info!(
            whitelist = summary.whitelist.len(),
            open = self.positions.open_positions().len(),
            exits = summary.exits,
            cancelled = summary.cancelled,
            filled = summary.filled,
            placed = summary.placed,
            "Round complete"
        );
        Ok(summary)
    }

    /// Run `rounds` rounds, one per `throttle` tick
    ///
    /// `clock` supplies the time of each round. Recoverable round errors are
    /// logged and the loop continues; anything else stops it.
    pub async fn run_rounds(
        &mut self,
        rounds: usize,
        throttle: std::time::Duration,
        mut clock: impl FnMut() -> Result<DateTime<Utc>>,
    ) -> Result<Vec<RoundSummary>> {
        if throttle.is_zero() {
            return Err(EngineError::Configuration(
                "throttle between rounds must be greater than zero".into(),
            ));
        }
        let mut ticker = tokio::time::interval(throttle);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut summaries = Vec::with_capacity(rounds);
        for round in 1..=rounds {
            ticker.tick().await;
            let now = clock()?;
            tracing::debug!(round = round, now = %now, "Round start");

            match self.run_round(now) {
                Ok(summary) => summaries.push(summary),
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(round = round, error = %e, "Round skipped");
                }
                Err(e) => {
                    tracing::error!(round = round, error = %e, "Stopping dry run");
                    return Err(e);
                }
            }
        }
        Ok(summaries)
    }

    fn collect_signals(&self, pairs: &[String]) -> HashMap<String, Signals> {
        let needed = self.strategy.min_candles_required().max(1);
        pairs
            .iter()
            .filter_map(|pair| {
                let candles = match self.feed.candles(pair, needed) {
                    Ok(candles) => candles,
                    Err(e) => {
                        tracing::warn!(pair = %pair, error = %e, "Candles unavailable");
                        return None;
                    }
                };
                if candles.len() < needed {
                    tracing::debug!(pair = %pair, have = candles.len(), needed = needed, "Not enough candles yet");
                    return None;
                }
                match self.strategy.populate_signals(pair, &candles) {
                    Ok(signals) => Some((pair.clone(), signals)),
                    Err(e) => {
                        tracing::warn!(pair = %pair, error = %e, "Strategy failed");
                        None
                    }
                }
            })
            .collect()
    }

    /// Entry orders whose price the market ask has come down to
    fn fill_pending(&mut self, now: DateTime<Utc>, inputs: &RoundInputs<'_>) -> Result<usize> {
        let (fillable, resting): (Vec<PendingOrder>, Vec<PendingOrder>) =
            std::mem::take(&mut self.pending)
                .into_iter()
                .partition(|order| {
                    order.side == OrderSide::Entry
                        && inputs
                            .tickers
                            .get(&order.pair)
                            .is_some_and(|t| t.ask <= order.price)
                });
        self.pending = resting;

        let mut filled = 0;
        for order in fillable {
            if self.positions.has_open_position(&order.pair) {
                tracing::warn!(pair = %order.pair, "Dropping entry fill, position already open");
                continue;
            }
            self.positions
                .open_position(&order.pair, order.price, order.quantity, now)?;
            filled += 1;
        }
        Ok(filled)
    }

    fn place_entries(
        &mut self,
        now: DateTime<Utc>,
        whitelist: &[String],
        exited: &BTreeSet<String>,
        inputs: &RoundInputs<'_>,
    ) -> Result<usize> {
        let mut placed = 0;
        for pair in whitelist {
            let wants_entry = inputs.signals.get(pair).is_some_and(|s| s.entry);
            if !wants_entry
                || exited.contains(pair)
                || self.positions.has_open_position(pair)
                || self.pending.iter().any(|o| &o.pair == pair)
            {
                continue;
            }
            let Some(ticker) = inputs.tickers.get(pair) else {
                continue;
            };

            let quote = self.executor.quote_entry(ticker, inputs.books.get(pair));
            let price = match quote {
                Ok(Some(price)) => price,
                Ok(None) => continue,
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(pair = %pair, error = %e, "No entry quote");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let order = PendingOrder {
                id: Uuid::new_v4().to_string(),
                pair: pair.clone(),
                side: OrderSide::Entry,
                price,
                quantity: self.stake_amount / price,
                submitted_at: now,
                timeout_minutes: None,
            };
            tracing::info!(pair = %pair, price = price, quantity = order.quantity, "Placed entry order");
            self.pending.push(order);
            placed += 1;
        }
        Ok(placed)
    }
}

fn needs_order_books(config: &EngineConfig) -> bool {
    config.exit.use_order_book
        || config.entry.use_order_book
        || config.entry.check_depth_of_market.enabled
}

fn book_depth(config: &EngineConfig) -> usize {
    config
        .exit
        .order_book_max
        .max(config.entry.order_book_top)
        .max(5)
}
