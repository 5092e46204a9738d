use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::exit::{ExitDecision, ExitOrchestrator, ExitReason, HoldReason};
use super::position::Position;
use super::pricing;
use super::timeout::{TimeoutContext, TimeoutEvaluator, TimeoutHook};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::models::{OrderBookSnapshot, PendingOrder, Signals, Ticker};

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionAction {
    Exit { reason: ExitReason, price: f64 },
    Hold(HoldReason),
}

#[derive(Debug, Clone)]
pub struct ExecutionDecision {
    pub position_id: Uuid,
    pub pair: String,
    /// Rate the position was evaluated at
    pub rate: f64,
    pub action: ExecutionAction,
}

/// A pair left out of this round because its data was unusable
#[derive(Debug, Clone)]
pub struct SkippedPair {
    pub pair: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct RoundReport {
    pub decisions: Vec<ExecutionDecision>,
    pub skipped: Vec<SkippedPair>,
}

impl RoundReport {
    pub fn exits(&self) -> impl Iterator<Item = &ExecutionDecision> {
        self.decisions
            .iter()
            .filter(|d| matches!(d.action, ExecutionAction::Exit { .. }))
    }
}

/// Immutable market snapshot for one decision round
pub struct RoundInputs<'a> {
    pub now: DateTime<Utc>,
    pub tickers: &'a HashMap<String, Ticker>,
    pub books: &'a HashMap<String, OrderBookSnapshot>,
    pub signals: &'a HashMap<String, Signals>,
}

/// Runs one decision round over open positions and pending orders
pub struct Executor {
    config: EngineConfig,
    orchestrator: ExitOrchestrator,
    timeouts: Option<TimeoutEvaluator>,
}

impl Executor {
    /// `config` must already be validated
    pub fn new(config: EngineConfig) -> Result<Self> {
        let timeouts = if config.run_mode.uses_wall_clock() {
            Some(TimeoutEvaluator::new(&config)?)
        } else {
            None
        };
        Ok(Self {
            orchestrator: ExitOrchestrator::new(&config),
            config,
            timeouts,
        })
    }

    pub fn with_timeout_hook(mut self, hook: Arc<dyn TimeoutHook>) -> Self {
        self.timeouts = self.timeouts.map(|t| t.with_hook(hook));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &ExitOrchestrator {
        &self.orchestrator
    }

    /// Evaluate every open position in parallel
    ///
    /// Each position is touched by exactly one worker. Pairs with missing or
    /// unusable data are reported in `skipped` and retried next round;
    /// invariant violations abort the round.
    pub fn evaluate_exits(
        &self,
        positions: &mut [Position],
        inputs: &RoundInputs<'_>,
    ) -> Result<RoundReport> {
        let mut outcomes: Vec<(usize, String, Result<ExecutionDecision>)> = positions
            .par_iter_mut()
            .enumerate()
            .filter(|(_, position)| position.is_open())
            .map(|(index, position)| {
                let pair = position.pair.clone();
                (index, pair, self.evaluate_position(position, inputs))
            })
            .collect();
        outcomes.sort_by_key(|(index, _, _)| *index);

        let mut report = RoundReport::default();
        for (_, pair, outcome) in outcomes {
            match outcome {
                Ok(decision) => report.decisions.push(decision),
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(pair = %pair, error = %e, "Skipping pair this round");
                    report.skipped.push(SkippedPair {
                        pair,
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    tracing::error!(pair = %pair, error = %e, "Aborting round");
                    return Err(e);
                }
            }
        }
        Ok(report)
    }

    fn evaluate_position(
        &self,
        position: &mut Position,
        inputs: &RoundInputs<'_>,
    ) -> Result<ExecutionDecision> {
        let ticker = inputs
            .tickers
            .get(&position.pair)
            .ok_or_else(|| EngineError::data_unavailable(&position.pair, "no ticker this round"))?;
        let rate = pricing::ticker_exit_rate(&self.config.exit, ticker)?;
        let signals = inputs.signals.get(&position.pair).copied().unwrap_or_default();

        // Stop and rate extremes only advance once the exit is priced, so a
        // failed quote leaves the position as it was for the retry
        let mut trial = position.clone();
        let decision = self
            .orchestrator
            .evaluate_exit(&mut trial, rate, inputs.now, signals)?;

        let action = match decision {
            ExitDecision::Exit(reason) => {
                let price = pricing::select_exit_price(
                    &self.config.exit,
                    &trial.pair,
                    Some(ticker),
                    inputs.books.get(&trial.pair),
                    |candidate| self.orchestrator.roi_satisfied(&trial, candidate, inputs.now),
                )?;
                ExecutionAction::Exit { reason, price }
            }
            ExitDecision::Hold(reason) => ExecutionAction::Hold(reason),
        };
        *position = trial;

        Ok(ExecutionDecision {
            position_id: position.id,
            pair: position.pair.clone(),
            rate,
            action,
        })
    }

    /// Ids of pending orders that should be cancelled this round
    ///
    /// Always empty in backtest mode.
    pub fn expired_orders(
        &self,
        orders: &[PendingOrder],
        positions: &[Position],
        inputs: &RoundInputs<'_>,
    ) -> Vec<String> {
        let Some(timeouts) = &self.timeouts else {
            return Vec::new();
        };

        orders
            .iter()
            .filter(|order| {
                let context = TimeoutContext {
                    position: positions
                        .iter()
                        .find(|p| p.is_open() && p.pair == order.pair),
                    book: inputs.books.get(&order.pair),
                };
                timeouts.is_expired(order, inputs.now, context)
            })
            .map(|order| order.id.clone())
            .collect()
    }

    /// Entry price for `pair`, or `None` when the depth-of-market check vetoes the entry
    pub fn quote_entry(
        &self,
        ticker: &Ticker,
        book: Option<&OrderBookSnapshot>,
    ) -> Result<Option<f64>> {
        let dom = &self.config.entry.check_depth_of_market;
        if dom.enabled {
            let book = book.ok_or_else(|| {
                EngineError::data_unavailable(&ticker.pair, "depth-of-market check needs an order book")
            })?;
            if !pricing::check_depth_of_market(book, dom.bids_to_ask_delta)? {
                tracing::info!(pair = %ticker.pair, "Depth of market too thin, skipping entry");
                return Ok(None);
            }
        }
        pricing::select_entry_price(&self.config.entry, ticker, book).map(Some)
    }
}
