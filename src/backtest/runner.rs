use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use super::metrics::BacktestMetrics;
use crate::config::{EngineConfig, RunMode};
use crate::error::{EngineError, Result};
use crate::execution::{ExecutionAction, Executor, ExitReason, PositionBook, RoundInputs};
use crate::models::{Candle, Signals, Ticker};
use crate::risk::StoplossPolicy;
use crate::strategy::Strategy;

/// Outcome of one backtest run
#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub metrics: BacktestMetrics,
    /// First and last candle time seen
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Replays candles through the same exit logic used live
///
/// Stops are checked against each candle's high and low first. The close
/// then stands in for bid, ask and last for the remaining exit rules and for
/// entries. Exits are evaluated before entries on every candle; whatever is
/// still open after the final candle is force-exited.
pub struct BacktestRunner {
    executor: Executor,
    strategy: Arc<dyn Strategy>,
    stake_amount: f64,
}

impl BacktestRunner {
    pub fn new(config: &EngineConfig, strategy: Arc<dyn Strategy>, stake_amount: f64) -> Result<Self> {
        if !stake_amount.is_finite() || stake_amount <= 0.0 {
            return Err(EngineError::Configuration(format!(
                "stake amount must be positive, got {}",
                stake_amount
            )));
        }

        let mut config = config.with_strategy_overrides(strategy.as_ref())?;
        config.run_mode = RunMode::Backtest;

        Ok(Self {
            executor: Executor::new(config)?,
            strategy,
            stake_amount,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        self.executor.config()
    }

    /// Run over `data`: candles per pair, oldest first
    pub fn run(&self, data: &BTreeMap<String, Vec<Candle>>) -> Result<BacktestResult> {
        let timeline: BTreeSet<DateTime<Utc>> = data
            .values()
            .flat_map(|candles| candles.iter().map(|c| c.timestamp))
            .collect();
        let (Some(&start), Some(&end)) = (timeline.first(), timeline.last()) else {
            return Err(EngineError::Configuration(
                "backtest needs at least one candle".to_string(),
            ));
        };

        let lookback = self.strategy.min_candles_required().max(1);
        tracing::info!(
            strategy = self.strategy.name(),
            pairs = data.len(),
            candles = timeline.len(),
            lookback = lookback,
            "Starting backtest"
        );

        let config = self.executor.config();
        let policy = StoplossPolicy::new(&config.stoploss)?;
        let mut book = PositionBook::new(config.fees, policy);
        let empty_books = HashMap::new();
        let mut cursors: HashMap<&str, usize> = HashMap::new();

        for now in timeline {
            // Pairs with a candle at `now` and the index of that candle
            let mut current: Vec<(&str, usize)> = Vec::new();
            for (pair, candles) in data {
                let cursor = cursors.entry(pair.as_str()).or_insert(0);
                while *cursor < candles.len() && candles[*cursor].timestamp < now {
                    *cursor += 1;
                }
                if *cursor < candles.len() && candles[*cursor].timestamp == now {
                    current.push((pair.as_str(), *cursor));
                }
            }

            let mut tickers = HashMap::new();
            let mut signals = HashMap::new();
            for &(pair, index) in &current {
                let candles = &data[pair];
                tickers.insert(pair.to_string(), candle_ticker(&candles[index]));
                signals.insert(pair.to_string(), self.signals_at(pair, candles, index, lookback));
            }

            let inputs = RoundInputs {
                now,
                tickers: &tickers,
                books: &empty_books,
                signals: &signals,
            };

            let mut exited = BTreeSet::new();
            for (id, pair, reason, price) in self.candle_stops(&mut book, data, &current)? {
                book.close_position(id, price, now, reason)?;
                exited.insert(pair);
            }

            let report = self.executor.evaluate_exits(book.positions_mut(), &inputs)?;
            for decision in report.exits() {
                if let ExecutionAction::Exit { reason, price } = decision.action {
                    book.close_position(decision.position_id, price, now, reason)?;
                    exited.insert(decision.pair.clone());
                }
            }

            for &(pair, _) in &current {
                let wants_entry = signals.get(pair).is_some_and(|s| s.entry);
                if !wants_entry || book.has_open_position(pair) || exited.contains(pair) {
                    continue;
                }
                let Some(ticker) = tickers.get(pair) else {
                    continue;
                };
                if let Some(price) = self.executor.quote_entry(ticker, None)? {
                    book.open_position(pair, price, self.stake_amount / price, now)?;
                }
            }
        }

        self.force_exit_remaining(&mut book, data)?;

        let metrics = BacktestMetrics::from_positions(book.all_positions());

        tracing::info!(
            trades = metrics.total_trades,
            profit = metrics.total_profit_abs,
            "Backtest finished"
        );

        Ok(BacktestResult {
            metrics,
            start,
            end,
        })
    }

    /// Stops hit by a candle's low, checked before the close is evaluated
    fn candle_stops(
        &self,
        book: &mut PositionBook,
        data: &BTreeMap<String, Vec<Candle>>,
        current: &[(&str, usize)],
    ) -> Result<Vec<(Uuid, String, ExitReason, f64)>> {
        let orchestrator = self.executor.orchestrator();
        let mut hits = Vec::new();
        for position in book.positions_mut().iter_mut().filter(|p| p.is_open()) {
            let Some(&(pair, index)) = current.iter().find(|(pair, _)| *pair == position.pair) else {
                continue;
            };
            let candle = &data[pair][index];
            if let Some((reason, price)) = orchestrator.check_candle_stop(position, candle)? {
                hits.push((position.id, position.pair.clone(), reason, price));
            }
        }
        Ok(hits)
    }

    fn signals_at(&self, pair: &str, candles: &[Candle], index: usize, lookback: usize) -> Signals {
        if index + 1 < lookback {
            return Signals::default();
        }
        let window = &candles[index + 1 - lookback..=index];
        match self.strategy.populate_signals(pair, window) {
            Ok(signals) => signals,
            Err(e) => {
                tracing::warn!(pair = %pair, error = %e, "Strategy failed, no signal this candle");
                Signals::default()
            }
        }
    }

    /// Close every open position at its pair's final candle
    fn force_exit_remaining(
        &self,
        book: &mut PositionBook,
        data: &BTreeMap<String, Vec<Candle>>,
    ) -> Result<()> {
        let open: Vec<_> = book
            .open_positions()
            .iter()
            .map(|p| (p.id, p.pair.clone()))
            .collect();

        for (id, pair) in open {
            let last = data
                .get(&pair)
                .and_then(|candles| candles.last())
                .ok_or_else(|| EngineError::invariant(&pair, "open position without candles"))?;
            book.close_position(id, last.close, last.timestamp, ExitReason::ForceExit)?;
        }
        Ok(())
    }
}

fn candle_ticker(candle: &Candle) -> Ticker {
    Ticker {
        pair: candle.pair.clone(),
        bid: candle.close,
        ask: candle.close,
        last: Some(candle.close),
        quote_volume: Some(candle.volume * candle.close),
        bid_volume: None,
        ask_volume: None,
        timestamp: candle.timestamp,
    }
}
