use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::exit::ExitReason;
use crate::config::FeeConfig;
use crate::error::{EngineError, Result};
use crate::risk::{StoplossPolicy, StoplossState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
}

/// An open (or closed) trade and the stop state protecting it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub pair: String,
    pub entry_price: f64,
    pub quantity: f64,
    pub entry_time: DateTime<Utc>,
    pub fee_entry: f64,
    pub fee_exit: f64,
    pub status: PositionStatus,
    pub stoploss: StoplossState,
    /// Highest rate observed while open
    pub max_rate: f64,
    /// Lowest rate observed while open
    pub min_rate: f64,
    pub realized_profit: Option<f64>,
    pub exit_price: Option<f64>,
    pub exit_time: Option<DateTime<Utc>>,
    pub exit_reason: Option<ExitReason>,
}

impl Position {
    pub fn open(
        pair: impl Into<String>,
        entry_price: f64,
        quantity: f64,
        entry_time: DateTime<Utc>,
        fees: &FeeConfig,
        policy: &StoplossPolicy,
    ) -> Result<Self> {
        let pair = pair.into();
        if !entry_price.is_finite() || entry_price <= 0.0 {
            return Err(EngineError::invariant(
                pair,
                format!("entry price must be positive, got {}", entry_price),
            ));
        }
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(EngineError::invariant(
                pair,
                format!("quantity must be positive, got {}", quantity),
            ));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            stoploss: policy.initial_state(entry_price),
            pair,
            entry_price,
            quantity,
            entry_time,
            fee_entry: fees.entry,
            fee_exit: fees.exit,
            status: PositionStatus::Open,
            max_rate: entry_price,
            min_rate: entry_price,
            realized_profit: None,
            exit_price: None,
            exit_time: None,
            exit_reason: None,
        })
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Stake spent including the entry fee
    pub fn open_value(&self) -> f64 {
        self.quantity * self.entry_price * (1.0 + self.fee_entry)
    }

    /// Proceeds of selling everything at `rate`, net of the exit fee
    pub fn close_value(&self, rate: f64) -> f64 {
        self.quantity * rate * (1.0 - self.fee_exit)
    }

    /// Fee-adjusted profit ratio if closed at `rate`
    pub fn profit_ratio(&self, rate: f64) -> f64 {
        self.close_value(rate) / self.open_value() - 1.0
    }

    /// Fee-adjusted absolute profit (in stake currency) if closed at `rate`
    pub fn profit_abs(&self, rate: f64) -> f64 {
        self.close_value(rate) - self.open_value()
    }

    pub fn update_rate_extremes(&mut self, rate: f64) {
        self.max_rate = self.max_rate.max(rate);
        self.min_rate = self.min_rate.min(rate);
    }

    pub fn close(&mut self, rate: f64, time: DateTime<Utc>, reason: ExitReason) -> Result<f64> {
        if !self.is_open() {
            return Err(EngineError::invariant(&self.pair, "position already closed"));
        }

        let profit = self.profit_abs(rate);
        self.status = PositionStatus::Closed;
        self.realized_profit = Some(profit);
        self.exit_price = Some(rate);
        self.exit_time = Some(time);
        self.exit_reason = Some(reason);
        Ok(profit)
    }
}

/// All positions the engine knows about, at most one open per pair
pub struct PositionBook {
    positions: Vec<Position>,
    fees: FeeConfig,
    policy: StoplossPolicy,
    total_profit: f64,
}

impl PositionBook {
    pub fn new(fees: FeeConfig, policy: StoplossPolicy) -> Self {
        Self {
            positions: Vec::new(),
            fees,
            policy,
            total_profit: 0.0,
        }
    }

    /// Restore from previously persisted positions
    pub fn with_positions(fees: FeeConfig, policy: StoplossPolicy, positions: Vec<Position>) -> Self {
        let total_profit: f64 = positions.iter().filter_map(|p| p.realized_profit).sum();

        tracing::info!(
            "Restored {} positions (realized profit: {:.4})",
            positions.len(),
            total_profit
        );

        Self {
            positions,
            fees,
            policy,
            total_profit,
        }
    }

    pub fn open_position(
        &mut self,
        pair: &str,
        entry_price: f64,
        quantity: f64,
        time: DateTime<Utc>,
    ) -> Result<Uuid> {
        if self.has_open_position(pair) {
            return Err(EngineError::invariant(pair, "already have an open position"));
        }

        let position = Position::open(pair, entry_price, quantity, time, &self.fees, &self.policy)?;
        let id = position.id;
        tracing::info!(
            pair = %pair,
            price = entry_price,
            quantity = quantity,
            stop = position.stoploss.current_stop_price,
            "Opened position"
        );
        self.positions.push(position);
        Ok(id)
    }

    pub fn has_open_position(&self, pair: &str) -> bool {
        self.positions.iter().any(|p| p.pair == pair && p.is_open())
    }

    pub fn get_open_position(&self, pair: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.pair == pair && p.is_open())
    }

    pub fn get(&self, id: Uuid) -> Option<&Position> {
        self.positions.iter().find(|p| p.id == id)
    }

    pub fn close_position(
        &mut self,
        id: Uuid,
        rate: f64,
        time: DateTime<Utc>,
        reason: ExitReason,
    ) -> Result<f64> {
        let position = self
            .positions
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| EngineError::invariant(id.to_string(), "position not found"))?;

        let profit = position.close(rate, time, reason)?;
        self.total_profit += profit;

        tracing::info!(
            pair = %position.pair,
            rate = rate,
            profit = profit,
            reason = %reason,
            "Closed position"
        );
        Ok(profit)
    }

    pub fn open_positions(&self) -> Vec<&Position> {
        self.positions.iter().filter(|p| p.is_open()).collect()
    }

    /// Pairs with an open position, in opening order
    pub fn open_pairs(&self) -> Vec<String> {
        self.positions
            .iter()
            .filter(|p| p.is_open())
            .map(|p| p.pair.clone())
            .collect()
    }

    pub fn all_positions(&self) -> &[Position] {
        &self.positions
    }

    /// Mutable access for a decision round; closed entries are skipped by the evaluator
    pub fn positions_mut(&mut self) -> &mut [Position] {
        &mut self.positions
    }

    pub fn total_profit(&self) -> f64 {
        self.total_profit
    }
}
