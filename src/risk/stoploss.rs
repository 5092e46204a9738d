use serde::{Deserialize, Serialize};

use crate::config::StoplossConfig;
use crate::error::{EngineError, Result};

/// Validated stoploss configuration
///
/// Construction is the only place configuration errors are raised; a policy
/// that exists can always produce a working [`StoplossState`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoplossPolicy {
    initial_ratio: f64,
    trailing: bool,
    only_offset_is_reached: bool,
    positive_ratio: Option<f64>,
    positive_offset: f64,
}

impl StoplossPolicy {
    pub fn new(config: &StoplossConfig) -> Result<Self> {
        let ratio = config.stoploss;
        if !ratio.is_finite() || ratio >= 0.0 {
            return Err(EngineError::Configuration(format!(
                "stoploss must be a negative ratio (e.g. -0.10), got {}",
                ratio
            )));
        }
        if ratio <= -1.0 {
            return Err(EngineError::Configuration(format!(
                "stoploss {} would place the stop at or below zero",
                ratio
            )));
        }

        let offset = config.trailing_stop_positive_offset;
        if !offset.is_finite() || offset < 0.0 {
            return Err(EngineError::Configuration(format!(
                "trailing_stop_positive_offset must be >= 0, got {}",
                offset
            )));
        }

        if let Some(positive) = config.trailing_stop_positive {
            if !(positive > 0.0 && positive < 1.0) {
                return Err(EngineError::Configuration(format!(
                    "trailing_stop_positive must be between 0 and 1, got {}",
                    positive
                )));
            }
            if offset > 0.0 && offset <= positive {
                return Err(EngineError::Configuration(format!(
                    "trailing_stop_positive_offset ({}) must be greater than trailing_stop_positive ({})",
                    offset, positive
                )));
            }
        }

        if config.trailing_stop && config.trailing_only_offset_is_reached && offset == 0.0 {
            return Err(EngineError::Configuration(
                "trailing_only_offset_is_reached needs trailing_stop_positive_offset above 0"
                    .to_string(),
            ));
        }

        Ok(Self {
            initial_ratio: ratio,
            trailing: config.trailing_stop,
            only_offset_is_reached: config.trailing_only_offset_is_reached,
            positive_ratio: config.trailing_stop_positive,
            positive_offset: offset,
        })
    }

    /// Non-trailing stop at `ratio` below entry
    pub fn fixed(ratio: f64) -> Result<Self> {
        Self::new(&StoplossConfig {
            stoploss: ratio,
            ..StoplossConfig::default()
        })
    }

    pub fn initial_ratio(&self) -> f64 {
        self.initial_ratio
    }

    pub fn is_trailing(&self) -> bool {
        self.trailing
    }

    /// Fresh per-position state for a position entered at `entry_price`
    pub fn initial_state(&self, entry_price: f64) -> StoplossState {
        let initial_stop_price = entry_price * (1.0 + self.initial_ratio);
        StoplossState {
            initial_stop_ratio: self.initial_ratio,
            initial_stop_price,
            current_stop_price: initial_stop_price,
            high_water_price: entry_price,
            trailing_enabled: self.trailing,
            trailing_only_offset_is_reached: self.only_offset_is_reached,
            trailing_activated: false,
            custom_positive_ratio: self.positive_ratio,
            custom_positive_offset: (self.positive_offset > 0.0).then_some(self.positive_offset),
        }
    }
}

/// Per-position stop state, embedded in the position it protects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoplossState {
    pub initial_stop_ratio: f64,
    pub initial_stop_price: f64,
    pub current_stop_price: f64,
    /// Highest price seen since entry (or since activation when trailing waits for the offset)
    pub high_water_price: f64,
    pub trailing_enabled: bool,
    pub trailing_only_offset_is_reached: bool,
    /// One-way: never returns to false once set
    pub trailing_activated: bool,
    pub custom_positive_ratio: Option<f64>,
    pub custom_positive_offset: Option<f64>,
}

/// Result of feeding one price tick into a [`StoplossState`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopUpdate {
    pub stop_price: f64,
    pub triggered: bool,
    pub trailing_activated: bool,
}

impl StoplossState {
    /// Compute the state after observing `current_price` without mutating self
    pub fn next(&self, current_price: f64, profit_ratio: f64) -> StoplossState {
        let mut next = self.clone();

        if !self.trailing_enabled {
            next.current_stop_price = self.initial_stop_price;
            return next;
        }

        let offset = self.custom_positive_offset.unwrap_or(0.0);
        let offset_reached = profit_ratio >= offset;

        if self.trailing_only_offset_is_reached && !self.trailing_activated {
            if !offset_reached {
                // Static stop until the offset is crossed
                return next;
            }
            next.trailing_activated = true;
            next.high_water_price = current_price;
        } else {
            next.high_water_price = self.high_water_price.max(current_price);
            if offset_reached {
                next.trailing_activated = true;
            }
        }

        let ratio = match (next.trailing_activated, self.custom_positive_ratio) {
            (true, Some(positive)) => -positive,
            _ => self.initial_stop_ratio,
        };
        let candidate = next.high_water_price * (1.0 + ratio);

        // Stops only walk up
        next.current_stop_price = self.current_stop_price.max(candidate);
        next
    }

    /// Commit one price tick and report whether the stop was hit
    ///
    /// The new state is computed in full before it replaces the old one, so an
    /// error leaves the state untouched.
    pub fn apply_tick(
        &mut self,
        pair: &str,
        current_price: f64,
        profit_ratio: f64,
    ) -> Result<StopUpdate> {
        if !current_price.is_finite() || current_price <= 0.0 {
            return Err(EngineError::data_unavailable(
                pair,
                format!("unusable price {}", current_price),
            ));
        }

        if !self.trailing_enabled && self.current_stop_price != self.initial_stop_price {
            tracing::error!(pair = %pair, "Fixed stop drifted from its initial level");
            return Err(EngineError::invariant(
                pair,
                format!(
                    "fixed stop moved from {:.8} to {:.8}",
                    self.initial_stop_price, self.current_stop_price
                ),
            ));
        }

        if self.trailing_enabled {
            self.check_high_water(pair)?;
        }

        let next = self.next(current_price, profit_ratio);

        if self.trailing_activated && !next.trailing_activated {
            tracing::error!(pair = %pair, "Trailing stop deactivated");
            return Err(EngineError::invariant(pair, "trailing_activated reverted to false"));
        }
        if next.trailing_activated && !self.trailing_activated {
            tracing::debug!(
                pair = %pair,
                price = current_price,
                profit = profit_ratio,
                "Trailing stop activated"
            );
        }
        if next.current_stop_price > self.current_stop_price {
            tracing::debug!(
                pair = %pair,
                from = self.current_stop_price,
                to = next.current_stop_price,
                "Adjusting stoploss"
            );
        }

        *self = next;

        Ok(StopUpdate {
            stop_price: self.current_stop_price,
            triggered: current_price <= self.current_stop_price,
            trailing_activated: self.trailing_activated,
        })
    }

    /// A trailing stop is always some earlier high-water mark times one of its
    /// ratios, so it can never sit above the current mark times the larger one
    fn check_high_water(&self, pair: &str) -> Result<()> {
        let widest = match self.custom_positive_ratio {
            Some(positive) => self.initial_stop_ratio.max(-positive),
            None => self.initial_stop_ratio,
        };
        let ceiling = self.high_water_price * (1.0 + widest);
        if self.current_stop_price > ceiling {
            tracing::error!(pair = %pair, "High-water mark below the committed stop");
            return Err(EngineError::invariant(
                pair,
                format!(
                    "high-water {:.8} allows a stop of at most {:.8}, found {:.8}",
                    self.high_water_price, ceiling, self.current_stop_price
                ),
            ));
        }
        Ok(())
    }

    /// How far the trailing stop has moved above the initial stop
    pub fn trailing_gain(&self) -> f64 {
        self.current_stop_price - self.initial_stop_price
    }
}
