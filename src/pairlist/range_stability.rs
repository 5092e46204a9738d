use super::{require_daily_candles, PairlistContext};
use crate::error::Result;
use crate::models::Candle;

/// Drops pairs whose high-low range over the last `lookback_days` daily
/// candles is below `min_rate_of_change`
///
/// Also backs the volatility stage, which applies the same range test.
#[derive(Debug, Clone)]
pub struct RangeStabilityFilter {
    name: &'static str,
    lookback_days: usize,
    min_rate_of_change: f64,
}

impl RangeStabilityFilter {
    pub fn new(lookback_days: usize, min_rate_of_change: f64) -> Self {
        Self {
            name: "RangeStabilityFilter",
            lookback_days,
            min_rate_of_change,
        }
    }

    pub fn volatility(volatility_over_days: usize, min_volatility: f64) -> Self {
        Self {
            name: "VolatilityFilter",
            ..Self::new(volatility_over_days, min_volatility)
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn days_needed(&self) -> usize {
        self.lookback_days
    }

    pub fn filter(&self, pairs: &[String], ctx: &PairlistContext<'_>) -> Result<Vec<String>> {
        require_daily_candles(self.name, pairs, ctx)?;

        Ok(pairs
            .iter()
            .filter(|pair| {
                let candles = ctx.daily_candles.get(*pair).map_or(&[][..], Vec::as_slice);
                let recent = &candles[candles.len().saturating_sub(self.lookback_days)..];
                let Some(change) = rate_of_change(recent) else {
                    tracing::info!(pair = %pair, stage = self.name, "Removed from whitelist: no daily candles");
                    return false;
                };
                if change < self.min_rate_of_change {
                    tracing::info!(
                        pair = %pair,
                        stage = self.name,
                        change = change,
                        "Removed from whitelist: range below {:.2}% over {} days",
                        self.min_rate_of_change * 100.0,
                        self.lookback_days
                    );
                    return false;
                }
                true
            })
            .cloned()
            .collect())
    }
}

/// `(highest high - lowest low) / lowest low`, or 0 when the low is not positive
fn rate_of_change(candles: &[Candle]) -> Option<f64> {
    if candles.is_empty() {
        return None;
    }
    let high = candles.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let low = candles.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    Some(if low > 0.0 { (high - low) / low } else { 0.0 })
}
