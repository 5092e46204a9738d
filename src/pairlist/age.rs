use std::collections::HashSet;

use super::{require_daily_candles, PairlistContext};
use crate::error::Result;

/// Drops pairs listed for `min_days_listed` days or fewer
///
/// A pair that passes once is remembered and never fetched again.
#[derive(Debug, Clone)]
pub struct AgeFilter {
    min_days_listed: usize,
    listed_long_enough: HashSet<String>,
}

impl AgeFilter {
    pub fn new(min_days_listed: usize) -> Self {
        Self {
            min_days_listed,
            listed_long_enough: HashSet::new(),
        }
    }

    /// Daily candles needed to decide
    pub fn days_needed(&self) -> usize {
        self.min_days_listed + 1
    }

    pub fn filter(&mut self, pairs: &[String], ctx: &PairlistContext<'_>) -> Result<Vec<String>> {
        let unchecked = pairs.iter().any(|p| !self.listed_long_enough.contains(p));
        if unchecked {
            require_daily_candles("AgeFilter", pairs, ctx)?;
        }

        let mut kept = Vec::with_capacity(pairs.len());
        for pair in pairs {
            if self.listed_long_enough.contains(pair) {
                kept.push(pair.clone());
                continue;
            }
            let days = ctx.daily_candles.get(pair).map_or(0, Vec::len);
            if days > self.min_days_listed {
                self.listed_long_enough.insert(pair.clone());
                kept.push(pair.clone());
            } else {
                tracing::info!(
                    pair = %pair,
                    days = days,
                    "Removed from whitelist: listed for {} days or fewer",
                    self.min_days_listed
                );
            }
        }
        Ok(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::pairlist::test_support::{daily, pairs, Fixture};

    #[test]
    fn test_young_and_unknown_pairs_dropped() {
        let fixture = Fixture::default()
            .with_daily_candles("ETH/USDT", daily("ETH/USDT", &[(100.0, 90.0); 4]))
            .with_daily_candles("NEW/USDT", daily("NEW/USDT", &[(1.0, 0.9); 3]));

        let mut stage = AgeFilter::new(3);
        let result = stage
            .filter(&pairs(&["NEW/USDT", "ETH/USDT", "NODATA/USDT"]), &fixture.ctx())
            .unwrap();
        assert_eq!(result, pairs(&["ETH/USDT"]));
    }

    #[test]
    fn test_passing_pair_is_remembered() {
        let fixture = Fixture::default()
            .with_daily_candles("ETH/USDT", daily("ETH/USDT", &[(100.0, 90.0); 4]));
        let mut stage = AgeFilter::new(3);
        assert_eq!(stage.filter(&pairs(&["ETH/USDT"]), &fixture.ctx()).unwrap(), pairs(&["ETH/USDT"]));

        // No candles this time, but the pair was already checked
        let empty = Fixture::default();
        assert_eq!(stage.filter(&pairs(&["ETH/USDT"]), &empty.ctx()).unwrap(), pairs(&["ETH/USDT"]));
        assert!(matches!(
            stage.filter(&pairs(&["ETH/USDT", "SOL/USDT"]), &empty.ctx()),
            Err(EngineError::StageFailed { .. })
        ));
    }
}
