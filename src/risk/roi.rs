use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{EngineError, Result};

/// Required-profit value meaning "exit after this many minutes regardless of profit"
pub const FORCE_EXIT_SENTINEL: f64 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoiDecision {
    Exit,
    Hold,
}

/// Time-windowed minimum-profit table
///
/// Maps an elapsed-minutes threshold to the profit ratio required to exit.
/// The most recent threshold at or below the elapsed time applies. Before
/// the first threshold nothing is required to hold, so an empty table never
/// exits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct RoiTable {
    entries: BTreeMap<u32, f64>,
}

impl RoiTable {
    /// Build a table, rejecting duplicate thresholds and non-finite ratios
    pub fn new(entries: impl IntoIterator<Item = (u32, f64)>) -> Result<Self> {
        let mut table = BTreeMap::new();
        for (minutes, ratio) in entries {
            if !ratio.is_finite() {
                return Err(EngineError::Configuration(format!(
                    "minimal_roi[{}] must be a finite ratio, got {}",
                    minutes, ratio
                )));
            }
            if table.insert(minutes, ratio).is_some() {
                return Err(EngineError::Configuration(format!(
                    "minimal_roi threshold {} listed twice",
                    minutes
                )));
            }
        }
        Ok(Self { entries: table })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, *v))
    }

    /// Required profit ratio in force after `elapsed_minutes`, if any threshold was reached
    pub fn required_profit(&self, elapsed_minutes: f64) -> Option<f64> {
        if elapsed_minutes < 0.0 {
            return None;
        }
        let reached = elapsed_minutes.floor().min(u32::MAX as f64) as u32;
        self.entries
            .range(..=reached)
            .next_back()
            .map(|(_, ratio)| *ratio)
    }

    pub fn evaluate(&self, elapsed_minutes: f64, profit_ratio: f64) -> RoiDecision {
        match self.required_profit(elapsed_minutes) {
            None => RoiDecision::Hold,
            Some(required) if required <= FORCE_EXIT_SENTINEL => RoiDecision::Exit,
            Some(required) if profit_ratio >= required => RoiDecision::Exit,
            Some(_) => RoiDecision::Hold,
        }
    }
}

/// Stateless ROI check: exit iff the active threshold's requirement is met
pub fn evaluate(table: &RoiTable, elapsed_minutes: f64, profit_ratio: f64) -> RoiDecision {
    table.evaluate(elapsed_minutes, profit_ratio)
}

impl TryFrom<BTreeMap<String, f64>> for RoiTable {
    type Error = EngineError;

    fn try_from(raw: BTreeMap<String, f64>) -> Result<Self> {
        let mut entries = Vec::with_capacity(raw.len());
        for (key, ratio) in raw {
            let minutes = key.trim().parse::<u32>().map_err(|_| {
                EngineError::Configuration(format!(
                    "minimal_roi key '{}' is not a non-negative whole number of minutes",
                    key
                ))
            })?;
            entries.push((minutes, ratio));
        }
        Self::new(entries)
    }
}

impl From<RoiTable> for BTreeMap<String, f64> {
    fn from(table: RoiTable) -> Self {
        table
            .entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RoiTable {
        RoiTable::new([(0, 0.04), (20, 0.02), (30, 0.01), (40, 0.0)]).unwrap()
    }

    #[test]
    fn test_most_recent_threshold_applies() {
        let table = table();
        // Threshold 20 requires 0.02
        assert_eq!(evaluate(&table, 25.0, 0.015), RoiDecision::Hold);
        assert_eq!(evaluate(&table, 25.0, 0.025), RoiDecision::Exit);
        assert_eq!(evaluate(&table, 5.0, 0.03), RoiDecision::Hold);
        assert_eq!(evaluate(&table, 5.0, 0.04), RoiDecision::Exit);
        assert_eq!(evaluate(&table, 45.0, 0.0), RoiDecision::Exit);
        assert_eq!(evaluate(&table, 45.0, -0.001), RoiDecision::Hold);
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        let table = table();
        assert_eq!(table.required_profit(19.99), Some(0.04));
        assert_eq!(table.required_profit(20.0), Some(0.02));
    }

    #[test]
    fn test_force_exit_sentinel() {
        let table = RoiTable::new([(0, FORCE_EXIT_SENTINEL)]).unwrap();
        assert_eq!(evaluate(&table, 1.0, -0.5), RoiDecision::Exit);
    }

    #[test]
    fn test_no_threshold_reached_holds() {
        let table = RoiTable::new([(60, 0.0)]).unwrap();
        assert_eq!(evaluate(&table, 30.0, 1.0), RoiDecision::Hold);
        assert_eq!(evaluate(&RoiTable::default(), 1000.0, 5.0), RoiDecision::Hold);
    }

    #[test]
    fn test_duplicate_threshold_rejected() {
        let result = RoiTable::new([(10, 0.01), (10, 0.02)]);
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }

    #[test]
    fn test_parse_from_string_keys() {
        let mut raw = BTreeMap::new();
        raw.insert("0".to_string(), 0.04);
        raw.insert("20".to_string(), 0.02);
        let table = RoiTable::try_from(raw).unwrap();
        assert_eq!(table.required_profit(21.0), Some(0.02));

        let mut bad = BTreeMap::new();
        bad.insert("-5".to_string(), 0.01);
        assert!(RoiTable::try_from(bad).is_err());

        let mut bad = BTreeMap::new();
        bad.insert("ten".to_string(), 0.01);
        assert!(RoiTable::try_from(bad).is_err());
    }
}
