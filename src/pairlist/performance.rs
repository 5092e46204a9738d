use serde::{Deserialize, Serialize};

use super::PairlistContext;

/// Realised results for one pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PairPerformance {
    /// Sum of closed-trade profit ratios
    pub profit: f64,
    pub count: usize,
}

/// Orders pairs by past performance, best first
///
/// Pairs without history rank as zero profit and zero trades.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerformanceFilter;

impl PerformanceFilter {
    pub fn filter(&self, pairs: &[String], ctx: &PairlistContext<'_>) -> Vec<String> {
        let mut ranked: Vec<(&String, PairPerformance)> = pairs
            .iter()
            .map(|pair| (pair, ctx.performance.get(pair).copied().unwrap_or_default()))
            .collect();

        ranked.sort_by(|a, b| {
            b.1.profit
                .total_cmp(&a.1.profit)
                .then_with(|| b.1.count.cmp(&a.1.count))
        });
        ranked.into_iter().map(|(pair, _)| pair.clone()).collect()
    }
}
