use super::{require_tickers, PairlistContext};
use crate::config::{VolumePairListConfig, VolumeSortKey};
use crate::error::Result;
use crate::models::Ticker;

/// Ranks pairs by a volume metric and keeps the top `number_assets`
#[derive(Debug, Clone)]
pub struct VolumePairList {
    config: VolumePairListConfig,
    stake_currency: String,
}

impl VolumePairList {
    pub fn new(config: VolumePairListConfig, stake_currency: &str) -> Self {
        Self {
            config,
            stake_currency: stake_currency.to_string(),
        }
    }

    fn metric(&self, ticker: &Ticker) -> Option<f64> {
        match self.config.sort_key {
            VolumeSortKey::QuoteVolume => ticker.quote_volume,
            VolumeSortKey::BidVolume => ticker.bid_volume,
            VolumeSortKey::AskVolume => ticker.ask_volume,
        }
    }

    /// Leading position: every active market quoted in the stake currency
    pub fn generate(&self, ctx: &PairlistContext<'_>) -> Result<Vec<String>> {
        let candidates: Vec<String> = ctx
            .markets
            .values()
            .filter(|m| m.active && m.quote == self.stake_currency)
            .map(|m| m.pair.clone())
            .collect();
        self.rank(&candidates, ctx)
    }

    /// Non-leading position: reorder and truncate the incoming list only
    pub fn filter(&self, pairs: &[String], ctx: &PairlistContext<'_>) -> Result<Vec<String>> {
        self.rank(pairs, ctx)
    }

    fn rank(&self, pairs: &[String], ctx: &PairlistContext<'_>) -> Result<Vec<String>> {
        require_tickers("VolumePairList", pairs, ctx)?;

        let mut ranked: Vec<(&String, f64)> = pairs
            .iter()
            .filter_map(|pair| {
                let value = ctx.tickers.get(pair).and_then(|t| self.metric(t));
                match value {
                    Some(v) if v.is_finite() && v > self.config.min_value => Some((pair, v)),
                    _ => {
                        tracing::debug!(pair = %pair, "Dropped by volume ranking");
                        None
                    }
                }
            })
            .collect();

        // Stable: equal volumes keep their incoming order
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(self.config.number_assets);

        Ok(ranked.into_iter().map(|(pair, _)| pair.clone()).collect())
    }
}
