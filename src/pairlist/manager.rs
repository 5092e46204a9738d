use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};

use super::{CachedStage, PairlistContext, PairlistStage};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

/// Owns the stage chain, the blacklist and the current whitelist
pub struct PairlistManager {
    stages: Vec<CachedStage>,
    blacklist: BTreeSet<String>,
    whitelist: Vec<String>,
    last_refresh: Option<DateTime<Utc>>,
}

impl PairlistManager {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        config.validate()?;

        let stages = config
            .pairlist
            .stages
            .iter()
            .map(|stage| {
                CachedStage::new(
                    PairlistStage::from_config(stage, config),
                    stage.refresh_period(),
                )
            })
            .collect();

        Ok(Self {
            stages,
            blacklist: config.pairlist.blacklist.iter().cloned().collect(),
            whitelist: Vec::new(),
            last_refresh: None,
        })
    }

    /// Whitelist produced by the last successful refresh
    pub fn whitelist(&self) -> &[String] {
        &self.whitelist
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.last_refresh
    }

    pub fn blacklist(&self) -> impl Iterator<Item = &String> {
        self.blacklist.iter()
    }

    pub fn is_blacklisted(&self, pair: &str) -> bool {
        self.blacklist.contains(pair)
    }

    /// Takes effect from the next refresh
    pub fn add_to_blacklist(&mut self, pair: impl Into<String>) {
        let pair = pair.into();
        tracing::info!(pair = %pair, "Added to blacklist");
        self.blacklist.insert(pair);
    }

    pub fn remove_from_blacklist(&mut self, pair: &str) -> bool {
        self.blacklist.remove(pair)
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Longest daily-candle history any stage reads, or `None` if no stage does
    pub fn daily_candle_days(&self) -> Option<usize> {
        self.stages.iter().filter_map(CachedStage::daily_candle_days).max()
    }

    /// Run the pipeline and return the new whitelist
    ///
    /// A failing filter stage falls back to its last good result; a failing
    /// leading stage fails the refresh and leaves the previous whitelist in
    /// place.
    pub fn refresh_pairlist(
        &mut self,
        now: DateTime<Utc>,
        ctx: &PairlistContext<'_>,
    ) -> Result<Vec<String>> {
        let Some((leading, filters)) = self.stages.split_first_mut() else {
            return Err(EngineError::Configuration(
                "pairlist has no stages".to_string(),
            ));
        };

        let mut pairs = leading.generate(ctx, now).map_err(|e| {
            tracing::error!(stage = leading.name(), error = %e, "Leading pairlist stage failed");
            EngineError::StageFailed {
                stage: leading.name().to_string(),
                reason: e.to_string(),
            }
        })?;

        for stage in filters.iter_mut() {
            pairs = match stage.filter(&pairs, ctx, now) {
                Ok(filtered) => filtered,
                Err(e) => {
                    tracing::warn!(
                        stage = stage.name(),
                        error = %e,
                        "Pairlist stage failed, using its previous result"
                    );
                    stage.fallback(&pairs)
                }
            };
        }

        let whitelist = self.finalize(pairs, ctx);

        if whitelist != self.whitelist {
            tracing::info!(
                count = whitelist.len(),
                pairs = ?whitelist,
                "Whitelist updated"
            );
        }
        self.whitelist = whitelist.clone();
        self.last_refresh = Some(now);
        Ok(whitelist)
    }

    /// Dedupe, apply blacklist and market activity, then re-add open-position pairs
    fn finalize(&self, pairs: Vec<String>, ctx: &PairlistContext<'_>) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut result: Vec<String> = pairs
            .into_iter()
            .filter(|pair| seen.insert(pair.clone()))
            .filter(|pair| {
                if self.blacklist.contains(pair) {
                    tracing::debug!(pair = %pair, "Removed blacklisted pair");
                    return false;
                }
                if !ctx.is_active(pair) {
                    tracing::debug!(pair = %pair, "Removed inactive market");
                    return false;
                }
                true
            })
            .collect();

        for pair in ctx.open_pairs {
            if result.contains(pair) {
                continue;
            }
            if self.blacklist.contains(pair) || !ctx.is_active(pair) {
                tracing::warn!(pair = %pair, "Open position pair is blacklisted or inactive, not retained");
                continue;
            }
            tracing::debug!(pair = %pair, "Retaining pair with open position");
            result.push(pair.clone());
        }
        result
    }
}
