use chrono::{DateTime, Duration, Utc};

use super::{PairlistContext, PairlistStage};
use crate::clock;
use crate::error::Result;

#[derive(Debug, Clone)]
struct CacheEntry {
    input: Vec<String>,
    output: Vec<String>,
    refreshed_at: DateTime<Utc>,
}

/// A stage together with its own result cache
///
/// A cached result is reused only while it is younger than `refresh_period`
/// and the stage sees exactly the same input as when it was computed.
pub struct CachedStage {
    stage: PairlistStage,
    refresh_period: Duration,
    entry: Option<CacheEntry>,
}

impl CachedStage {
    pub fn new(stage: PairlistStage, refresh_period_secs: u64) -> Self {
        let refresh_period = i64::try_from(refresh_period_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        Self {
            stage,
            refresh_period,
            entry: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.stage.name()
    }

    pub fn daily_candle_days(&self) -> Option<usize> {
        self.stage.daily_candle_days()
    }

    fn lookup(&self, input: &[String], now: DateTime<Utc>) -> Option<&[String]> {
        let entry = self.entry.as_ref()?;
        let fresh = !clock::has_elapsed(entry.refreshed_at, self.refresh_period, now);
        (fresh && entry.input == input).then_some(entry.output.as_slice())
    }

    fn store(&mut self, input: &[String], output: &[String], now: DateTime<Utc>) {
        self.entry = Some(CacheEntry {
            input: input.to_vec(),
            output: output.to_vec(),
            refreshed_at: now,
        });
    }

    /// Run as the leading stage
    pub fn generate(&mut self, ctx: &PairlistContext<'_>, now: DateTime<Utc>) -> Result<Vec<String>> {
        if let Some(cached) = self.lookup(&[], now) {
            tracing::debug!(stage = self.name(), "Using cached pairlist");
            return Ok(cached.to_vec());
        }
        let output = self.stage.generate(ctx)?;
        self.store(&[], &output, now);
        Ok(output)
    }

    /// Run as a filtering stage
    pub fn filter(
        &mut self,
        input: &[String],
        ctx: &PairlistContext<'_>,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        if let Some(cached) = self.lookup(input, now) {
            tracing::debug!(stage = self.name(), "Using cached pairlist");
            return Ok(cached.to_vec());
        }
        let output = self.stage.filter(input, ctx)?;
        self.store(input, &output, now);
        Ok(output)
    }

    /// Output to use when this stage fails: the last good result restricted
    /// to the current input, or the input unchanged if there is none
    pub fn fallback(&self, input: &[String]) -> Vec<String> {
        match &self.entry {
            Some(entry) => entry
                .output
                .iter()
                .filter(|pair| input.contains(pair))
                .cloned()
                .collect(),
            None => input.to_vec(),
        }
    }
}
