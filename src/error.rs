use thiserror::Error;

/// Result type alias used across the engine
pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine error taxonomy
///
/// - `Configuration` is fatal at startup and never recovered silently.
/// - `DataUnavailable` and `StageFailed` are local to one round: the affected
///   pair, position or stage is skipped and retried on the next round.
/// - `InvariantViolation` is a programming defect and must surface loudly.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid or inconsistent configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Ticker, order book or market metadata missing for a pair this round
    #[error("data unavailable for {pair}: {reason}")]
    DataUnavailable { pair: String, reason: String },

    /// Internal state broke one of its guarantees
    #[error("invariant violated for {pair}: {detail}")]
    InvariantViolation { pair: String, detail: String },

    /// A pairlist stage could not produce a result this refresh
    #[error("pairlist stage {stage} failed: {reason}")]
    StageFailed { stage: String, reason: String },
}

impl EngineError {
    pub fn data_unavailable(pair: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::DataUnavailable {
            pair: pair.into(),
            reason: reason.into(),
        }
    }

    pub fn invariant(pair: impl Into<String>, detail: impl Into<String>) -> Self {
        EngineError::InvariantViolation {
            pair: pair.into(),
            detail: detail.into(),
        }
    }

    /// True for errors that only affect the current round
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::DataUnavailable { .. } | EngineError::StageFailed { .. }
        )
    }
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::Configuration(err.to_string())
    }
}
