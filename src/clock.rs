//! Time-window and percentage helpers shared by the decision components.
//!
//! Everything here is a pure function of its arguments; callers pass `now`
//! explicitly so live, dry-run and backtest rounds see identical results.

use chrono::{DateTime, Duration, Utc};

/// Has `window` elapsed between `since` and `now`? Inclusive at the boundary.
pub fn has_elapsed(since: DateTime<Utc>, window: Duration, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(since) >= window
}

/// Fractional minutes between `since` and `now` (negative if `now` is earlier)
pub fn elapsed_minutes(since: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    now.signed_duration_since(since).num_milliseconds() as f64 / 60_000.0
}

/// Simple fractional return from `from` to `to` (0.05 = +5%)
pub fn pct_change(from: f64, to: f64) -> f64 {
    to / from - 1.0
}
