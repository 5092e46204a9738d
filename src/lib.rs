// Core modules
pub mod backtest;
pub mod clock;
pub mod config;
pub mod dry_run;
pub mod error;
pub mod execution;
pub mod models;
pub mod pairlist;
pub mod risk;
pub mod strategy;

// Re-export commonly used types
pub use config::{EngineConfig, RunMode};
pub use error::{EngineError, Result};
pub use models::*;
pub use strategy::Strategy;
