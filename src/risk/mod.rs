// Risk management module
pub mod roi;
pub mod stoploss;

pub use roi::{RoiDecision, RoiTable, FORCE_EXIT_SENTINEL};
pub use stoploss::{StopUpdate, StoplossPolicy, StoplossState};
