//! Grid Planner
//!
//! Derives grid-trading parameters from a daily price history: an ATR-based
//! trading range and step, arithmetic or geometric price levels, and a
//! capital split between base position, grid trading funds and cash reserve
//! that stays safe if every buy level fills.

pub mod allocation;
pub mod config;
pub mod data;
pub mod estimator;
pub mod grid;
pub mod indicators;
pub mod planner;
pub mod types;
pub mod volatility;

pub use allocation::{AllocationMethod, FundAllocation};
pub use config::Config;
pub use grid::GridGenerator;
pub use planner::{GridPlanner, PlanError, PlanRequest, StrategyParameters};
pub use types::*;
pub use volatility::{VolatilityEngine, VolatilitySnapshot};
