//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files with environment
//! variable overrides. Every section has defaults, so an empty object is a
//! complete configuration.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::volatility::DEFAULT_ATR_PERIOD;
use crate::{GridType, RiskPreference};

pub use crate::allocation::AllocationConfig;

/// Overrides `analysis.atr_period`
pub const ENV_ATR_PERIOD: &str = "GRID_PLANNER_ATR_PERIOD";
/// Overrides `allocation.lot_size`
pub const ENV_LOT_SIZE: &str = "GRID_PLANNER_LOT_SIZE";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub analysis: AnalysisConfig,
    pub allocation: AllocationConfig,
    pub defaults: RequestDefaults,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `GRID_PLANNER_*` environment variables
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_ATR_PERIOD) {
            self.analysis.atr_period = value
                .trim()
                .parse()
                .with_context(|| format!("{} must be an integer, got '{}'", ENV_ATR_PERIOD, value))?;
        }
        if let Some(value) = lookup(ENV_LOT_SIZE) {
            self.allocation.lot_size = value
                .trim()
                .parse()
                .with_context(|| format!("{} must be an integer, got '{}'", ENV_LOT_SIZE, value))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.analysis.atr_period == 0 {
            bail!("analysis.atr_period must be at least 1");
        }

        let alloc = &self.allocation;
        if alloc.lot_size == 0 {
            bail!("allocation.lot_size must be at least 1");
        }
        for (name, value) in [
            ("allocation.reserve_ratio", alloc.reserve_ratio),
            ("allocation.fallback_base_position_ratio", alloc.fallback_base_position_ratio),
            ("allocation.minimal_base_position_ratio", alloc.minimal_base_position_ratio),
        ] {
            if !(0.0..1.0).contains(&value) {
                bail!("{} must be within [0, 1), got {}", name, value);
            }
        }
        if !(alloc.safety_margin > 0.0 && alloc.safety_margin <= 1.0) {
            bail!("allocation.safety_margin must be within (0, 1], got {}", alloc.safety_margin);
        }
        if alloc.reserve_ratio + alloc.minimal_base_position_ratio >= 1.0 {
            bail!("reserve and minimal base position leave no grid capital");
        }
        if alloc.reserve_ratio + alloc.fallback_base_position_ratio >= 1.0 {
            bail!("reserve and fallback base position leave no grid capital");
        }

        let defaults = &self.defaults;
        if !(defaults.total_capital > 0.0) {
            bail!("defaults.total_capital must be positive, got {}", defaults.total_capital);
        }
        if !(0.0..=2.0).contains(&defaults.adjustment_coefficient) {
            bail!(
                "defaults.adjustment_coefficient must be within [0, 2], got {}",
                defaults.adjustment_coefficient
            );
        }
        Ok(())
    }
}

/// Volatility analysis settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Smoothing window for ATR, ATR ratio and ADX, in bars
    pub atr_period: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            atr_period: DEFAULT_ATR_PERIOD,
        }
    }
}

/// Request values used when the caller does not supply them
///
/// Capital and prices are dimensionless; they only need to share a currency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestDefaults {
    pub total_capital: f64,
    pub grid_type: GridType,
    pub risk_preference: RiskPreference,
    pub adjustment_coefficient: f64,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        RequestDefaults {
            total_capital: 100_000.0,
            grid_type: GridType::Arithmetic,
            risk_preference: RiskPreference::Balanced,
            adjustment_coefficient: 1.0,
        }
    }
}
