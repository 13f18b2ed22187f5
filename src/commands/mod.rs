//! Subcommand implementations

pub mod analyze;
pub mod compare;
pub mod levels;

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use grid_planner::{Config, PriceSeries};

/// Load the config file, or defaults plus environment overrides
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            let config = Config::from_file(path)?;
            info!("Loaded configuration from: {}", path.display());
            Ok(config)
        }
        None => {
            let mut config = Config::default();
            config.apply_env_overrides()?;
            config.validate()?;
            Ok(config)
        }
    }
}

/// Explicit price, or the last close of the series
pub fn resolve_price(series: &PriceSeries, price: Option<f64>) -> f64 {
    match price {
        Some(p) => p,
        None => {
            let close = series.last().close;
            info!("Using last close {:.3} as current price", close);
            close
        }
    }
}

pub fn load_series(path: &Path) -> Result<PriceSeries> {
    info!("Loading data from: {}", path.display());
    grid_planner::data::load_csv(path)
        .with_context(|| format!("Failed to load price history from {}", path.display()))
}
