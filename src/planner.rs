//! End-to-end strategy planning
//!
//! Volatility engine → range and step estimator → grid generator → fund
//! allocation solver, returning one [`StrategyParameters`] record.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::allocation::{self, AllocationConfig, FundAllocation};
use crate::config::{Config, RequestDefaults};
use crate::estimator::{
    self, PriceRange, MAX_ADJUSTMENT_COEFFICIENT, MIN_ADJUSTMENT_COEFFICIENT,
};
use crate::grid::{self, GeometricGrid, GridGenerator};
use crate::volatility::{AmplitudeRating, VolatilityEngine, VolatilitySnapshot};
use crate::{
    round_price, round_ratio, DataValidationError, GridType, PriceBar, PriceSeries,
    RiskPreference,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error("invalid price data: {0}")]
    Data(#[from] DataValidationError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Caller-supplied scalar inputs of one planning run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanRequest {
    pub current_price: f64,
    pub total_capital: f64,
    pub grid_type: GridType,
    pub risk_preference: RiskPreference,
    pub adjustment_coefficient: f64,
}

impl PlanRequest {
    pub fn new(current_price: f64, total_capital: f64) -> Self {
        Self {
            current_price,
            total_capital,
            grid_type: GridType::default(),
            risk_preference: RiskPreference::default(),
            adjustment_coefficient: 1.0,
        }
    }

    /// Request seeded from configured defaults
    pub fn from_defaults(defaults: &RequestDefaults, current_price: f64) -> Self {
        Self {
            current_price,
            total_capital: defaults.total_capital,
            grid_type: defaults.grid_type,
            risk_preference: defaults.risk_preference,
            adjustment_coefficient: defaults.adjustment_coefficient,
        }
    }

    pub fn with_grid_type(mut self, grid_type: GridType) -> Self {
        self.grid_type = grid_type;
        self
    }

    pub fn with_risk_preference(mut self, risk_preference: RiskPreference) -> Self {
        self.risk_preference = risk_preference;
        self
    }

    pub fn with_adjustment(mut self, adjustment_coefficient: f64) -> Self {
        self.adjustment_coefficient = adjustment_coefficient;
        self
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        if !(self.current_price.is_finite() && self.current_price > 0.0) {
            return Err(PlanError::InvalidRequest(format!(
                "current price must be positive, got {}",
                self.current_price
            )));
        }
        if !(self.total_capital.is_finite() && self.total_capital > 0.0) {
            return Err(PlanError::InvalidRequest(format!(
                "total capital must be positive, got {}",
                self.total_capital
            )));
        }
        if !(MIN_ADJUSTMENT_COEFFICIENT..=MAX_ADJUSTMENT_COEFFICIENT)
            .contains(&self.adjustment_coefficient)
        {
            return Err(PlanError::InvalidRequest(format!(
                "adjustment coefficient must be within [{}, {}], got {}",
                MIN_ADJUSTMENT_COEFFICIENT, MAX_ADJUSTMENT_COEFFICIENT, self.adjustment_coefficient
            )));
        }
        Ok(())
    }
}

/// Grid spacing chosen for the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSummary {
    pub grid_type: GridType,
    /// Advisory count in [2, 160]; the level list may differ
    pub grid_count: usize,
    pub step_size: f64,
    /// Step as a fraction of price; the clamped ratio for geometric grids
    pub step_ratio: f64,
}

/// Complete output of one planning run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyParameters {
    pub current_price: f64,
    pub price_range: PriceRange,
    pub grid: GridSummary,
    pub levels: Vec<f64>,
    pub fund_allocation: FundAllocation,
    pub volatility: VolatilitySnapshot,
    pub risk_preference: RiskPreference,
    pub adjustment_coefficient: f64,
    pub amplitude: AmplitudeRating,
    pub amplitude_score: u32,
    pub recommended_grid_type: GridType,
    pub suggested_base_position_ratio: f64,
}

/// Stateless pipeline driver; safe to share across threads
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridPlanner {
    engine: VolatilityEngine,
    allocation: AllocationConfig,
}

impl GridPlanner {
    pub fn new(engine: VolatilityEngine, allocation: AllocationConfig) -> Self {
        Self { engine, allocation }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            VolatilityEngine::new(config.analysis.atr_period),
            config.allocation,
        )
    }

    pub fn engine(&self) -> &VolatilityEngine {
        &self.engine
    }

    pub fn allocation_config(&self) -> &AllocationConfig {
        &self.allocation
    }

    /// Validate raw bars, then plan
    pub fn plan_from_bars(
        &self,
        bars: Vec<PriceBar>,
        request: &PlanRequest,
    ) -> Result<StrategyParameters, PlanError> {
        let series = PriceSeries::new(bars)?;
        self.plan(&series, request)
    }

    pub fn plan(
        &self,
        series: &PriceSeries,
        request: &PlanRequest,
    ) -> Result<StrategyParameters, PlanError> {
        request.validate()?;
        let price = request.current_price;
        let preference = request.risk_preference;
        let coefficient = request.adjustment_coefficient;

        let volatility = self.engine.snapshot(series);

        let range = estimator::price_range(price, volatility.atr_ratio, preference, coefficient);
        let step = estimator::optimal_step(volatility.atr_ratio, price, preference, coefficient);

        let generator = request.grid_type.generator();
        let grid_count = generator.grid_count(range.lower, range.upper, step.size, price);
        let levels = generator.levels(range.lower, range.upper, step.size, price);
        let step_ratio = match request.grid_type {
            GridType::Arithmetic => step.ratio,
            GridType::Geometric => GeometricGrid::effective_step_ratio(step.size, price),
        };

        let fund_allocation =
            allocation::allocate(request.total_capital, &levels, price, &self.allocation);

        let closes = series.closes();
        let amplitude = AmplitudeRating::from_atr_ratio(volatility.atr_ratio);
        let recommended_grid_type = grid::recommend_grid_type(
            &closes,
            volatility.annualized_volatility,
            volatility.adx,
        );
        let suggested_base_position_ratio = estimator::suggested_base_position_ratio(
            volatility.atr_ratio,
            preference,
            volatility.adx,
            volatility.annualized_volatility,
        );

        info!(
            "Planned {} grid at {:.3}: {} levels in [{:.3}, {:.3}], {} allocation",
            request.grid_type,
            price,
            levels.len(),
            range.lower,
            range.upper,
            fund_allocation.calculation_method
        );

        Ok(StrategyParameters {
            current_price: round_price(price),
            price_range: PriceRange {
                lower: round_price(range.lower),
                upper: round_price(range.upper),
                range_ratio: round_ratio(range.range_ratio),
            },
            grid: GridSummary {
                grid_type: request.grid_type,
                grid_count,
                step_size: round_price(step.size),
                step_ratio: round_ratio(step_ratio),
            },
            levels,
            fund_allocation,
            volatility,
            risk_preference: preference,
            adjustment_coefficient: coefficient,
            amplitude,
            amplitude_score: amplitude.score(),
            recommended_grid_type,
            suggested_base_position_ratio: round_ratio(suggested_base_position_ratio),
        })
    }
}
