//! Geometric grid: constant price ratio between adjacent levels
//!
//! The absolute step is converted into a ratio of the anchor price and kept
//! within [0.1 %, 10 %]. Levels are `base × (1 + r)^k` on both sides.

use tracing::{debug, error, info};

use super::{
    clamp_base, clamp_count, close_stats, daily_volatility, finalize_levels, validate_common,
    GridGenerator, GridParameterError, BOUND_EPSILON, DEFAULT_GRID_COUNT, DEFAULT_SPACING,
    MAX_STEPS_PER_SIDE,
};
use crate::GridType;

pub const MIN_STEP_RATIO: f64 = 0.001;
pub const MAX_STEP_RATIO: f64 = 0.1;
pub const DEFAULT_STEP_RATIO: f64 = 0.01;

const MIN_SPACING_RATIO: f64 = 0.001;
const MAX_SPACING_RATIO: f64 = 0.05;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeometricGrid;

impl GeometricGrid {
    /// Step ratio actually used for a given absolute step and anchor
    pub fn effective_step_ratio(step_size: f64, base_price: f64) -> f64 {
        (step_size / base_price).clamp(MIN_STEP_RATIO, MAX_STEP_RATIO)
    }
}

impl GridGenerator for GeometricGrid {
    fn grid_type(&self) -> GridType {
        GridType::Geometric
    }

    fn levels(
        &self,
        price_lower: f64,
        price_upper: f64,
        step_size: f64,
        base_price: f64,
    ) -> Vec<f64> {
        let base = clamp_base(price_lower, price_upper, base_price);
        if !(step_size.is_finite() && step_size > 0.0) {
            error!("Step size must be positive, got {}", step_size);
            return finalize_levels(Vec::new(), base);
        }
        if !(price_lower > 0.0) {
            error!("Price lower must be positive for a geometric grid, got {}", price_lower);
            return finalize_levels(Vec::new(), base);
        }

        let step_ratio = Self::effective_step_ratio(step_size, base);
        let multiplier = 1.0 + step_ratio;

        let up = (1..=MAX_STEPS_PER_SIDE as i32)
            .map(|k| base * multiplier.powi(k))
            .take_while(|&p| p <= price_upper + BOUND_EPSILON);
        let down = (1..=MAX_STEPS_PER_SIDE as i32)
            .map(|k| base / multiplier.powi(k))
            .take_while(|&p| p >= price_lower - BOUND_EPSILON);

        let levels = finalize_levels(up.chain(down), base);
        info!(
            "Geometric grid: base {:.3}, step {:.3} ({:.2}%), {} levels",
            base,
            step_size,
            step_ratio * 100.0,
            levels.len()
        );
        levels
    }

    fn grid_count(
        &self,
        price_lower: f64,
        price_upper: f64,
        step_size: f64,
        base_price: f64,
    ) -> usize {
        if !(step_size.is_finite() && step_size > 0.0) || !(price_upper > price_lower) {
            error!(
                "Cannot derive grid count from step {} over [{}, {}]",
                step_size, price_lower, price_upper
            );
            return DEFAULT_GRID_COUNT;
        }
        let base = clamp_base(price_lower, price_upper, base_price);
        if !(base > 0.0) {
            return DEFAULT_GRID_COUNT;
        }

        // Count uses the raw ratio; generation clamps it
        let growth = (1.0 + step_size / base).ln();
        let upper_grids = if price_upper > base {
            ((price_upper / base).ln() / growth + BOUND_EPSILON).floor() as usize
        } else {
            0
        };
        let lower_grids = if base > price_lower && price_lower > 0.0 {
            ((base / price_lower).ln() / growth + BOUND_EPSILON).floor() as usize
        } else {
            0
        };
        debug!("Geometric count: {} above, {} below", upper_grids, lower_grids);

        clamp_count(upper_grids.saturating_add(lower_grids))
    }

    fn validate(
        &self,
        price_lower: f64,
        price_upper: f64,
        grid_count: usize,
        base_price: f64,
    ) -> Result<(), GridParameterError> {
        validate_common(price_lower, price_upper, grid_count, base_price)?;
        if price_lower <= 0.0 {
            return Err(GridParameterError::NonPositiveLower(price_lower));
        }
        Ok(())
    }

    fn spacing_from_volatility(&self, closes: &[f64], annualized_volatility: f64) -> f64 {
        let Some((avg_price, span)) = close_stats(closes) else {
            return DEFAULT_SPACING;
        };
        if !(avg_price > 0.0) {
            return DEFAULT_SPACING;
        }

        let range_adjustment = span / closes.len() as f64 / avg_price * 0.1;
        let ratio = daily_volatility(annualized_volatility) + range_adjustment;
        if !ratio.is_finite() {
            return DEFAULT_SPACING;
        }

        avg_price * ratio.clamp(MIN_SPACING_RATIO, MAX_SPACING_RATIO)
    }
}

/// Step ratio that spreads `grid_count` levels over the range
///
/// Averages the relative widths above and below the anchor when both sides
/// exist, otherwise uses the one side. Clamped to [0.1 %, 10 %].
pub fn step_ratio_for_count(
    price_lower: f64,
    price_upper: f64,
    grid_count: usize,
    base_price: f64,
) -> f64 {
    if grid_count == 0 || !(base_price > 0.0) {
        return DEFAULT_STEP_RATIO;
    }
    let count = grid_count as f64;

    let upper_ratio = if price_upper > base_price {
        (price_upper - base_price) / base_price
    } else {
        0.0
    };
    let lower_ratio = if base_price > price_lower {
        (base_price - price_lower) / base_price
    } else {
        0.0
    };

    let step_ratio = match (upper_ratio > 0.0, lower_ratio > 0.0) {
        (true, true) => (upper_ratio + lower_ratio) / 2.0 / (count / 2.0),
        (true, false) => upper_ratio / count,
        (false, true) => lower_ratio / count,
        (false, false) => DEFAULT_STEP_RATIO,
    };

    if step_ratio.is_finite() {
        step_ratio.clamp(MIN_STEP_RATIO, MAX_STEP_RATIO)
    } else {
        DEFAULT_STEP_RATIO
    }
}
