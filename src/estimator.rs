//! Range and step estimation
//!
//! Maps an ATR ratio and a trading-frequency preference to a price range and
//! an absolute grid step. Each preference has a default multiplier around a
//! neutral midpoint; the adjustment coefficient scales how far the three
//! preferences spread from that midpoint:
//!
//! ```text
//! multiplier = midpoint + (default - midpoint) * coefficient
//! ```
//!
//! Estimation never blocks the pipeline: invalid inputs are logged and a
//! fixed default range or step is returned instead.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::RiskPreference;

/// Adjustment coefficient bounds
pub const MIN_ADJUSTMENT_COEFFICIENT: f64 = 0.0;
pub const MAX_ADJUSTMENT_COEFFICIENT: f64 = 2.0;

/// Half-width of the range used when estimation fails (midpoint 5 × a 2 % ATR ratio)
pub const DEFAULT_RANGE_RATIO: f64 = 0.10;

/// Largest half-width accepted; keeps the lower bound strictly positive
pub const MAX_RANGE_RATIO: f64 = 0.95;

/// Step used when estimation fails, as a fraction of price
pub const DEFAULT_STEP_RATIO: f64 = 0.01;

/// Step clamp, as a fraction of price
pub const MIN_STEP_RATIO: f64 = 0.002;
pub const MAX_STEP_RATIO: f64 = 0.15;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EstimationError {
    #[error("current price must be positive and finite, got {0}")]
    InvalidPrice(f64),

    #[error("ATR ratio must be non-negative and finite, got {0}")]
    InvalidAtrRatio(f64),

    #[error("adjustment coefficient must be within [0, 2], got {0}")]
    InvalidCoefficient(f64),
}

/// Default multipliers per preference, anchored around a neutral midpoint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MultiplierTable {
    pub midpoint: f64,
    pub low: f64,
    pub balanced: f64,
    pub high: f64,
}

/// Range half-width as a multiple of the ATR ratio
pub const RANGE_MULTIPLIERS: MultiplierTable = MultiplierTable {
    midpoint: 5.0,
    low: 7.0,
    balanced: 5.5,
    high: 4.0,
};

/// Grid step as a multiple of ATR
pub const STEP_MULTIPLIERS: MultiplierTable = MultiplierTable {
    midpoint: 0.6,
    low: 1.5,
    balanced: 0.6,
    high: 0.35,
};

impl MultiplierTable {
    pub fn default_for(&self, preference: RiskPreference) -> f64 {
        match preference {
            RiskPreference::Low => self.low,
            RiskPreference::Balanced => self.balanced,
            RiskPreference::High => self.high,
        }
    }

    /// Multiplier after scaling the preference's distance from the midpoint
    pub fn effective(&self, preference: RiskPreference, adjustment_coefficient: f64) -> f64 {
        self.midpoint + (self.default_for(preference) - self.midpoint) * adjustment_coefficient
    }
}

/// Trading price range around the current price
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub lower: f64,
    pub upper: f64,
    /// Half-width as a fraction of the current price
    pub range_ratio: f64,
}

impl PriceRange {
    /// Full width divided by the reference price
    pub fn width_ratio(&self, current_price: f64) -> f64 {
        if current_price > 0.0 {
            (self.upper - self.lower) / current_price
        } else {
            0.0
        }
    }
}

/// Absolute grid step and the same step as a fraction of price
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridStep {
    pub size: f64,
    pub ratio: f64,
}

fn check_inputs(
    current_price: f64,
    atr_ratio: f64,
    adjustment_coefficient: f64,
) -> Result<(), EstimationError> {
    if !(current_price.is_finite() && current_price > 0.0) {
        return Err(EstimationError::InvalidPrice(current_price));
    }
    if !(atr_ratio.is_finite() && atr_ratio >= 0.0) {
        return Err(EstimationError::InvalidAtrRatio(atr_ratio));
    }
    if !(MIN_ADJUSTMENT_COEFFICIENT..=MAX_ADJUSTMENT_COEFFICIENT).contains(&adjustment_coefficient)
    {
        return Err(EstimationError::InvalidCoefficient(adjustment_coefficient));
    }
    Ok(())
}

/// Price range without the default substitution
pub fn try_price_range(
    current_price: f64,
    atr_ratio: f64,
    risk_preference: RiskPreference,
    adjustment_coefficient: f64,
) -> Result<PriceRange, EstimationError> {
    check_inputs(current_price, atr_ratio, adjustment_coefficient)?;

    let multiplier = RANGE_MULTIPLIERS.effective(risk_preference, adjustment_coefficient);
    let mut range_ratio = atr_ratio * multiplier;
    if range_ratio > MAX_RANGE_RATIO {
        warn!(
            "Range ratio {:.4} would push the lower bound to zero, capping at {}",
            range_ratio, MAX_RANGE_RATIO
        );
        range_ratio = MAX_RANGE_RATIO;
    }

    Ok(PriceRange {
        lower: current_price * (1.0 - range_ratio),
        upper: current_price * (1.0 + range_ratio),
        range_ratio,
    })
}

/// Trading range `[price × (1 - r), price × (1 + r)]` with `r = atr_ratio × multiplier`
pub fn price_range(
    current_price: f64,
    atr_ratio: f64,
    risk_preference: RiskPreference,
    adjustment_coefficient: f64,
) -> PriceRange {
    match try_price_range(current_price, atr_ratio, risk_preference, adjustment_coefficient) {
        Ok(range) => {
            info!(
                "Price range [{:.3}, {:.3}] from ATR ratio {:.4}, preference {}, adjustment {:.1}",
                range.lower, range.upper, atr_ratio, risk_preference, adjustment_coefficient
            );
            range
        }
        Err(e) => {
            warn!("Price range estimation failed ({}), using ±{:.0}%", e, DEFAULT_RANGE_RATIO * 100.0);
            PriceRange {
                lower: current_price * (1.0 - DEFAULT_RANGE_RATIO),
                upper: current_price * (1.0 + DEFAULT_RANGE_RATIO),
                range_ratio: DEFAULT_RANGE_RATIO,
            }
        }
    }
}

/// Optimal step without the default substitution
pub fn try_optimal_step(
    atr_ratio: f64,
    current_price: f64,
    risk_preference: RiskPreference,
    adjustment_coefficient: f64,
) -> Result<GridStep, EstimationError> {
    check_inputs(current_price, atr_ratio, adjustment_coefficient)?;

    let multiplier = STEP_MULTIPLIERS.effective(risk_preference, adjustment_coefficient);
    let atr_value = atr_ratio * current_price;
    let raw_step = atr_value * multiplier;
    let ratio = (raw_step / current_price).clamp(MIN_STEP_RATIO, MAX_STEP_RATIO);

    Ok(GridStep {
        size: ratio * current_price,
        ratio,
    })
}

/// Grid step of `ATR × multiplier`, clamped to [0.2 %, 15 %] of price
pub fn optimal_step(
    atr_ratio: f64,
    current_price: f64,
    risk_preference: RiskPreference,
    adjustment_coefficient: f64,
) -> GridStep {
    match try_optimal_step(atr_ratio, current_price, risk_preference, adjustment_coefficient) {
        Ok(step) => {
            info!(
                "Grid step {:.3} ({:.2}%) from ATR ratio {:.4}, preference {}",
                step.size,
                step.ratio * 100.0,
                atr_ratio,
                risk_preference
            );
            step
        }
        Err(e) => {
            warn!("Step estimation failed ({}), using {:.0}% of price", e, DEFAULT_STEP_RATIO * 100.0);
            GridStep {
                size: current_price * DEFAULT_STEP_RATIO,
                ratio: DEFAULT_STEP_RATIO,
            }
        }
    }
}

/// Advisory share of capital to hold as a base position
///
/// Starts from a per-preference base and leans heavier for volatile or
/// trending markets. Result is clamped to [10 %, 70 %].
pub fn suggested_base_position_ratio(
    atr_ratio: f64,
    risk_preference: RiskPreference,
    adx: f64,
    annualized_volatility: f64,
) -> f64 {
    let base = match risk_preference {
        RiskPreference::Low => 0.30,
        RiskPreference::Balanced => 0.20,
        RiskPreference::High => 0.10,
    };

    let atr_adjustment = (atr_ratio * 5.0).min(0.15);

    let trend_adjustment = if adx < 20.0 {
        -0.05
    } else if adx < 40.0 {
        0.05
    } else {
        0.10
    };

    let volatility_adjustment = if annualized_volatility > 0.4 {
        0.05
    } else if annualized_volatility < 0.15 {
        -0.05
    } else {
        0.0
    };

    let ratio = base + atr_adjustment + trend_adjustment + volatility_adjustment;
    if ratio.is_finite() {
        ratio.clamp(0.1, 0.7)
    } else {
        0.25
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_balanced_range_scenario() {
        let range = price_range(10.0, 0.02, RiskPreference::Balanced, 1.0);

        assert_abs_diff_eq!(range.range_ratio, 0.11, epsilon = 1e-12);
        assert_abs_diff_eq!(range.lower, 8.9, epsilon = 1e-9);
        assert_abs_diff_eq!(range.upper, 11.1, epsilon = 1e-9);
        assert_abs_diff_eq!(range.width_ratio(10.0), 0.22, epsilon = 1e-9);
    }

    #[test]
    fn test_coefficient_zero_collapses_to_midpoint() {
        for pref in RiskPreference::ALL {
            assert_abs_diff_eq!(RANGE_MULTIPLIERS.effective(pref, 0.0), 5.0);
            assert_abs_diff_eq!(STEP_MULTIPLIERS.effective(pref, 0.0), 0.6);
        }
    }

    #[test]
    fn test_coefficient_scales_spread() {
        assert_abs_diff_eq!(RANGE_MULTIPLIERS.effective(RiskPreference::Low, 1.0), 7.0);
        assert_abs_diff_eq!(RANGE_MULTIPLIERS.effective(RiskPreference::Low, 2.0), 9.0);
        assert_abs_diff_eq!(RANGE_MULTIPLIERS.effective(RiskPreference::High, 2.0), 3.0);
        assert_abs_diff_eq!(
            STEP_MULTIPLIERS.effective(RiskPreference::Low, 0.5),
            1.05,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_step_uses_atr_multiple() {
        let step = optimal_step(0.02, 10.0, RiskPreference::Balanced, 1.0);
        // ATR = 0.2, × 0.6 = 0.12
        assert_abs_diff_eq!(step.size, 0.12, epsilon = 1e-12);
        assert_abs_diff_eq!(step.ratio, 0.012, epsilon = 1e-12);
    }

    #[test]
    fn test_step_is_clamped() {
        let tiny = optimal_step(0.0, 10.0, RiskPreference::High, 1.0);
        assert_abs_diff_eq!(tiny.ratio, MIN_STEP_RATIO);
        assert_abs_diff_eq!(tiny.size, 0.02, epsilon = 1e-12);

        let huge = optimal_step(0.5, 10.0, RiskPreference::Low, 2.0);
        assert_abs_diff_eq!(huge.ratio, MAX_STEP_RATIO);
        assert_abs_diff_eq!(huge.size, 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_inputs_fall_back_to_defaults() {
        assert!(try_price_range(10.0, f64::NAN, RiskPreference::Low, 1.0).is_err());
        assert_eq!(
            try_optimal_step(0.02, 10.0, RiskPreference::Low, 2.5),
            Err(EstimationError::InvalidCoefficient(2.5))
        );

        let range = price_range(10.0, -0.1, RiskPreference::Balanced, 1.0);
        assert_abs_diff_eq!(range.range_ratio, DEFAULT_RANGE_RATIO);
        assert_abs_diff_eq!(range.lower, 9.0, epsilon = 1e-12);
        assert_abs_diff_eq!(range.upper, 11.0, epsilon = 1e-12);

        let step = optimal_step(0.02, 10.0, RiskPreference::Balanced, 3.0);
        assert_abs_diff_eq!(step.ratio, DEFAULT_STEP_RATIO);
        assert_abs_diff_eq!(step.size, 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_extreme_range_keeps_lower_bound_positive() {
        let range = price_range(10.0, 0.3, RiskPreference::Low, 2.0);
        assert_abs_diff_eq!(range.range_ratio, MAX_RANGE_RATIO);
        assert!(range.lower > 0.0);
    }

    #[test]
    fn test_suggested_base_position_ratio() {
        // 0.20 + 0.10 - 0.05 + 0.0
        let ratio = suggested_base_position_ratio(0.02, RiskPreference::Balanced, 15.0, 0.25);
        assert_abs_diff_eq!(ratio, 0.25, epsilon = 1e-12);

        let capped = suggested_base_position_ratio(0.2, RiskPreference::Low, 60.0, 0.9);
        assert_abs_diff_eq!(capped, 0.60, epsilon = 1e-12);

        let floor = suggested_base_position_ratio(0.0, RiskPreference::High, 10.0, 0.05);
        assert_abs_diff_eq!(floor, 0.1, epsilon = 1e-12);
    }
}
