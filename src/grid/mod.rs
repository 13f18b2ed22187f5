//! Grid level generators
//!
//! Two spacing schemes share one contract: given a trading range, a step and
//! an anchor price, produce an ascending, duplicate-free list of 3-decimal
//! prices that always contains the anchor.

pub mod arithmetic;
pub mod geometric;

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::{info, warn};

use crate::indicators::TRADING_DAYS_PER_YEAR;
use crate::{round_price, GridType};

pub use arithmetic::ArithmeticGrid;
pub use geometric::GeometricGrid;

/// Advisory grid count bounds
pub const MIN_GRID_COUNT: usize = 2;
pub const MAX_GRID_COUNT: usize = 160;

/// Count returned when the inputs cannot produce an estimate
pub const DEFAULT_GRID_COUNT: usize = 50;

/// Bounds accepted by parameter validation
pub const MAX_VALID_GRID_COUNT: usize = 200;
pub const MIN_RANGE_TO_BASE_RATIO: f64 = 0.05;
pub const MAX_RANGE_TO_BASE_RATIO: f64 = 1.0;

/// Upper bound on levels generated per side of the anchor
pub(crate) const MAX_STEPS_PER_SIDE: usize = 10_000;

/// Spacing suggestion used when there is no price history
pub const DEFAULT_SPACING: f64 = 0.01;

/// Bound tolerance used while walking away from the anchor
pub(crate) const BOUND_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridParameterError {
    #[error("price upper {upper} must be greater than price lower {lower}")]
    InvertedRange { lower: f64, upper: f64 },

    #[error("base price {base} outside range [{lower}, {upper}]")]
    BaseOutsideRange { base: f64, lower: f64, upper: f64 },

    #[error("grid count {count} outside [{min}, {max}]")]
    GridCountOutOfRange { count: usize, min: usize, max: usize },

    #[error("price range is {ratio:.4} of base price, expected within [{min}, {max}]")]
    RangeRatioOutOfBounds { ratio: f64, min: f64, max: f64 },

    #[error("price lower must be positive for a geometric grid, got {0}")]
    NonPositiveLower(f64),
}

/// Common interface of the arithmetic and geometric generators
pub trait GridGenerator: Send + Sync {
    fn grid_type(&self) -> GridType;

    /// Ascending 3-decimal levels between the bounds, anchored at `base_price`
    fn levels(&self, price_lower: f64, price_upper: f64, step_size: f64, base_price: f64)
        -> Vec<f64>;

    /// Advisory number of levels implied by a step, clamped to [2, 160]
    fn grid_count(
        &self,
        price_lower: f64,
        price_upper: f64,
        step_size: f64,
        base_price: f64,
    ) -> usize;

    /// Independent parameter check; not applied during generation
    fn validate(
        &self,
        price_lower: f64,
        price_upper: f64,
        grid_count: usize,
        base_price: f64,
    ) -> Result<(), GridParameterError> {
        validate_common(price_lower, price_upper, grid_count, base_price)
    }

    /// Step suggestion from recent closes and annualized volatility
    fn spacing_from_volatility(&self, closes: &[f64], annualized_volatility: f64) -> f64;
}

impl GridType {
    /// Generator implementing this spacing scheme
    pub fn generator(&self) -> &'static dyn GridGenerator {
        match self {
            GridType::Arithmetic => &ArithmeticGrid,
            GridType::Geometric => &GeometricGrid,
        }
    }
}

/// Checks shared by both generators
pub(crate) fn validate_common(
    price_lower: f64,
    price_upper: f64,
    grid_count: usize,
    base_price: f64,
) -> Result<(), GridParameterError> {
    if !(price_upper > price_lower) {
        return Err(GridParameterError::InvertedRange {
            lower: price_lower,
            upper: price_upper,
        });
    }
    if !(price_lower..=price_upper).contains(&base_price) {
        return Err(GridParameterError::BaseOutsideRange {
            base: base_price,
            lower: price_lower,
            upper: price_upper,
        });
    }
    if !(MIN_GRID_COUNT..=MAX_VALID_GRID_COUNT).contains(&grid_count) {
        return Err(GridParameterError::GridCountOutOfRange {
            count: grid_count,
            min: MIN_GRID_COUNT,
            max: MAX_VALID_GRID_COUNT,
        });
    }
    let ratio = (price_upper - price_lower) / base_price;
    if !(MIN_RANGE_TO_BASE_RATIO..=MAX_RANGE_TO_BASE_RATIO).contains(&ratio) {
        return Err(GridParameterError::RangeRatioOutOfBounds {
            ratio,
            min: MIN_RANGE_TO_BASE_RATIO,
            max: MAX_RANGE_TO_BASE_RATIO,
        });
    }
    Ok(())
}

/// Clamp the anchor into the range, logging when it moves
pub(crate) fn clamp_base(price_lower: f64, price_upper: f64, base_price: f64) -> f64 {
    if (price_lower..=price_upper).contains(&base_price) {
        return base_price;
    }
    let clamped = base_price.max(price_lower).min(price_upper);
    warn!(
        "Base price {:.3} outside [{:.3}, {:.3}], clamped to {:.3}",
        base_price, price_lower, price_upper, clamped
    );
    clamped
}

pub(crate) fn clamp_count(raw: usize) -> usize {
    let count = raw.clamp(MIN_GRID_COUNT, MAX_GRID_COUNT);
    if count != raw {
        warn!("Grid count adjusted from {} to {}", raw, count);
    }
    count
}

fn milli_key(price: f64) -> i64 {
    (price * 1000.0).round() as i64
}

/// Round to 3 decimals, sort, drop duplicates and keep the anchor
///
/// Any raw price that rounds onto the anchor collapses into the anchor's
/// own rounded value.
pub(crate) fn finalize_levels(raw: impl IntoIterator<Item = f64>, base_price: f64) -> Vec<f64> {
    let base_key = milli_key(round_price(base_price));
    let mut keys: BTreeSet<i64> = raw
        .into_iter()
        .filter(|p| p.is_finite())
        .map(|p| milli_key(round_price(p)))
        .collect();
    keys.insert(base_key);

    keys.into_iter()
        .map(|key| {
            if key == base_key {
                round_price(base_price)
            } else {
                round_price(key as f64 / 1000.0)
            }
        })
        .collect()
}

/// Arithmetic mean, and the (max - min) span, of a close series
pub(crate) fn close_stats(closes: &[f64]) -> Option<(f64, f64)> {
    if closes.is_empty() {
        return None;
    }
    let mean = closes.iter().sum::<f64>() / closes.len() as f64;
    let (min, max) = closes
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &c| (lo.min(c), hi.max(c)));
    Some((mean, max - min))
}

pub(crate) fn daily_volatility(annualized_volatility: f64) -> f64 {
    annualized_volatility / TRADING_DAYS_PER_YEAR.sqrt()
}

/// Thresholds behind the grid-type vote
pub const GEOMETRIC_VOLATILITY_THRESHOLD: f64 = 0.30;
pub const GEOMETRIC_ADX_THRESHOLD: f64 = 25.0;
pub const GEOMETRIC_SPAN_THRESHOLD: f64 = 0.5;

/// Majority vote between arithmetic and geometric spacing
///
/// High volatility, a strong trend and a wide price span each vote for
/// geometric spacing.
pub fn recommend_grid_type(closes: &[f64], annualized_volatility: f64, adx: f64) -> GridType {
    let Some((mean, span)) = close_stats(closes) else {
        return GridType::Arithmetic;
    };
    let span_ratio = if mean > 0.0 { span / mean } else { 0.0 };

    let votes = [
        annualized_volatility > GEOMETRIC_VOLATILITY_THRESHOLD,
        adx >= GEOMETRIC_ADX_THRESHOLD,
        span_ratio > GEOMETRIC_SPAN_THRESHOLD,
    ];
    let geometric_votes = votes.iter().filter(|&&v| v).count();

    let grid_type = if geometric_votes * 2 > votes.len() {
        GridType::Geometric
    } else {
        GridType::Arithmetic
    };
    info!(
        "Recommended {} grid ({}/{} votes for geometric)",
        grid_type,
        geometric_votes,
        votes.len()
    );
    grid_type
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalize_levels_keeps_base_and_dedups() {
        let levels = finalize_levels(vec![10.0004, 9.9996, 11.0, 11.0002, 9.0], 10.0);
        assert_eq!(levels, vec![9.0, 10.0, 11.0]);
    }

    #[test]
    fn test_finalize_levels_with_empty_input() {
        assert_eq!(finalize_levels(Vec::new(), 12.3456), vec![12.346]);
    }

    #[test]
    fn test_validate_common() {
        assert!(validate_common(9.0, 11.0, 20, 10.0).is_ok());
        assert!(matches!(
            validate_common(11.0, 9.0, 20, 10.0),
            Err(GridParameterError::InvertedRange { .. })
        ));
        assert!(matches!(
            validate_common(9.0, 11.0, 20, 12.0),
            Err(GridParameterError::BaseOutsideRange { .. })
        ));
        assert!(matches!(
            validate_common(9.0, 11.0, 201, 10.0),
            Err(GridParameterError::GridCountOutOfRange { .. })
        ));
        assert!(matches!(
            validate_common(9.9, 10.1, 20, 10.0),
            Err(GridParameterError::RangeRatioOutOfBounds { .. })
        ));
        assert!(matches!(
            validate_common(1.0, 19.0, 20, 10.0),
            Err(GridParameterError::RangeRatioOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_generator_dispatch() {
        for grid_type in GridType::ALL {
            assert_eq!(grid_type.generator().grid_type(), grid_type);
        }
    }

    #[test]
    fn test_recommend_grid_type() {
        let calm: Vec<f64> = (0..50).map(|i| 10.0 + (i % 3) as f64 * 0.05).collect();
        assert_eq!(recommend_grid_type(&calm, 0.12, 15.0), GridType::Arithmetic);
        assert_eq!(recommend_grid_type(&calm, 0.45, 30.0), GridType::Geometric);

        let wide: Vec<f64> = (0..50).map(|i| 5.0 + i as f64 * 0.2).collect();
        assert_eq!(recommend_grid_type(&wide, 0.45, 10.0), GridType::Geometric);
        assert_eq!(recommend_grid_type(&[], 0.9, 90.0), GridType::Arithmetic);
    }
}
