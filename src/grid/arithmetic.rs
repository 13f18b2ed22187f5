//! Arithmetic grid: constant price difference between adjacent levels

use tracing::{debug, error, info};

use super::{
    clamp_base, clamp_count, close_stats, daily_volatility, finalize_levels, GridGenerator,
    BOUND_EPSILON, DEFAULT_GRID_COUNT, DEFAULT_SPACING, MAX_STEPS_PER_SIDE,
};
use crate::GridType;

/// Suggested spacing bounds, as fractions of the mean close
const MIN_SPACING_RATIO: f64 = 0.001;
const MAX_SPACING_RATIO: f64 = 0.05;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArithmeticGrid;

impl GridGenerator for ArithmeticGrid {
    fn grid_type(&self) -> GridType {
        GridType::Arithmetic
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

        // Levels are base ± k·step rather than accumulated sums
        let up = (1..=MAX_STEPS_PER_SIDE)
            .map(|k| base + k as f64 * step_size)
            .take_while(|&p| p <= price_upper + BOUND_EPSILON);
        let down = (1..=MAX_STEPS_PER_SIDE)
            .map(|k| base - k as f64 * step_size)
            .take_while(|&p| p >= price_lower - BOUND_EPSILON);

        let levels = finalize_levels(up.chain(down), base);
        info!(
            "Arithmetic grid: base {:.3}, step {:.3}, {} levels",
            base,
            step_size,
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

        let upper_grids = ((price_upper - base) / step_size + BOUND_EPSILON).floor() as usize;
        let lower_grids = ((base - price_lower) / step_size + BOUND_EPSILON).floor() as usize;
        debug!("Arithmetic count: {} above, {} below", upper_grids, lower_grids);

        clamp_count(upper_grids.saturating_add(lower_grids))
    }

    fn spacing_from_volatility(&self, closes: &[f64], annualized_volatility: f64) -> f64 {
        let Some((avg_price, span)) = close_stats(closes) else {
            return DEFAULT_SPACING;
        };
        if !(avg_price > 0.0) {
            return DEFAULT_SPACING;
        }

        let base_spacing = avg_price * daily_volatility(annualized_volatility);
        let range_adjustment = span / closes.len() as f64 * 0.1;
        let spacing = base_spacing + range_adjustment;
        if !spacing.is_finite() {
            return DEFAULT_SPACING;
        }

        spacing.clamp(avg_price * MIN_SPACING_RATIO, avg_price * MAX_SPACING_RATIO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{MAX_GRID_COUNT, MIN_GRID_COUNT};
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_ten_to_twenty_by_one() {
        let levels = ArithmeticGrid.levels(10.0, 20.0, 1.0, 15.0);

        assert_eq!(levels.len(), 11);
        let expected: Vec<f64> = (10..=20).map(|v| v as f64).collect();
        assert_eq!(levels, expected);
        for pair in levels.windows(2) {
            assert_abs_diff_eq!(pair[1] - pair[0], 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_fractional_step_spacing() {
        let levels = ArithmeticGrid.levels(8.9, 11.1, 0.12, 10.0);

        assert!(levels.contains(&10.0));
        assert!(levels.windows(2).all(|w| w[0] < w[1]));
        for pair in levels.windows(2) {
            assert_abs_diff_eq!(pair[1] - pair[0], 0.12, epsilon = 0.001);
        }
        assert!(levels.first().is_some_and(|&p| p >= 8.9));
        assert!(levels.last().is_some_and(|&p| p <= 11.1));
    }

    #[test]
    fn test_base_is_clamped_into_range() {
        let levels = ArithmeticGrid.levels(10.0, 12.0, 0.5, 15.0);
        assert_eq!(levels, vec![10.0, 10.5, 11.0, 11.5, 12.0]);
    }

    #[test]
    fn test_non_positive_step_degenerates_to_base() {
        assert_eq!(ArithmeticGrid.levels(10.0, 20.0, 0.0, 15.0), vec![15.0]);
        assert_eq!(ArithmeticGrid.levels(10.0, 20.0, -1.0, 15.0), vec![15.0]);
        assert_eq!(ArithmeticGrid.levels(10.0, 20.0, f64::NAN, 15.0), vec![15.0]);
    }

    #[test]
    fn test_grid_count() {
        assert_eq!(ArithmeticGrid.grid_count(10.0, 20.0, 1.0, 15.0), 10);
        assert_eq!(ArithmeticGrid.grid_count(10.0, 20.0, 0.001, 15.0), MAX_GRID_COUNT);
        assert_eq!(ArithmeticGrid.grid_count(10.0, 20.0, 100.0, 15.0), MIN_GRID_COUNT);
        assert_eq!(ArithmeticGrid.grid_count(10.0, 20.0, 0.0, 15.0), DEFAULT_GRID_COUNT);
        assert_eq!(ArithmeticGrid.grid_count(20.0, 10.0, 1.0, 15.0), DEFAULT_GRID_COUNT);
    }

    #[test]
    fn test_grid_count_always_bounded() {
        for step in [1e-6, 0.01, 0.3, 7.0, 1e6] {
            for (lower, upper) in [(0.5, 1.0), (10.0, 20.0), (100.0, 5000.0)] {
                let count = ArithmeticGrid.grid_count(lower, upper, step, (lower + upper) / 2.0);
                assert!((MIN_GRID_COUNT..=MAX_GRID_COUNT).contains(&count));
            }
        }
    }

    #[test]
    fn test_validate_accepts_reasonable_grid() {
        assert!(ArithmeticGrid.validate(8.9, 11.1, 18, 10.0).is_ok());
        assert!(ArithmeticGrid.validate(8.9, 11.1, 1, 10.0).is_err());
    }

    #[test]
    fn test_spacing_from_volatility() {
        assert_abs_diff_eq!(ArithmeticGrid.spacing_from_volatility(&[], 0.3), DEFAULT_SPACING);

        // Flat closes, zero volatility: clamped up to 0.1 % of price
        let flat = vec![10.0; 20];
        assert_abs_diff_eq!(
            ArithmeticGrid.spacing_from_volatility(&flat, 0.0),
            0.01,
            epsilon = 1e-12
        );

        // Extreme volatility: clamped down to 5 % of price
        assert_abs_diff_eq!(
            ArithmeticGrid.spacing_from_volatility(&flat, 10.0),
            0.5,
            epsilon = 1e-12
        );
    }
}
