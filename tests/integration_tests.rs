//! Integration tests for the grid planner
//!
//! These tests verify that all components work together correctly.

use approx::assert_abs_diff_eq;
use chrono::{Duration, NaiveDate};
use rayon::prelude::*;

use grid_planner::allocation::{self, AllocationConfig};
use grid_planner::estimator;
use grid_planner::grid::{ArithmeticGrid, GeometricGrid, MAX_GRID_COUNT, MIN_GRID_COUNT};
use grid_planner::indicators;
use grid_planner::{
    data, AllocationMethod, Config, DataValidationError, GridGenerator, GridPlanner, GridType,
    PlanError, PlanRequest, PriceBar, PriceSeries, RiskPreference,
};

// =============================================================================
// Test Utilities
// =============================================================================

fn start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 2).unwrap()
}

/// Generate mock daily bars with a repeating up/down/up walk
fn generate_mock_bars(count: usize, base_price: f64, volatility: f64) -> Vec<PriceBar> {
    let mut bars = Vec::with_capacity(count);
    let mut price = base_price;

    for i in 0..count {
        let change = if i % 3 == 0 {
            volatility
        } else if i % 3 == 1 {
            -volatility * 0.5
        } else {
            volatility * 0.3
        };

        price += change;
        bars.push(PriceBar::new(
            start_date() + Duration::days(i as i64),
            price - change * 0.3,
            price + volatility * 0.5,
            price - volatility * 0.5,
            price,
            1000.0 + i as f64 * 10.0,
            0.0,
        ));
    }

    bars
}

/// Generate steadily trending bars
fn generate_trending_bars(count: usize, base_price: f64, trend_strength: f64) -> Vec<PriceBar> {
    (0..count)
        .map(|i| {
            let price = base_price + i as f64 * trend_strength;
            let volatility = base_price * 0.02;
            PriceBar::new(
                start_date() + Duration::days(i as i64),
                price - volatility * 0.5,
                price + volatility,
                price - volatility,
                price + volatility * 0.3,
                1000.0,
                0.0,
            )
        })
        .collect()
}

fn mock_series() -> PriceSeries {
    PriceSeries::new(generate_mock_bars(120, 10.0, 0.2)).unwrap()
}

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("grid_planner_{}_{}", std::process::id(), name))
}

// =============================================================================
// End-to-end planning
// =============================================================================

#[test]
fn test_plan_every_combination_holds_invariants() {
    let series = mock_series();
    let price = series.last().close;
    let planner = GridPlanner::default();

    for grid_type in GridType::ALL {
        for risk in RiskPreference::ALL {
            let request = PlanRequest::new(price, 100_000.0)
                .with_grid_type(grid_type)
                .with_risk_preference(risk);
            let plan = planner.plan(&series, &request).unwrap();

            assert!(plan.levels.windows(2).all(|w| w[0] < w[1]));
            assert!(plan.levels.iter().any(|&p| (p - plan.current_price).abs() < 1e-9));
            assert!((MIN_GRID_COUNT..=MAX_GRID_COUNT).contains(&plan.grid.grid_count));
            assert!(plan.price_range.lower > 0.0);
            assert!(plan.price_range.lower < price && price < plan.price_range.upper);

            let alloc = &plan.fund_allocation;
            assert_abs_diff_eq!(alloc.total_allocated(), 100_000.0, epsilon = 1.0);
            assert!(alloc.single_trade_quantity >= 100);
            assert_eq!(alloc.single_trade_quantity % 100, 0);
            if alloc.calculation_method == AllocationMethod::Primary {
                assert!(alloc.extreme_case_safe);
                assert!(alloc.safety_ratio <= 1.0);
            }
        }
    }
}

#[test]
fn test_lower_risk_gives_wider_range_and_step() {
    let series = mock_series();
    let price = series.last().close;
    let planner = GridPlanner::default();

    let plan_for = |risk| {
        planner
            .plan(&series, &PlanRequest::new(price, 100_000.0).with_risk_preference(risk))
            .unwrap()
    };
    let low = plan_for(RiskPreference::Low);
    let high = plan_for(RiskPreference::High);

    assert!(low.price_range.range_ratio > high.price_range.range_ratio);
    assert!(low.grid.step_size >= high.grid.step_size);
}

#[test]
fn test_plan_is_deterministic_across_threads() {
    let series = mock_series();
    let price = series.last().close;
    let planner = GridPlanner::default();
    let request = PlanRequest::new(price, 250_000.0).with_grid_type(GridType::Geometric);

    let expected = planner.plan(&series, &request).unwrap();
    let results: Vec<_> = (0..16)
        .into_par_iter()
        .map(|_| planner.plan(&series, &request).unwrap())
        .collect();

    assert!(results.iter().all(|plan| *plan == expected));
}

#[test]
fn test_plan_serializes_to_json() {
    let series = mock_series();
    let planner = GridPlanner::default();
    let plan = planner
        .plan(&series, &PlanRequest::new(series.last().close, 100_000.0))
        .unwrap();

    let value = serde_json::to_value(&plan).unwrap();
    assert_eq!(value["grid"]["grid_type"], "arithmetic");
    assert_eq!(value["risk_preference"], "balanced");
    assert!(value["fund_allocation"]["calculation_method"].is_string());
    assert!(value["levels"].as_array().is_some_and(|l| !l.is_empty()));
}

#[test]
fn test_invalid_bars_are_rejected() {
    let mut bars = generate_mock_bars(30, 10.0, 0.2);
    bars[5].low = bars[5].high + 1.0;

    let planner = GridPlanner::default();
    let result = planner.plan_from_bars(bars, &PlanRequest::new(10.0, 100_000.0));
    assert!(matches!(
        result,
        Err(PlanError::Data(DataValidationError::HighBelowLow { .. }))
    ));
}

#[test]
fn test_short_history_still_plans() {
    let bars = generate_mock_bars(3, 10.0, 0.2);
    let planner = GridPlanner::default();
    let plan = planner
        .plan_from_bars(bars, &PlanRequest::new(10.3, 50_000.0))
        .unwrap();

    assert!(plan.volatility.atr > 0.0);
    assert_abs_diff_eq!(plan.volatility.adx, 0.0);
}

#[test]
fn test_trending_history_recommends_geometric_inputs() {
    let series = PriceSeries::new(generate_trending_bars(120, 10.0, 0.1)).unwrap();
    let planner = GridPlanner::default();
    let plan = planner
        .plan(&series, &PlanRequest::new(series.last().close, 100_000.0))
        .unwrap();

    // Span of 11.9 over a mean near 16 plus a strong trend
    assert!(plan.volatility.adx >= 25.0);
    assert_eq!(plan.recommended_grid_type, GridType::Geometric);
}

// =============================================================================
// Component scenarios
// =============================================================================

#[test]
fn test_arithmetic_scenario() {
    let levels = GridType::Arithmetic.generator().levels(10.0, 20.0, 1.0, 15.0);
    assert_eq!(levels.len(), 11);
    for pair in levels.windows(2) {
        assert_abs_diff_eq!(pair[1] - pair[0], 1.0, epsilon = 1e-9);
    }
}

#[test]
fn test_generators_hold_spacing_properties() {
    let cases = [(8.0, 12.0, 0.15, 10.0), (45.0, 55.0, 0.4, 50.0), (9.5, 10.5, 0.05, 9.9)];
    for (lower, upper, step, base) in cases {
        let levels = ArithmeticGrid.levels(lower, upper, step, base);
        assert!(levels.contains(&base));
        for pair in levels.windows(2) {
            assert_abs_diff_eq!(pair[1] - pair[0], step, epsilon = 0.001);
        }

        let levels = GeometricGrid.levels(lower, upper, step, base);
        let ratio = 1.0 + GeometricGrid::effective_step_ratio(step, base);
        assert!(levels.contains(&base));
        assert!(levels.iter().all(|&p| p > 0.0));
        for pair in levels.windows(2) {
            assert_abs_diff_eq!(pair[1] / pair[0], ratio, epsilon = 0.001);
        }
    }
}

#[test]
fn test_allocation_scenario() {
    let levels: Vec<f64> = (0..=10).map(|i| grid_planner::round_price(3.0 + i as f64 * 0.1)).collect();
    let allocation = allocation::allocate(100_000.0, &levels, 3.5, &AllocationConfig::default());

    assert!(allocation.extreme_case_safe);
    assert_eq!(allocation.single_trade_quantity % 100, 0);
    assert_abs_diff_eq!(allocation.total_allocated(), 100_000.0, epsilon = 1.0);
}

#[test]
fn test_estimator_scenario() {
    let range = estimator::price_range(10.0, 0.02, RiskPreference::Balanced, 1.0);
    assert_abs_diff_eq!(range.range_ratio, 0.11, epsilon = 1e-12);
    assert_abs_diff_eq!(range.lower, 8.9, epsilon = 1e-9);
    assert_abs_diff_eq!(range.upper, 11.1, epsilon = 1e-9);
}

#[test]
fn test_atr_bounded_by_true_range() {
    for series in [
        generate_mock_bars(200, 50.0, 1.5),
        generate_trending_bars(60, 5.0, -0.02),
    ] {
        let series = PriceSeries::new(series).unwrap();
        let (high, low, close) = (series.highs(), series.lows(), series.closes());
        let tr = indicators::true_range(&high, &low, &close);
        let max_tr = tr.iter().cloned().fold(0.0, f64::max);

        for value in indicators::atr(&high, &low, &close, 14) {
            assert!(value >= 0.0);
            assert!(value <= max_tr + 1e-12);
        }
    }
}

// =============================================================================
// Data loading and configuration
// =============================================================================

#[test]
fn test_load_csv_file_and_plan() {
    let path = temp_path("history.csv");
    let mut contents = String::from("date,open,high,low,close,volume,amount\n");
    for bar in generate_mock_bars(40, 20.0, 0.3) {
        contents.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            bar.date.format("%Y%m%d"),
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume,
            bar.close * bar.volume
        ));
    }
    std::fs::write(&path, contents).unwrap();

    let series = data::load_csv(&path);
    std::fs::remove_file(&path).ok();
    let series = series.unwrap();

    assert_eq!(series.len(), 40);
    assert!(series.last().amount > 0.0);

    let plan = GridPlanner::default()
        .plan(&series, &PlanRequest::new(series.last().close, 80_000.0))
        .unwrap();
    assert!(!plan.levels.is_empty());
}

#[test]
fn test_load_missing_csv_is_error() {
    assert!(data::load_csv(temp_path("does_not_exist.csv")).is_err());
}

#[test]
fn test_config_file_drives_planner() {
    let path = temp_path("config.json");
    std::fs::write(
        &path,
        r#"{ "analysis": { "atr_period": 10 }, "allocation": { "reserve_ratio": 0.1 } }"#,
    )
    .unwrap();

    let config = Config::from_file(&path);
    std::fs::remove_file(&path).ok();
    let config = config.unwrap();

    let planner = GridPlanner::from_config(&config);
    assert_eq!(planner.engine().period(), 10);

    let series = mock_series();
    let plan = planner
        .plan(&series, &PlanRequest::from_defaults(&config.defaults, series.last().close))
        .unwrap();
    assert_abs_diff_eq!(plan.fund_allocation.reserve_amount, 10_000.0, epsilon = 0.01);
}

#[test]
fn test_invalid_config_file_is_error() {
    let path = temp_path("bad_config.json");
    std::fs::write(&path, r#"{ "allocation": { "lot_size": 0 } }"#).unwrap();

    let result = Config::from_file(&path);
    std::fs::remove_file(&path).ok();
    assert!(result.is_err());
}
