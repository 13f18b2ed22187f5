//! Compare command implementation
//!
//! Plans every grid type × risk preference combination in parallel over one
//! shared price history.

use anyhow::Result;
use itertools::iproduct;
use rayon::prelude::*;
use std::path::PathBuf;
use tracing::{info, warn};

use grid_planner::{Config, GridPlanner, GridType, PlanRequest, RiskPreference};

use super::{load_series, resolve_price};

pub fn run(
    config: &Config,
    data: PathBuf,
    price: Option<f64>,
    capital: Option<f64>,
    adjustment: Option<f64>,
) -> Result<()> {
    info!("Starting comparison");

    let series = load_series(&data)?;
    let price = resolve_price(&series, price);

    let mut base_request = PlanRequest::from_defaults(&config.defaults, price);
    if let Some(capital) = capital {
        base_request.total_capital = capital;
    }
    if let Some(adjustment) = adjustment {
        base_request.adjustment_coefficient = adjustment;
    }
    base_request.validate()?;

    let requests: Vec<PlanRequest> = iproduct!(GridType::ALL, RiskPreference::ALL)
        .map(|(grid_type, risk)| {
            base_request
                .with_grid_type(grid_type)
                .with_risk_preference(risk)
        })
        .collect();
    info!("Planning {} combinations", requests.len());

    let planner = GridPlanner::from_config(config);
    let results: Vec<_> = requests
        .par_iter()
        .map(|request| (request, planner.plan(&series, request)))
        .collect();

    println!("\n{}", "=".repeat(96));
    println!("GRID COMPARISON @ {:.3}, capital {:.2}", price, base_request.total_capital);
    println!("{}", "=".repeat(96));
    println!(
        "{:<11} {:<9} {:>17} {:>8} {:>7} {:>9} {:>8} {:>10} {:>9}",
        "Type", "Risk", "Range", "Step", "Levels", "Qty", "Safety", "Profit", "Method"
    );
    println!("{}", "-".repeat(96));

    for (request, result) in results {
        match result {
            Ok(plan) => {
                let alloc = &plan.fund_allocation;
                println!(
                    "{:<11} {:<9} {:>8.3}-{:<8.3} {:>8.3} {:>7} {:>9} {:>7.1}% {:>10.2} {:>9}",
                    request.grid_type,
                    request.risk_preference,
                    plan.price_range.lower,
                    plan.price_range.upper,
                    plan.grid.step_size,
                    plan.levels.len(),
                    alloc.single_trade_quantity,
                    alloc.safety_ratio * 100.0,
                    alloc.expected_profit_per_trade,
                    alloc.calculation_method
                );
            }
            Err(e) => {
                warn!(
                    "{} / {} failed: {}",
                    request.grid_type, request.risk_preference, e
                );
            }
        }
    }
    println!("{}", "=".repeat(96));

    Ok(())
}
