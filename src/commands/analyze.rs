//! Analyze command implementation

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use grid_planner::volatility::AtrAnalysis;
use grid_planner::{
    Config, GridGenerator, GridPlanner, GridType, PlanRequest, RiskPreference,
    StrategyParameters,
};

use super::{load_series, resolve_price};

#[derive(Debug)]
pub struct AnalyzeArgs {
    pub data: PathBuf,
    pub price: Option<f64>,
    pub capital: Option<f64>,
    pub grid_type: Option<GridType>,
    pub risk: Option<RiskPreference>,
    pub adjustment: Option<f64>,
    pub json: bool,
}

pub fn run(config: &Config, args: AnalyzeArgs) -> Result<()> {
    info!("Starting analysis");

    let series = load_series(&args.data)?;
    let price = resolve_price(&series, args.price);

    let mut request = PlanRequest::from_defaults(&config.defaults, price);
    if let Some(capital) = args.capital {
        info!("Overriding total capital to: {:.2}", capital);
        request.total_capital = capital;
    }
    if let Some(grid_type) = args.grid_type {
        request.grid_type = grid_type;
    }
    if let Some(risk) = args.risk {
        request.risk_preference = risk;
    }
    if let Some(adjustment) = args.adjustment {
        request.adjustment_coefficient = adjustment;
    }

    let planner = GridPlanner::from_config(config);
    let plan = planner.plan(&series, &request)?;

    if args.json {
        let json = serde_json::to_string_pretty(&plan).context("Failed to serialize result")?;
        println!("{}", json);
    } else {
        let analysis = planner.engine().analyze(&series);
        let spacing = request
            .grid_type
            .generator()
            .spacing_from_volatility(&series.closes(), plan.volatility.annualized_volatility);
        print_report(&plan, &analysis, spacing, request.total_capital);
    }

    Ok(())
}

fn print_report(
    plan: &StrategyParameters,
    analysis: &AtrAnalysis,
    volatility_spacing: f64,
    total_capital: f64,
) {
    let vol = &plan.volatility;
    let alloc = &plan.fund_allocation;

    println!("\n{}", "=".repeat(60));
    println!("GRID STRATEGY PARAMETERS");
    println!("{}", "=".repeat(60));
    println!("Current Price:      {:.3}", plan.current_price);
    println!("Risk Preference:    {}", plan.risk_preference);
    println!("Adjustment:         {:.2}", plan.adjustment_coefficient);

    println!("\nVOLATILITY");
    println!("{}", "-".repeat(60));
    println!("ATR:                {:.4}", vol.atr);
    println!("ATR Ratio:          {:.2}%", vol.atr_pct);
    println!("Annual Volatility:  {:.2}%", vol.annualized_volatility * 100.0);
    println!("ADX:                {:.2}", vol.adx);
    println!(
        "ATR Ratio Range:    {:.2}% - {:.2}% (avg {:.2}%, {} bars)",
        analysis.min_atr_ratio * 100.0,
        analysis.max_atr_ratio * 100.0,
        analysis.avg_atr_ratio * 100.0,
        analysis.period
    );
    if let Some(trend) = &analysis.trend {
        println!(
            "ATR Trend:          {:?} ({:.1}%)",
            trend.direction,
            trend.strength * 100.0
        );
    }
    println!(
        "Amplitude:          {:?} ({}/35)",
        plan.amplitude, plan.amplitude_score
    );

    println!("\nGRID");
    println!("{}", "-".repeat(60));
    println!(
        "Price Range:        {:.3} - {:.3} (±{:.2}%)",
        plan.price_range.lower,
        plan.price_range.upper,
        plan.price_range.range_ratio * 100.0
    );
    println!("Grid Type:          {}", plan.grid.grid_type);
    println!("Recommended Type:   {}", plan.recommended_grid_type);
    println!(
        "Step:               {:.3} ({:.2}%)",
        plan.grid.step_size,
        plan.grid.step_ratio * 100.0
    );
    println!("Volatility Spacing: {:.3}", volatility_spacing);
    println!("Grid Count:         {}", plan.grid.grid_count);
    println!("Levels:             {}", plan.levels.len());

    println!("\nFUND ALLOCATION ({})", alloc.calculation_method);
    println!("{}", "-".repeat(60));
    println!("Total Capital:      {:.2}", total_capital);
    println!(
        "Base Position:      {:.2} ({:.1}%)",
        alloc.base_position_amount,
        alloc.base_position_ratio * 100.0
    );
    println!("Grid Trading:       {:.2}", alloc.grid_trading_amount);
    println!("Reserve:            {:.2}", alloc.reserve_amount);
    println!("Quantity per Trade: {}", alloc.single_trade_quantity);
    println!("Buy Grid Fund:      {:.2}", alloc.total_buy_grid_fund);
    println!(
        "Utilization:        {:.1}%",
        alloc.grid_fund_utilization_rate * 100.0
    );
    println!("Profit per Trade:   {:.2}", alloc.expected_profit_per_trade);
    println!(
        "Safety Ratio:       {:.2}% ({})",
        alloc.safety_ratio * 100.0,
        if alloc.extreme_case_safe { "safe" } else { "UNSAFE" }
    );
    if let Some(reason) = &alloc.fallback_reason {
        println!("Fallback Reason:    {}", reason);
    }
    println!(
        "Suggested Base:     {:.1}%",
        plan.suggested_base_position_ratio * 100.0
    );

    if !alloc.grid_funds.is_empty() {
        println!("\n{:<6} {:>10} {:>6} {:>10} {:>14}", "Level", "Price", "Side", "Shares", "Fund");
        println!("{}", "-".repeat(60));
        for fund in &alloc.grid_funds {
            let side = if fund.is_buy_level {
                "BUY"
            } else if fund.price > plan.current_price {
                "SELL"
            } else {
                "-"
            };
            println!(
                "{:<6} {:>10.3} {:>6} {:>10} {:>14.2}",
                fund.level, fund.price, side, fund.shares, fund.allocated_fund
            );
        }
    }
    println!("{}", "=".repeat(60));
}
