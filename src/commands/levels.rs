//! Levels command implementation

use anyhow::Result;
use tracing::info;

use grid_planner::grid::geometric;
use grid_planner::{GridGenerator, GridType};

pub fn run(lower: f64, upper: f64, step: f64, base: f64, grid_type: GridType) -> Result<()> {
    info!(
        "Generating {} levels over [{}, {}] with step {} around {}",
        grid_type, lower, upper, step, base
    );

    let generator = grid_type.generator();
    let levels = generator.levels(lower, upper, step, base);
    let count = generator.grid_count(lower, upper, step, base);

    println!("\n{}", "=".repeat(60));
    println!("{} GRID LEVELS", grid_type.as_str().to_uppercase());
    println!("{}", "=".repeat(60));
    println!("Advisory Count:     {}", count);
    println!("Generated Levels:   {}", levels.len());
    if grid_type == GridType::Geometric {
        println!(
            "Ratio for Count:    {:.2}%",
            geometric::step_ratio_for_count(lower, upper, count, base) * 100.0
        );
    }
    match generator.validate(lower, upper, count, base) {
        Ok(()) => println!("Validation:         ok"),
        Err(e) => println!("Validation:         {}", e),
    }
    println!("{}", "-".repeat(60));
    for (i, level) in levels.iter().enumerate() {
        let marker = if (*level - base).abs() < 5e-4 { " <- base" } else { "" };
        println!("{:>4}  {:.3}{}", i + 1, level, marker);
    }
    println!("{}", "=".repeat(60));

    Ok(())
}
