//! Grid planner - main entry point
//!
//! This binary provides three subcommands:
//! - analyze: Plan a grid strategy from a price history
//! - compare: Plan every grid type and risk preference side by side
//! - levels: Generate grid levels from explicit bounds and step

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use grid_planner::{GridType, RiskPreference};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "grid-planner")]
#[command(about = "Volatility-driven grid trading parameters and fund allocation", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (defaults apply when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Plan a grid strategy from a daily OHLC CSV file
    Analyze {
        /// CSV file with date,open,high,low,close,volume[,amount]
        #[arg(short, long)]
        data: PathBuf,

        /// Current price (defaults to the last close)
        #[arg(short, long)]
        price: Option<f64>,

        /// Total capital
        #[arg(long)]
        capital: Option<f64>,

        /// Grid type (arithmetic or geometric)
        #[arg(short, long)]
        grid_type: Option<GridType>,

        /// Risk preference (low, balanced or high)
        #[arg(short, long)]
        risk: Option<RiskPreference>,

        /// Adjustment coefficient in [0, 2]
        #[arg(short, long)]
        adjustment: Option<f64>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compare every grid type and risk preference
    Compare {
        /// CSV file with date,open,high,low,close,volume[,amount]
        #[arg(short, long)]
        data: PathBuf,

        /// Current price (defaults to the last close)
        #[arg(short, long)]
        price: Option<f64>,

        /// Total capital
        #[arg(long)]
        capital: Option<f64>,

        /// Adjustment coefficient in [0, 2]
        #[arg(short, long)]
        adjustment: Option<f64>,
    },

    /// Generate grid levels from explicit parameters
    Levels {
        /// Lower price bound
        #[arg(long)]
        lower: f64,

        /// Upper price bound
        #[arg(long)]
        upper: f64,

        /// Absolute step size
        #[arg(long)]
        step: f64,

        /// Anchor price
        #[arg(long)]
        base: f64,

        /// Grid type (arithmetic or geometric)
        #[arg(short, long, default_value = "arithmetic")]
        grid_type: GridType,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    // Create logs directory
    std::fs::create_dir_all("logs")?;

    // Create log file with naming pattern: {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_writer(std::io::stderr)
        .with_ansi(true);

    // File layer - same format but without ANSI colors
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Analyze { .. } => "analyze",
        Commands::Compare { .. } => "compare",
        Commands::Levels { .. } => "levels",
    };

    setup_logging(cli.verbose, command_name)?;

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Analyze {
            data,
            price,
            capital,
            grid_type,
            risk,
            adjustment,
            json,
        } => commands::analyze::run(
            &config,
            commands::analyze::AnalyzeArgs {
                data,
                price,
                capital,
                grid_type,
                risk,
                adjustment,
                json,
            },
        ),

        Commands::Compare {
            data,
            price,
            capital,
            adjustment,
        } => commands::compare::run(&config, data, price, capital, adjustment),

        Commands::Levels {
            lower,
            upper,
            step,
            base,
            grid_type,
        } => commands::levels::run(lower, upper, step, base, grid_type),
    }
}
