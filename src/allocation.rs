//! Fund allocation solver
//!
//! Splits total capital into a base position, grid trading capital and a
//! cash reserve, and derives one per-trade share quantity for every grid
//! level. Three tiers are tried in order, each simpler and safer than the
//! last:
//!
//! 1. **Primary**: demand-driven. The quantity is sized so that filling every
//!    buy level while holding one lot per sell level fits in the available
//!    capital:
//!    ```text
//!    factor   = Σ buy_prices + sell_count × current_price
//!    quantity = floor(available / factor / lot) × lot
//!    ```
//! 2. **Fallback**: fixed 30 % base position, quantity sized from the buy
//!    levels alone.
//! 3. **Minimal**: fixed 20 % base position, one lot, no per-level funds.
//!
//! Tiers 1 and 2 return [`AllocationError`] when inapplicable; [`allocate`]
//! drives the chain. Tier 3 cannot fail.
//!
//! All amounts share the currency of the price levels.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{round_amount, round_price, round_ratio};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AllocationError {
    #[error("no grid levels to allocate")]
    NoLevels,

    #[error("no buy levels below current price {0}")]
    EmptyBuySide(f64),

    #[error("no sell levels above current price {0}")]
    EmptySellSide(f64),

    #[error("total capital must be positive and finite, got {0}")]
    InvalidCapital(f64),

    #[error("current price must be positive and finite, got {0}")]
    InvalidPrice(f64),

    #[error("grid level must be positive and finite, got {0}")]
    InvalidLevel(f64),

    #[error("grid capital {0:.2} leaves nothing to trade")]
    NoGridCapital(f64),

    #[error("one lot still needs {safety_ratio:.4} of available capital")]
    MinimumLotUnsafe { safety_ratio: f64 },

    #[error("non-finite intermediate value in {0}")]
    NonFinite(&'static str),
}

/// Tunables shared by the three tiers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// Share of total capital held back as cash
    pub reserve_ratio: f64,
    /// Target safety ratio after shrinking an oversized quantity
    pub safety_margin: f64,
    /// Minimum tradable share increment
    pub lot_size: u64,
    pub fallback_base_position_ratio: f64,
    pub minimal_base_position_ratio: f64,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            reserve_ratio: 0.05,
            safety_margin: 0.95,
            lot_size: 100,
            fallback_base_position_ratio: 0.30,
            minimal_base_position_ratio: 0.20,
        }
    }
}

impl AllocationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve_ratio(mut self, ratio: f64) -> Self {
        self.reserve_ratio = ratio;
        self
    }

    pub fn safety_margin(mut self, margin: f64) -> Self {
        self.safety_margin = margin;
        self
    }

    pub fn lot_size(mut self, lot_size: u64) -> Self {
        self.lot_size = lot_size;
        self
    }

    fn lot(&self) -> u64 {
        self.lot_size.max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationMethod {
    Primary,
    Fallback,
    Minimal,
}

impl AllocationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationMethod::Primary => "primary",
            AllocationMethod::Fallback => "fallback",
            AllocationMethod::Minimal => "minimal",
        }
    }
}

impl std::fmt::Display for AllocationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Capital committed at one grid level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridLevelFund {
    /// 1-based position in the ascending level list
    pub level: usize,
    pub price: f64,
    /// Zero for levels at or above the current price
    pub shares: u64,
    pub allocated_fund: f64,
    pub is_buy_level: bool,
}

/// Intermediate figures of the primary tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationDetails {
    pub buy_grids: usize,
    pub sell_grids: usize,
    pub base_position_shares: u64,
    pub fund_requirement_factor: f64,
    pub total_required_fund: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundAllocation {
    pub base_position_amount: f64,
    pub grid_trading_amount: f64,
    pub reserve_amount: f64,
    pub grid_funds: Vec<GridLevelFund>,
    pub total_buy_grid_fund: f64,
    pub grid_fund_utilization_rate: f64,
    pub expected_profit_per_trade: f64,
    pub grid_count: usize,
    pub base_position_ratio: f64,
    pub single_trade_quantity: u64,
    pub safety_ratio: f64,
    pub extreme_case_safe: bool,
    pub calculation_method: AllocationMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<AllocationDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

impl FundAllocation {
    /// Base position + grid capital + reserve
    pub fn total_allocated(&self) -> f64 {
        self.base_position_amount + self.grid_trading_amount + self.reserve_amount
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

fn check_inputs(
    total_capital: f64,
    levels: &[f64],
    current_price: f64,
) -> Result<(), AllocationError> {
    if !(total_capital.is_finite() && total_capital > 0.0) {
        return Err(AllocationError::InvalidCapital(total_capital));
    }
    if !(current_price.is_finite() && current_price > 0.0) {
        return Err(AllocationError::InvalidPrice(current_price));
    }
    if let Some(&bad) = levels.iter().find(|p| !(p.is_finite() && **p > 0.0)) {
        return Err(AllocationError::InvalidLevel(bad));
    }
    Ok(())
}

/// Floor to whole lots, never below `min_lots`
fn floor_to_lots(shares: f64, lot: u64, min_lots: u64) -> u64 {
    let lots = (shares / lot as f64).floor();
    let lots = if lots.is_finite() && lots > 0.0 { lots as u64 } else { 0 };
    lots.max(min_lots) * lot
}

/// Shrink an oversized quantity to `margin / safety_ratio` of itself
fn shrink_quantity(quantity: u64, safety_ratio: f64, margin: f64, lot: u64) -> u64 {
    let adjusted = quantity as f64 * margin / safety_ratio;
    floor_to_lots(adjusted, lot, 1)
}

fn level_funds(levels: &[f64], current_price: f64, quantity: u64) -> Vec<GridLevelFund> {
    levels
        .iter()
        .enumerate()
        .map(|(i, &price)| {
            let is_buy_level = price < current_price;
            let shares = if is_buy_level { quantity } else { 0 };
            GridLevelFund {
                level: i + 1,
                price: round_price(price),
                shares,
                allocated_fund: round_amount(shares as f64 * price),
                is_buy_level,
            }
        })
        .collect()
}

/// Quantity × mean spacing between the extreme levels
fn expected_profit(levels: &[f64], quantity: u64) -> f64 {
    if levels.len() < 2 {
        return 0.0;
    }
    let (min, max) = levels
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &p| (lo.min(p), hi.max(p)));
    quantity as f64 * (max - min) / (levels.len() - 1) as f64
}

fn ratio_or_zero(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

// ============================================================================
// Tier 1: primary
// ============================================================================

struct PrimarySizing {
    quantity: u64,
    base_position_shares: u64,
    base_position_amount: f64,
    buy_grid_fund: f64,
    total_required: f64,
    safety_ratio: f64,
}

fn size_primary(
    quantity: u64,
    buy_sum: f64,
    sell_count: usize,
    current_price: f64,
    available: f64,
) -> PrimarySizing {
    let base_position_shares = sell_count as u64 * quantity;
    let base_position_amount = base_position_shares as f64 * current_price;
    let buy_grid_fund = buy_sum * quantity as f64;
    let total_required = base_position_amount + buy_grid_fund;
    PrimarySizing {
        quantity,
        base_position_shares,
        base_position_amount,
        buy_grid_fund,
        total_required,
        safety_ratio: total_required / available,
    }
}

/// Demand-driven allocation
///
/// Fails when either side of the grid is empty, or when even a single lot
/// per level needs more than the available capital.
pub fn primary(
    total_capital: f64,
    levels: &[f64],
    current_price: f64,
    config: &AllocationConfig,
) -> Result<FundAllocation, AllocationError> {
    check_inputs(total_capital, levels, current_price)?;
    if levels.is_empty() {
        return Err(AllocationError::NoLevels);
    }
    let lot = config.lot();

    let reserve_amount = total_capital * config.reserve_ratio;
    let available = total_capital - reserve_amount;
    if !(available > 0.0) {
        return Err(AllocationError::NoGridCapital(available));
    }

    let buy_levels: Vec<f64> = levels.iter().copied().filter(|&p| p < current_price).collect();
    let sell_count = levels.iter().filter(|&&p| p > current_price).count();
    if buy_levels.is_empty() {
        return Err(AllocationError::EmptyBuySide(current_price));
    }
    if sell_count == 0 {
        return Err(AllocationError::EmptySellSide(current_price));
    }

    let buy_sum: f64 = buy_levels.iter().sum();
    let fund_requirement_factor = buy_sum + sell_count as f64 * current_price;
    let theoretical_shares = available / fund_requirement_factor;
    if !theoretical_shares.is_finite() {
        return Err(AllocationError::NonFinite("theoretical shares"));
    }

    let quantity = floor_to_lots(theoretical_shares, lot, 1);
    let mut sizing = size_primary(quantity, buy_sum, sell_count, current_price, available);
    debug!(
        "Primary sizing: factor {:.2}, quantity {}, safety {:.4}",
        fund_requirement_factor, sizing.quantity, sizing.safety_ratio
    );

    if sizing.safety_ratio > 1.0 {
        let adjusted = shrink_quantity(sizing.quantity, sizing.safety_ratio, config.safety_margin, lot);
        warn!(
            "Safety ratio {:.4} exceeds 1, shrinking quantity {} -> {}",
            sizing.safety_ratio, sizing.quantity, adjusted
        );
        sizing = size_primary(adjusted, buy_sum, sell_count, current_price, available);
        if sizing.safety_ratio > 1.0 {
            return Err(AllocationError::MinimumLotUnsafe {
                safety_ratio: sizing.safety_ratio,
            });
        }
    }

    let grid_trading_amount = available - sizing.base_position_amount;
    let base_position_ratio = sizing.base_position_amount / total_capital;
    let utilization = ratio_or_zero(sizing.buy_grid_fund, grid_trading_amount);

    info!(
        "Primary allocation: base {:.0} ({:.1}%), grid {:.0}, quantity {}, buy fund {:.0}, safety {:.1}%",
        sizing.base_position_amount,
        base_position_ratio * 100.0,
        grid_trading_amount,
        sizing.quantity,
        sizing.buy_grid_fund,
        sizing.safety_ratio * 100.0
    );

    let grid_funds = level_funds(levels, current_price, sizing.quantity);
    Ok(FundAllocation {
        base_position_amount: round_amount(sizing.base_position_amount),
        grid_trading_amount: round_amount(grid_trading_amount),
        reserve_amount: round_amount(reserve_amount),
        grid_count: grid_funds.len(),
        grid_funds,
        total_buy_grid_fund: round_amount(sizing.buy_grid_fund),
        grid_fund_utilization_rate: round_ratio(utilization),
        expected_profit_per_trade: round_amount(expected_profit(levels, sizing.quantity)),
        base_position_ratio: round_ratio(base_position_ratio),
        single_trade_quantity: sizing.quantity,
        safety_ratio: round_ratio(sizing.safety_ratio),
        extreme_case_safe: sizing.safety_ratio <= 1.0,
        calculation_method: AllocationMethod::Primary,
        details: Some(AllocationDetails {
            buy_grids: buy_levels.len(),
            sell_grids: sell_count,
            base_position_shares: sizing.base_position_shares,
            fund_requirement_factor: round_amount(fund_requirement_factor),
            total_required_fund: round_amount(sizing.total_required),
        }),
        fallback_reason: None,
    })
}

// ============================================================================
// Tier 2: fallback
// ============================================================================

/// Fixed base position, quantity sized from the buy levels alone
///
/// An empty buy side is accepted and yields one lot with no buy capital.
pub fn fallback(
    total_capital: f64,
    levels: &[f64],
    current_price: f64,
    config: &AllocationConfig,
) -> Result<FundAllocation, AllocationError> {
    check_inputs(total_capital, levels, current_price)?;
    let lot = config.lot();

    let base_position_ratio = config.fallback_base_position_ratio;
    let base_position_amount = total_capital * base_position_ratio;
    let reserve_amount = total_capital * config.reserve_ratio;
    let grid_amount = total_capital - base_position_amount - reserve_amount;
    if !(grid_amount > 0.0) {
        return Err(AllocationError::NoGridCapital(grid_amount));
    }

    let buy_sum: f64 = levels.iter().filter(|&&p| p < current_price).sum();
    let mut quantity = if buy_sum > 0.0 {
        floor_to_lots(grid_amount / buy_sum, lot, 1)
    } else {
        lot
    };
    let mut safety_ratio = buy_sum * quantity as f64 / grid_amount;

    if safety_ratio > 1.0 {
        let adjusted = shrink_quantity(quantity, safety_ratio, config.safety_margin, lot);
        debug!(
            "Fallback safety ratio {:.4}, shrinking quantity {} -> {}",
            safety_ratio, quantity, adjusted
        );
        quantity = adjusted;
        safety_ratio = buy_sum * quantity as f64 / grid_amount;
    }
    if !safety_ratio.is_finite() {
        return Err(AllocationError::NonFinite("fallback safety ratio"));
    }

    let buy_grid_fund = buy_sum * quantity as f64;
    let grid_funds = level_funds(levels, current_price, quantity);
    Ok(FundAllocation {
        base_position_amount: round_amount(base_position_amount),
        grid_trading_amount: round_amount(grid_amount),
        reserve_amount: round_amount(reserve_amount),
        grid_count: grid_funds.len(),
        grid_funds,
        total_buy_grid_fund: round_amount(buy_grid_fund),
        grid_fund_utilization_rate: round_ratio(ratio_or_zero(buy_grid_fund, grid_amount)),
        expected_profit_per_trade: round_amount(expected_profit(levels, quantity)),
        base_position_ratio: round_ratio(base_position_ratio),
        single_trade_quantity: quantity,
        safety_ratio: round_ratio(safety_ratio),
        extreme_case_safe: safety_ratio <= 1.0,
        calculation_method: AllocationMethod::Fallback,
        details: None,
        fallback_reason: None,
    })
}

// ============================================================================
// Tier 3: minimal
// ============================================================================

/// Terminal safety net: fixed split, one lot, no per-level funds
pub fn minimal(total_capital: f64, config: &AllocationConfig) -> FundAllocation {
    let reserve_amount = total_capital * config.reserve_ratio;
    let base_position_amount = total_capital * config.minimal_base_position_ratio;
    let grid_trading_amount = total_capital - base_position_amount - reserve_amount;

    FundAllocation {
        base_position_amount: round_amount(base_position_amount),
        grid_trading_amount: round_amount(grid_trading_amount),
        reserve_amount: round_amount(reserve_amount),
        grid_funds: Vec::new(),
        total_buy_grid_fund: 0.0,
        grid_fund_utilization_rate: 0.0,
        expected_profit_per_trade: 0.0,
        grid_count: 0,
        base_position_ratio: round_ratio(config.minimal_base_position_ratio),
        single_trade_quantity: config.lot(),
        safety_ratio: 0.0,
        extreme_case_safe: true,
        calculation_method: AllocationMethod::Minimal,
        details: None,
        fallback_reason: None,
    }
}

/// Run the primary tier, falling back tier by tier on error
pub fn allocate(
    total_capital: f64,
    levels: &[f64],
    current_price: f64,
    config: &AllocationConfig,
) -> FundAllocation {
    let primary_err = match primary(total_capital, levels, current_price, config) {
        Ok(allocation) => return allocation,
        Err(e) => e,
    };
    warn!("Primary allocation unavailable ({}), using fallback", primary_err);

    match fallback(total_capital, levels, current_price, config) {
        Ok(mut allocation) => {
            allocation.fallback_reason = Some(primary_err.to_string());
            allocation
        }
        Err(fallback_err) => {
            error!(
                "Fallback allocation failed ({}), using minimal allocation",
                fallback_err
            );
            let mut allocation = minimal(total_capital, config);
            allocation.fallback_reason = Some(format!("{}; {}", primary_err, fallback_err));
            allocation
        }
    }
}
