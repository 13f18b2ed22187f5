//! Core data types used across the grid planner

use chrono::NaiveDate;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Decimal places kept for prices (grid levels, range bounds, step sizes)
pub const PRICE_DECIMALS: u32 = 3;

/// Decimal places kept for monetary amounts
pub const AMOUNT_DECIMALS: u32 = 2;

/// Decimal places kept for ratios
pub const RATIO_DECIMALS: u32 = 4;

/// Validation errors for a daily price history
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataValidationError {
    #[error("price series is empty")]
    EmptySeries,

    #[error("row {row}: missing required field '{field}'")]
    MissingField { row: usize, field: &'static str },

    #[error("row {row}: field '{field}' has no usable value")]
    MissingValue { row: usize, field: &'static str },

    #[error("row {row}: prices must be positive: open={open}, high={high}, low={low}, close={close}")]
    NonPositivePrice {
        row: usize,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },

    #[error("row {row}: high ({high}) must be >= low ({low})")]
    HighBelowLow { row: usize, high: f64, low: f64 },

    #[error("duplicate bar for date {0}")]
    DuplicateDate(NaiveDate),
}

/// One daily OHLC bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Traded value for the day; zero when the source does not report it
    #[serde(default)]
    pub amount: f64,
}

impl PriceBar {
    pub fn new(
        date: NaiveDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
        amount: f64,
    ) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
            amount,
        }
    }

    /// Validate the bar, reporting `row` (0-based position in the series) on failure
    pub fn validate(&self, row: usize) -> Result<(), DataValidationError> {
        let fields = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ];
        if let Some(&(field, _)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(DataValidationError::MissingValue { row, field });
        }

        if self.open <= 0.0 || self.high <= 0.0 || self.low <= 0.0 || self.close <= 0.0 {
            return Err(DataValidationError::NonPositivePrice {
                row,
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if self.high < self.low {
            return Err(DataValidationError::HighBelowLow {
                row,
                high: self.high,
                low: self.low,
            });
        }

        Ok(())
    }
}

/// Validated daily history: non-empty, ascending by date, one bar per date
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries {
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    /// Sort the bars by date and validate every one of them
    pub fn new(mut bars: Vec<PriceBar>) -> Result<Self, DataValidationError> {
        if bars.is_empty() {
            return Err(DataValidationError::EmptySeries);
        }

        bars.sort_by_key(|b| b.date);

        for (row, pair) in bars.windows(2).enumerate() {
            if pair[0].date == pair[1].date {
                tracing::error!("Duplicate bar at row {} for {}", row + 1, pair[1].date);
                return Err(DataValidationError::DuplicateDate(pair[1].date));
            }
        }

        for (row, bar) in bars.iter().enumerate() {
            if let Err(e) = bar.validate(row) {
                tracing::error!("Rejected price series: {}", e);
                return Err(e);
            }
        }

        Ok(Self { bars })
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    /// Always false for a constructed series; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Most recent bar
    pub fn last(&self) -> &PriceBar {
        // Construction guarantees at least one bar
        &self.bars[self.bars.len() - 1]
    }

    pub fn highs(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.low).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }
}

/// Error returned when parsing an enum from user text
#[derive(Debug, Clone, PartialEq, Error)]
#[error("unknown {kind}: '{value}' (expected one of: {expected})")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static str,
}

/// Grid geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridType {
    /// Constant absolute spacing between levels
    Arithmetic,
    /// Constant multiplicative spacing between levels
    Geometric,
}

impl GridType {
    pub const ALL: [GridType; 2] = [GridType::Arithmetic, GridType::Geometric];

    pub fn as_str(&self) -> &'static str {
        match self {
            GridType::Arithmetic => "arithmetic",
            GridType::Geometric => "geometric",
        }
    }
}

impl Default for GridType {
    fn default() -> Self {
        GridType::Arithmetic
    }
}

impl fmt::Display for GridType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for GridType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "arithmetic" => Ok(GridType::Arithmetic),
            "geometric" => Ok(GridType::Geometric),
            _ => Err(ParseEnumError {
                kind: "grid type",
                value: s.to_string(),
                expected: "arithmetic, geometric",
            }),
        }
    }
}

/// Trading-frequency preference: low trades rarely on a wide grid, high trades often on a tight one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskPreference {
    Low,
    Balanced,
    High,
}

impl RiskPreference {
    pub const ALL: [RiskPreference; 3] = [
        RiskPreference::Low,
        RiskPreference::Balanced,
        RiskPreference::High,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskPreference::Low => "low",
            RiskPreference::Balanced => "balanced",
            RiskPreference::High => "high",
        }
    }
}

impl Default for RiskPreference {
    fn default() -> Self {
        RiskPreference::Balanced
    }
}

impl fmt::Display for RiskPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for RiskPreference {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskPreference::Low),
            "balanced" => Ok(RiskPreference::Balanced),
            "high" => Ok(RiskPreference::High),
            _ => Err(ParseEnumError {
                kind: "risk preference",
                value: s.to_string(),
                expected: "low, balanced, high",
            }),
        }
    }
}

// ============================================================================
// Rounding
// ============================================================================

/// Round half away from zero to `dp` decimal places.
///
/// Goes through `Decimal` so that values such as `3.4999999999999996`
/// produced by repeated float steps land on `3.5`. Values `Decimal` cannot
/// represent (NaN, infinities, magnitudes beyond ~7.9e28) are returned as is.
pub fn round_dp(value: f64, dp: u32) -> f64 {
    Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|d| d.to_f64())
        .unwrap_or(value)
}

pub fn round_price(value: f64) -> f64 {
    round_dp(value, PRICE_DECIMALS)
}

pub fn round_amount(value: f64) -> f64 {
    round_dp(value, AMOUNT_DECIMALS)
}

pub fn round_ratio(value: f64) -> f64 {
    round_dp(value, RATIO_DECIMALS)
}
