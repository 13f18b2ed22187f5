//! Data loading
//!
//! Loads daily OHLC history from CSV files with a header row:
//!
//! ```text
//! date,open,high,low,close,volume[,amount]
//! ```
//!
//! Columns are located by header name, case-insensitively, so extra columns
//! and any column order are accepted. Dates may be `YYYY-MM-DD` or
//! `YYYYMMDD`. Row numbers in errors count data rows from 1.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::io::Read;
use std::path::Path;
use tracing::info;

use crate::{DataValidationError, PriceBar, PriceSeries};

const REQUIRED_COLUMNS: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y%m%d"];

/// Parse a trading date in any supported format
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

fn required<'a>(
    record: &'a csv::StringRecord,
    col: usize,
    row: usize,
    field: &'static str,
) -> Result<&'a str> {
    match record.get(col) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(DataValidationError::MissingValue { row, field }.into()),
    }
}

/// Load and validate a price series from a CSV file
pub fn load_csv(path: impl AsRef<Path>) -> Result<PriceSeries> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open CSV file {}", path.display()))?;
    let series = read_csv(file).with_context(|| format!("Invalid price data in {}", path.display()))?;

    info!("Loaded {} bars from {}", series.len(), path.display());
    Ok(series)
}

/// Read a price series from any CSV source
pub fn read_csv<R: Read>(source: R) -> Result<PriceSeries> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(source);

    let headers = reader.headers().context("Failed to read CSV header")?.clone();
    let position = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));

    let mut columns = [0usize; 6];
    for (slot, name) in columns.iter_mut().zip(REQUIRED_COLUMNS) {
        *slot = position(name).ok_or(DataValidationError::MissingField { row: 0, field: name })?;
    }
    let [date_col, open_col, high_col, low_col, close_col, volume_col] = columns;
    let amount_col = position("amount");

    let mut bars = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let row = idx + 1;
        let record = record.with_context(|| format!("Failed to read row {}", row))?;

        let number = |col: usize, name: &'static str| -> Result<f64> {
            let raw = required(&record, col, row, name)?;
            raw.parse::<f64>()
                .with_context(|| format!("Failed to parse {} '{}' at row {}", name, raw, row))
        };

        let raw_date = required(&record, date_col, row, "date")?;
        let date = parse_date(raw_date)
            .with_context(|| format!("Failed to parse date '{}' at row {}", raw_date, row))?;

        let amount = match amount_col.and_then(|col| record.get(col)) {
            Some(v) if !v.is_empty() => v
                .parse::<f64>()
                .with_context(|| format!("Failed to parse amount '{}' at row {}", v, row))?,
            _ => 0.0,
        };

        bars.push(PriceBar::new(
            date,
            number(open_col, "open")?,
            number(high_col, "high")?,
            number(low_col, "low")?,
            number(close_col, "close")?,
            number(volume_col, "volume")?,
            amount,
        ));
    }

    Ok(PriceSeries::new(bars)?)
}
