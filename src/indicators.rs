//! Technical indicators
//!
//! Series-level volatility and trend indicators used by the volatility engine.
//! All functions take parallel `high`/`low`/`close` slices of equal length.

use statrs::statistics::Statistics;

/// Trading days used to annualize daily volatility
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Simple Moving Average over complete windows only
///
/// Bars before the first full window yield `None`.
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = Vec::with_capacity(values.len());

    for i in 0..values.len() {
        if period == 0 || i + 1 < period {
            result.push(None);
        } else {
            let sum: f64 = values[i + 1 - period..=i].iter().sum();
            result.push(Some(sum / period as f64));
        }
    }

    result
}

/// Trailing mean that falls back to a partial window while history is short
///
/// Bar `i` averages `values[i + 1 - period..=i]`, or `values[0..=i]` when
/// fewer than `period` values exist, so every bar has a defined value.
/// A `period` of 0 is treated as 1.
pub fn rolling_mean(values: &[f64], period: usize) -> Vec<f64> {
    let period = period.max(1);

    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(period);
            let window = &values[start..=i];
            window.iter().sum::<f64>() / window.len() as f64
        })
        .collect()
}

/// Calculate True Range
///
/// The first bar has no previous close, so its range is `high - low`.
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(high.len());

    for i in 0..high.len() {
        let tr_value = if i == 0 {
            high[i] - low[i]
        } else {
            let hl = high[i] - low[i];
            let hc = (high[i] - close[i - 1]).abs();
            let lc = (low[i] - close[i - 1]).abs();
            hl.max(hc).max(lc)
        };
        tr.push(tr_value);
    }

    tr
}

/// Calculate Average True Range (partial-window mean of true range)
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let tr = true_range(high, low, close);
    rolling_mean(&tr, period)
}

/// ATR normalized by the trailing mean close over the same window
pub fn atr_ratio(atr_values: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let close_avg = rolling_mean(close, period);
    atr_values
        .iter()
        .zip(close_avg.iter())
        .map(|(&a, &c)| if c > 0.0 { a / c } else { 0.0 })
        .collect()
}

/// Daily log returns `ln(close_t / close_{t-1})`
pub fn log_returns(close: &[f64]) -> Vec<f64> {
    close.windows(2).map(|w| (w[1] / w[0]).ln()).collect()
}

/// Annualized historical volatility: sample std-dev of log returns × √252
///
/// Returns 0.0 when fewer than two returns exist or the result is not finite.
pub fn annualized_volatility(close: &[f64]) -> f64 {
    let returns = log_returns(close);
    if returns.len() < 2 {
        return 0.0;
    }

    let daily = returns.iter().std_dev();
    let annual = daily * TRADING_DAYS_PER_YEAR.sqrt();
    if annual.is_finite() {
        annual
    } else {
        0.0
    }
}

/// Directional movement (+DM, -DM) per bar; the first bar has none
pub fn directional_movement(high: &[f64], low: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut plus_dm = vec![0.0; high.len()];
    let mut minus_dm = vec![0.0; high.len()];

    for i in 1..high.len() {
        let up_move = high[i] - high[i - 1];
        let down_move = low[i - 1] - low[i];

        if up_move > down_move && up_move > 0.0 {
            plus_dm[i] = up_move;
        }
        if down_move > up_move && down_move > 0.0 {
            minus_dm[i] = down_move;
        }
    }

    (plus_dm, minus_dm)
}

/// Average Directional Index of the most recent bar, in [0, 100]
///
/// +DM, -DM and TR are averaged over complete `period` windows, DX is derived
/// per bar, and ADX is the mean of the last `period` DX values. Any bar in
/// that final window without a defined DX (short history, zero range, no
/// directional movement) makes the result 0.0.
pub fn adx(high: &[f64], low: &[f64], close: &[f64], period: usize) -> f64 {
    let n = high.len();
    if period == 0 || n < period {
        return 0.0;
    }

    let (plus_dm, minus_dm) = directional_movement(high, low);
    let tr = true_range(high, low, close);

    let plus_smooth = sma(&plus_dm, period);
    let minus_smooth = sma(&minus_dm, period);
    let tr_smooth = sma(&tr, period);

    let dx: Vec<Option<f64>> = (0..n)
        .map(|i| match (plus_smooth[i], minus_smooth[i], tr_smooth[i]) {
            (Some(p), Some(m), Some(t)) if t > 0.0 => {
                let plus_di = 100.0 * p / t;
                let minus_di = 100.0 * m / t;
                let sum = plus_di + minus_di;
                if sum > 0.0 {
                    Some(100.0 * (plus_di - minus_di).abs() / sum)
                } else {
                    None
                }
            }
            _ => None,
        })
        .collect();

    let window: Option<Vec<f64>> = dx[n - period..].iter().copied().collect();
    match window {
        Some(values) => {
            let value = values.iter().mean();
            if value.is_finite() {
                value.clamp(0.0, 100.0)
            } else {
                0.0
            }
        }
        None => {
            tracing::debug!("ADX undefined over the last {} bars, using 0.0", period);
            0.0
        }
    }
}
