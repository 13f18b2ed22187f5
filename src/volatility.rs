//! Volatility engine
//!
//! Turns a validated price history into the volatility figures the rest of the
//! pipeline consumes: ATR and its normalized ratio, annualized historical
//! volatility and ADX trend strength. Everything is recomputed on each call.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::{debug, info};

use crate::indicators;
use crate::{DataValidationError, PriceBar, PriceSeries};

/// Default smoothing window in bars
pub const DEFAULT_ATR_PERIOD: usize = 14;

/// Number of most recent bars compared against older history for the ATR trend
pub const ATR_TREND_WINDOW: usize = 30;

/// Volatility figures for the most recent bar of a series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilitySnapshot {
    pub atr: f64,
    /// ATR divided by the trailing mean close
    pub atr_ratio: f64,
    /// `atr_ratio` expressed in percent
    pub atr_pct: f64,
    pub annualized_volatility: f64,
    /// Trend strength in [0, 100]
    pub adx: f64,
}

/// Per-bar ATR series
#[derive(Debug, Clone, PartialEq)]
pub struct AtrSeries {
    pub true_range: Vec<f64>,
    pub atr: Vec<f64>,
    pub atr_ratio: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
}

/// Direction and relative size of the recent change in ATR ratio
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AtrTrend {
    pub direction: TrendDirection,
    /// |recent mean - historical mean| / historical mean
    pub strength: f64,
}

/// Summary statistics over the whole ATR-ratio history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtrAnalysis {
    pub current_atr: f64,
    pub current_atr_ratio: f64,
    pub current_atr_pct: f64,
    pub avg_atr_ratio: f64,
    pub max_atr_ratio: f64,
    pub min_atr_ratio: f64,
    /// Sample standard deviation of the ratio series (0.0 for a single bar)
    pub atr_ratio_std: f64,
    /// Last close of the series
    pub current_price: f64,
    pub period: usize,
    /// `None` when there is no history older than the trend window
    pub trend: Option<AtrTrend>,
}

/// How much daily amplitude the security offers a grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmplitudeRating {
    /// ATR ≥ 2.0 % of price
    Sufficient,
    /// ATR in [1.5 %, 2.0 %)
    Moderate,
    /// ATR below 1.5 %
    Insufficient,
}

impl AmplitudeRating {
    pub fn from_atr_ratio(atr_ratio: f64) -> Self {
        let atr_pct = atr_ratio * 100.0;
        if atr_pct >= 2.0 {
            AmplitudeRating::Sufficient
        } else if atr_pct >= 1.5 {
            AmplitudeRating::Moderate
        } else {
            AmplitudeRating::Insufficient
        }
    }

    /// Points out of 35
    pub fn score(&self) -> u32 {
        match self {
            AmplitudeRating::Sufficient => 35,
            AmplitudeRating::Moderate => 25,
            AmplitudeRating::Insufficient => 0,
        }
    }
}

/// Computes ATR-based volatility figures over a configurable window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolatilityEngine {
    period: usize,
}

impl Default for VolatilityEngine {
    fn default() -> Self {
        Self::new(DEFAULT_ATR_PERIOD)
    }
}

impl VolatilityEngine {
    /// A period of 0 is treated as 1
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// True range, ATR and ATR ratio for every bar
    pub fn atr_series(&self, series: &PriceSeries) -> AtrSeries {
        let high = series.highs();
        let low = series.lows();
        let close = series.closes();

        let true_range = indicators::true_range(&high, &low, &close);
        let atr = indicators::rolling_mean(&true_range, self.period);
        let atr_ratio = indicators::atr_ratio(&atr, &close, self.period);

        debug!(
            "ATR series computed over {} bars with period {}",
            series.len(),
            self.period
        );

        AtrSeries {
            true_range,
            atr,
            atr_ratio,
        }
    }

    /// Volatility figures for the last bar
    pub fn snapshot(&self, series: &PriceSeries) -> VolatilitySnapshot {
        let atr_series = self.atr_series(series);
        let high = series.highs();
        let low = series.lows();
        let close = series.closes();

        let last = series.len() - 1;
        let atr = atr_series.atr[last];
        let atr_ratio = atr_series.atr_ratio[last];

        let snapshot = VolatilitySnapshot {
            atr,
            atr_ratio,
            atr_pct: atr_ratio * 100.0,
            annualized_volatility: indicators::annualized_volatility(&close),
            adx: indicators::adx(&high, &low, &close, self.period),
        };

        info!(
            "Volatility snapshot: ATR={:.4} ({:.2}%), annual vol={:.1}%, ADX={:.1}",
            snapshot.atr,
            snapshot.atr_pct,
            snapshot.annualized_volatility * 100.0,
            snapshot.adx
        );

        snapshot
    }

    /// Validate raw bars and compute the snapshot in one step
    pub fn snapshot_from_bars(
        &self,
        bars: Vec<PriceBar>,
    ) -> Result<VolatilitySnapshot, DataValidationError> {
        let series = PriceSeries::new(bars)?;
        Ok(self.snapshot(&series))
    }

    /// Statistics over the full ATR-ratio history
    pub fn analyze(&self, series: &PriceSeries) -> AtrAnalysis {
        let atr_series = self.atr_series(series);
        let ratios = &atr_series.atr_ratio;
        let last = ratios.len() - 1;

        let atr_ratio_std = if ratios.len() > 1 {
            ratios.iter().std_dev()
        } else {
            0.0
        };

        let trend = if ratios.len() > ATR_TREND_WINDOW {
            let split = ratios.len() - ATR_TREND_WINDOW;
            let historical = ratios[..split].iter().mean();
            let recent = ratios[split..].iter().mean();
            if historical > 0.0 {
                Some(AtrTrend {
                    direction: if recent > historical {
                        TrendDirection::Increasing
                    } else {
                        TrendDirection::Decreasing
                    },
                    strength: (recent - historical).abs() / historical,
                })
            } else {
                None
            }
        } else {
            None
        };

        AtrAnalysis {
            current_atr: atr_series.atr[last],
            current_atr_ratio: ratios[last],
            current_atr_pct: ratios[last] * 100.0,
            avg_atr_ratio: ratios.iter().mean(),
            max_atr_ratio: ratios.iter().cloned().fold(f64::MIN, f64::max),
            min_atr_ratio: ratios.iter().cloned().fold(f64::MAX, f64::min),
            atr_ratio_std,
            current_price: series.last().close,
            period: self.period,
            trend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;

    fn series_from(points: &[(f64, f64, f64)]) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars = points
            .iter()
            .enumerate()
            .map(|(i, &(high, low, close))| {
                PriceBar::new(
                    start + chrono::Duration::days(i as i64),
                    close,
                    high,
                    low,
                    close,
                    1000.0,
                    0.0,
                )
            })
            .collect();
        PriceSeries::new(bars).unwrap()
    }

    fn oscillating(count: usize) -> PriceSeries {
        let points: Vec<(f64, f64, f64)> = (0..count)
            .map(|i| {
                let mid = 10.0 + if i % 2 == 0 { 0.1 } else { -0.1 };
                (mid + 0.1, mid - 0.1, mid)
            })
            .collect();
        series_from(&points)
    }

    #[test]
    fn test_single_bar_snapshot() {
        let series = series_from(&[(10.5, 9.5, 10.0)]);
        let snapshot = VolatilityEngine::default().snapshot(&series);

        assert_abs_diff_eq!(snapshot.atr, 1.0);
        assert_abs_diff_eq!(snapshot.atr_ratio, 0.1);
        assert_abs_diff_eq!(snapshot.atr_pct, 10.0);
        assert_eq!(snapshot.annualized_volatility, 0.0);
        assert_eq!(snapshot.adx, 0.0);
    }

    #[test]
    fn test_snapshot_matches_last_atr() {
        let series = oscillating(40);
        let engine = VolatilityEngine::new(14);
        let atr_series = engine.atr_series(&series);
        let snapshot = engine.snapshot(&series);

        assert_eq!(atr_series.atr.len(), 40);
        assert_abs_diff_eq!(snapshot.atr, atr_series.atr[39]);
        assert_abs_diff_eq!(snapshot.atr_ratio, atr_series.atr_ratio[39]);
        assert!(snapshot.annualized_volatility > 0.0);
        assert!((0.0..=100.0).contains(&snapshot.adx));
    }

    #[test]
    fn test_snapshot_from_bars_rejects_bad_data() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars = vec![PriceBar::new(day, 10.0, 9.0, 11.0, 10.0, 0.0, 0.0)];

        let result = VolatilityEngine::default().snapshot_from_bars(bars);
        assert!(matches!(
            result,
            Err(DataValidationError::HighBelowLow { .. })
        ));
    }

    #[test]
    fn test_analysis_trend_requires_history() {
        let engine = VolatilityEngine::default();

        let short = engine.analyze(&oscillating(20));
        assert!(short.trend.is_none());
        assert_eq!(short.period, 14);
        assert!(short.min_atr_ratio <= short.avg_atr_ratio);
        assert!(short.avg_atr_ratio <= short.max_atr_ratio);

        // Calm first half, volatile second half
        let mut points: Vec<(f64, f64, f64)> = (0..40).map(|_| (10.05, 9.95, 10.0)).collect();
        points.extend((0..40).map(|i| {
            let close = if i % 2 == 0 { 10.5 } else { 9.5 };
            (close + 0.5, close - 0.5, close)
        }));
        let analysis = engine.analyze(&series_from(&points));
        let trend = analysis.trend.expect("trend with 80 bars");
        assert_eq!(trend.direction, TrendDirection::Increasing);
        assert!(trend.strength > 0.0);
        assert_abs_diff_eq!(analysis.current_price, 9.5);
    }

    #[test]
    fn test_amplitude_rating() {
        assert_eq!(
            AmplitudeRating::from_atr_ratio(0.025),
            AmplitudeRating::Sufficient
        );
        assert_eq!(
            AmplitudeRating::from_atr_ratio(0.016),
            AmplitudeRating::Moderate
        );
        assert_eq!(
            AmplitudeRating::from_atr_ratio(0.01),
            AmplitudeRating::Insufficient
        );
        assert_eq!(AmplitudeRating::Sufficient.score(), 35);
        assert_eq!(AmplitudeRating::Insufficient.score(), 0);
    }
}
