//! Early-warning signal engine.
//!
//! Turns one species' daily detection series into aligned indicator arrays:
//! lag-1 autocorrelation and variance of the detrended residuals, the trend
//! slope of the raw counts, and a smoothed composite risk in [0, 100].
//! Rising autocorrelation and variance are the classical signs of critical
//! slowing down ahead of a regime shift.
//!
//! Everything here is pure: the same series always yields the same output.

pub mod baseline;
pub mod risk;
pub mod rolling;

pub use self::baseline::{zscore_vs_baseline, Baseline};
pub use self::risk::{combine_risk, DEFAULT_ALPHA};
pub use self::rolling::{lag1_autocorrelation, rolling_mean, rolling_trend, rolling_variance};

use crate::timeseries::DailySeries;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Window sizes used by [`compute_metrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricParams {
    /// Rolling-mean window used to detrend the counts.
    pub trend_window: usize,
    /// Window for autocorrelation, variance and slope.
    pub metric_window: usize,
    /// Number of leading points forming the fixed z-score baseline.
    pub baseline_n: usize,
}

impl Default for MetricParams {
    fn default() -> Self {
        Self {
            trend_window: 14,
            metric_window: 14,
            baseline_n: 30,
        }
    }
}

/// A window size of zero, rejected before any computation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{name} must be at least 1")]
pub struct InvalidParams {
    pub name: &'static str,
}

impl MetricParams {
    pub fn validate(&self) -> Result<(), InvalidParams> {
        for (name, value) in [
            ("trend_window", self.trend_window),
            ("metric_window", self.metric_window),
            ("baseline_n", self.baseline_n),
        ] {
            if value == 0 {
                return Err(InvalidParams { name });
            }
        }
        Ok(())
    }
}

/// Indicator arrays, one element per day of the source series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub dates: Vec<NaiveDate>,
    pub detections: Vec<f64>,
    pub autocorrelation: Vec<f64>,
    pub variance: Vec<f64>,
    pub trend: Vec<f64>,
    /// Composite risk, 0-100.
    pub risk: Vec<f64>,
}

/// The most recent day of a [`MetricSeries`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub date: NaiveDate,
    pub detections: f64,
    pub autocorrelation: f64,
    pub variance: f64,
    pub trend: f64,
    pub risk: f64,
}

impl MetricSeries {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn latest(&self) -> Option<MetricSnapshot> {
        let i = self.dates.len().checked_sub(1)?;
        Some(MetricSnapshot {
            date: self.dates[i],
            detections: self.detections[i],
            autocorrelation: self.autocorrelation[i],
            variance: self.variance[i],
            trend: self.trend[i],
            risk: self.risk[i],
        })
    }
}

/// Compute every indicator for one species' series.
pub fn compute_metrics(series: &DailySeries, params: &MetricParams) -> MetricSeries {
    if series.is_empty() {
        return MetricSeries::default();
    }

    let dates: Vec<NaiveDate> = series.points().iter().map(|p| p.day).collect();
    let values: Vec<f64> = series.points().iter().map(|p| p.count as f64).collect();

    let smoothed = rolling_mean(&values, params.trend_window);
    let residual: Vec<f64> = values.iter().zip(&smoothed).map(|(v, m)| v - m).collect();

    let autocorrelation = lag1_autocorrelation(&residual, params.metric_window);
    let variance = rolling_variance(&residual, params.metric_window);
    // Slope is taken on the raw counts, not the residuals
    let trend = rolling_trend(&values, params.metric_window);

    let ac_z = zscore_vs_baseline(&autocorrelation, params.baseline_n);
    let var_z = zscore_vs_baseline(&variance, params.baseline_n);
    let trend_z = zscore_vs_baseline(&trend, params.baseline_n);

    let mut ema: Option<f64> = None;
    let risk = (0..values.len())
        .map(|i| {
            let r = combine_risk(ac_z[i], var_z[i], trend_z[i], ema, DEFAULT_ALPHA);
            ema = Some(r);
            (r * 100.0).clamp(0.0, 100.0)
        })
        .collect();

    MetricSeries {
        dates,
        detections: values,
        autocorrelation,
        variance,
        trend,
        risk,
    }
}
