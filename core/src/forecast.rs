//! Sales forecasting — classical decomposition plus a trend-and-seasonal
//! horizon forecast with uncertainty bounds.
//!
//! The daily revenue series is decomposed into trend (centered moving
//! average), seasonal (by-phase means over the detrended series), and
//! residual components; the forecast model is a least-squares linear
//! trend on the deseasonalized series recombined with the seasonal
//! component. Bounds come from the in-sample residual spread.
//!
//! Fewer than two full seasonal periods of history is refused outright —
//! a degenerate fit is worse than no fit.

use crate::{
    error::{EngineError, EngineResult},
    ingest::TransactionSnapshot,
    params::{AnalysisParams, DecompositionMode},
};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    /// None beyond the historical horizon.
    pub actual: Option<f64>,
    pub predicted: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionComponents {
    pub dates: Vec<NaiveDate>,
    pub observed: Vec<f64>,
    pub trend: Vec<f64>,
    pub seasonal: Vec<f64>,
    pub residual: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastReport {
    pub mode: DecompositionMode,
    pub period_days: usize,
    pub horizon_days: usize,
    /// Trailing evaluation window (with actuals) followed by the horizon.
    pub points: Vec<ForecastPoint>,
    pub decomposition: DecompositionComponents,
    pub mae: f64,
    pub rmse: f64,
}

/// Decompose the daily revenue series and forecast the configured horizon.
pub fn forecast(
    snapshot: &TransactionSnapshot,
    params: &AnalysisParams,
) -> EngineResult<ForecastReport> {
    let period = params.seasonal_period_days.max(1);
    let (dates, observed) = daily_series(snapshot);
    let required = period * 2;
    if observed.len() < required {
        return Err(EngineError::InsufficientHistory {
            observed_days: observed.len(),
            required_days: required,
        });
    }

    let mode = params.decomposition;
    let trend = centered_moving_average(&observed, period);
    let seasonal = seasonal_component(&observed, &trend, period, mode);
    let residual: Vec<f64> = (0..observed.len())
        .map(|t| match mode {
            DecompositionMode::Additive => observed[t] - trend[t] - seasonal[t % period],
            DecompositionMode::Multiplicative => {
                let denom = trend[t] * seasonal[t % period];
                if denom.abs() > f64::EPSILON {
                    observed[t] / denom
                } else {
                    1.0
                }
            }
        })
        .collect();

    // Deseasonalize, fit a linear trend, recombine.
    let deseasonalized: Vec<f64> = (0..observed.len())
        .map(|t| match mode {
            DecompositionMode::Additive => observed[t] - seasonal[t % period],
            DecompositionMode::Multiplicative => {
                let s = seasonal[t % period];
                if s.abs() > f64::EPSILON {
                    observed[t] / s
                } else {
                    observed[t]
                }
            }
        })
        .collect();
    let (slope, intercept) = linear_fit(&deseasonalized);

    let fitted = |t: usize| -> f64 {
        let base = intercept + slope * t as f64;
        let value = match mode {
            DecompositionMode::Additive => base + seasonal[t % period],
            DecompositionMode::Multiplicative => base * seasonal[t % period],
        };
        value.max(0.0) // daily revenue cannot go negative
    };

    // In-sample residual spread drives the uncertainty bounds. Additive
    // bounds are absolute; multiplicative bounds scale with the prediction.
    let errors: Vec<f64> = (0..observed.len()).map(|t| observed[t] - fitted(t)).collect();
    let sigma = match mode {
        DecompositionMode::Additive => std_dev(&errors),
        DecompositionMode::Multiplicative => {
            let relative: Vec<f64> = (0..observed.len())
                .filter(|&t| fitted(t) > f64::EPSILON)
                .map(|t| observed[t] / fitted(t) - 1.0)
                .collect();
            std_dev(&relative)
        }
    };
    let band_for = |predicted: f64| -> f64 {
        match mode {
            DecompositionMode::Additive => 1.96 * sigma,
            DecompositionMode::Multiplicative => 1.96 * sigma * predicted,
        }
    };

    // Accuracy over the trailing holdout window.
    let window = params.evaluation_window_days.clamp(1, observed.len());
    let eval_start = observed.len() - window;
    let mae = errors[eval_start..].iter().map(|e| e.abs()).sum::<f64>() / window as f64;
    let rmse = (errors[eval_start..].iter().map(|e| e * e).sum::<f64>() / window as f64).sqrt();

    let last_date = dates[dates.len() - 1];

    let mut points: Vec<ForecastPoint> = Vec::with_capacity(window + params.forecast_horizon_days);
    for t in eval_start..observed.len() {
        let predicted = fitted(t);
        let band = band_for(predicted);
        points.push(ForecastPoint {
            date: dates[t],
            actual: Some(observed[t]),
            predicted,
            lower_bound: (predicted - band).max(0.0),
            upper_bound: predicted + band,
        });
    }
    for step in 1..=params.forecast_horizon_days {
        let t = observed.len() - 1 + step;
        let predicted = fitted(t);
        let band = band_for(predicted);
        points.push(ForecastPoint {
            date: last_date + Duration::days(step as i64),
            actual: None,
            predicted,
            lower_bound: (predicted - band).max(0.0),
            upper_bound: predicted + band,
        });
    }

    log::info!(
        "forecast: {} days history, horizon {}, MAE {:.2}, RMSE {:.2}",
        observed.len(),
        params.forecast_horizon_days,
        mae,
        rmse
    );

    let seasonal_full: Vec<f64> = (0..observed.len()).map(|t| seasonal[t % period]).collect();
    Ok(ForecastReport {
        mode,
        period_days: period,
        horizon_days: params.forecast_horizon_days,
        points,
        decomposition: DecompositionComponents {
            dates,
            observed,
            trend,
            seasonal: seasonal_full,
            residual,
        },
        mae,
        rmse,
    })
}

/// Contiguous zero-filled daily revenue over the snapshot's span.
fn daily_series(snapshot: &TransactionSnapshot) -> (Vec<NaiveDate>, Vec<f64>) {
    let Some((first, last)) = snapshot.date_span() else {
        return (Vec::new(), Vec::new());
    };

    let mut by_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for txn in snapshot.transactions() {
        *by_day.entry(txn.day()).or_insert(0.0) += txn.purchase_amount;
    }

    let mut dates = Vec::new();
    let mut values = Vec::new();
    let mut day = first;
    loop {
        dates.push(day);
        values.push(by_day.get(&day).copied().unwrap_or(0.0));
        if day == last {
            break;
        }
        day = match day.succ_opt() {
            Some(d) => d,
            None => break,
        };
    }
    (dates, values)
}

/// Centered moving average of the given window; a 2xMA for even windows.
/// Edges where the window does not fit carry the nearest interior value.
fn centered_moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let mut trend = vec![f64::NAN; n];
    let half = window / 2;

    for t in half..n.saturating_sub(half) {
        let avg = if window % 2 == 1 {
            values[t - half..=t + half].iter().sum::<f64>() / window as f64
        } else {
            // 2xMA: average of the two offset windows.
            if t + half >= n {
                continue;
            }
            let left = values[t - half..t + half].iter().sum::<f64>() / window as f64;
            let right = values[t - half + 1..=t + half].iter().sum::<f64>() / window as f64;
            (left + right) / 2.0
        };
        trend[t] = avg;
    }

    // Extend the edges.
    let first_valid = trend.iter().position(|v| !v.is_nan()).unwrap_or(0);
    let last_valid = trend.iter().rposition(|v| !v.is_nan()).unwrap_or(0);
    let first_value = trend[first_valid];
    let last_value = trend[last_valid];
    for v in trend.iter_mut().take(first_valid) {
        *v = first_value;
    }
    for v in trend.iter_mut().skip(last_valid + 1) {
        *v = last_value;
    }
    trend
}

/// Mean detrended value per phase of the period, normalized so the
/// seasonal component carries no net trend (sums to 0 additively, averages
/// to 1 multiplicatively).
fn seasonal_component(
    values: &[f64],
    trend: &[f64],
    period: usize,
    mode: DecompositionMode,
) -> Vec<f64> {
    let mut sums = vec![0.0f64; period];
    let mut counts = vec![0usize; period];
    for t in 0..values.len() {
        let detrended = match mode {
            DecompositionMode::Additive => values[t] - trend[t],
            DecompositionMode::Multiplicative => {
                if trend[t].abs() > f64::EPSILON {
                    values[t] / trend[t]
                } else {
                    1.0
                }
            }
        };
        sums[t % period] += detrended;
        counts[t % period] += 1;
    }

    let mut seasonal: Vec<f64> = (0..period)
        .map(|j| {
            if counts[j] > 0 {
                sums[j] / counts[j] as f64
            } else {
                match mode {
                    DecompositionMode::Additive => 0.0,
                    DecompositionMode::Multiplicative => 1.0,
                }
            }
        })
        .collect();

    match mode {
        DecompositionMode::Additive => {
            let mean = seasonal.iter().sum::<f64>() / period as f64;
            for s in &mut seasonal {
                *s -= mean;
            }
        }
        DecompositionMode::Multiplicative => {
            let mean = seasonal.iter().sum::<f64>() / period as f64;
            if mean.abs() > f64::EPSILON {
                for s in &mut seasonal {
                    *s /= mean;
                }
            }
        }
    }
    seasonal
}

/// Least-squares line over t = 0..n. Returns (slope, intercept).
fn linear_fit(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let t_mean = (n - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n;

    let mut num = 0.0;
    let mut den = 0.0;
    for (t, y) in values.iter().enumerate() {
        let dt = t as f64 - t_mean;
        num += dt * (y - y_mean);
        den += dt * dt;
    }
    let slope = if den > 0.0 { num / den } else { 0.0 };
    (slope, y_mean - slope * t_mean)
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
}
