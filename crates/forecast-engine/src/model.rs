//! Additive regression model: piecewise-linear trend plus Fourier seasonality,
//! fitted by penalised least squares.
//!
//! Columns of the design matrix, in order:
//! `[1, t, (t - s_1)+, ..., (t - s_c)+, yearly..., weekly...]`
//! where `t` is time scaled to [0, 1] over the history and `s_j` are the
//! changepoint locations on the same scale.

use chrono::NaiveDate;
use market_core::DashboardError;
use nalgebra::{DMatrix, DVector};

use crate::seasonality::Seasonality;
use crate::ForecastConfig;

/// Prior scale on the base intercept and slope (scaled units).
const BASE_PRIOR_SCALE: f64 = 5.0;
/// Floor on every diagonal penalty so the normal equations stay positive definite.
const MIN_PENALTY: f64 = 1e-8;

#[derive(Debug, Clone)]
pub struct FittedModel {
    start: NaiveDate,
    span_days: f64,
    y_scale: f64,
    changepoints: Vec<f64>,
    yearly: Option<Seasonality>,
    weekly: Option<Seasonality>,
    changepoint_prior_scale: f64,
    seasonality_prior_scale: f64,
    beta: DVector<f64>,
    /// Residual standard deviation in original units
    pub sigma: f64,
}

/// Per-date model output in original units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Components {
    pub trend: f64,
    pub yearly: f64,
    pub weekly: f64,
}

impl Components {
    pub fn total(&self) -> f64 {
        self.trend + self.yearly + self.weekly
    }
}

impl FittedModel {
    pub fn fit(history: &[(NaiveDate, f64)], config: &ForecastConfig) -> Result<Self, DashboardError> {
        let n = history.len();
        let start = history[0].0;
        let span_days = (history[n - 1].0 - start).num_days() as f64;

        let y_scale = history
            .iter()
            .map(|(_, y)| y.abs())
            .fold(0.0_f64, f64::max);
        let y_scale = if y_scale > 0.0 { y_scale } else { 1.0 };

        let yearly = (config.yearly_order > 0
            && config.yearly.unwrap_or(span_days >= 2.0 * 365.0))
        .then(|| Seasonality::yearly(config.yearly_order));
        let weekly = (config.weekly_order > 0
            && config
                .weekly
                .unwrap_or(span_days >= 14.0 && median_spacing_days(history) < 7.0))
        .then(|| Seasonality::weekly(config.weekly_order));

        let changepoints = changepoint_locations(history, start, span_days, config);

        let mut model = Self {
            start,
            span_days,
            y_scale,
            changepoints,
            yearly,
            weekly,
            changepoint_prior_scale: config.changepoint_prior_scale,
            seasonality_prior_scale: config.seasonality_prior_scale,
            beta: DVector::zeros(0),
            sigma: 0.0,
        };

        let p = model.width();
        let mut x = DMatrix::<f64>::zeros(n, p);
        let mut row = Vec::with_capacity(p);
        for (i, (date, _)) in history.iter().enumerate() {
            row.clear();
            model.features_into(*date, &mut row);
            for (j, v) in row.iter().enumerate() {
                x[(i, j)] = *v;
            }
        }
        let y = DVector::from_iterator(n, history.iter().map(|(_, v)| v / y_scale));

        let xt = x.transpose();
        let xtx = &xt * &x;
        let xty = &xt * &y;

        // First pass with a nominal noise level estimates the residual
        // variance; the second pass scales the priors by it.
        let nominal = model.penalties(1e-4);
        let beta0 = solve(&xtx, &xty, &nominal)?;
        let noise_var = residual_variance(&x, &y, &beta0).max(1e-12);

        let penalties = model.penalties(noise_var);
        let beta = solve(&xtx, &xty, &penalties)?;

        let var = residual_variance(&x, &y, &beta);
        model.sigma = var.sqrt() * y_scale;
        model.beta = beta;

        tracing::debug!(
            "Fitted additive model: n={}, changepoints={}, yearly={}, weekly={}, sigma={:.4}",
            n,
            model.changepoints.len(),
            model.yearly.is_some(),
            model.weekly.is_some(),
            model.sigma
        );

        Ok(model)
    }

    pub fn yearly_enabled(&self) -> bool {
        self.yearly.is_some()
    }

    pub fn weekly_enabled(&self) -> bool {
        self.weekly.is_some()
    }

    pub fn span_days(&self) -> f64 {
        self.span_days
    }

    fn trend_width(&self) -> usize {
        2 + self.changepoints.len()
    }

    fn width(&self) -> usize {
        self.trend_width()
            + self.yearly.map(|s| s.width()).unwrap_or(0)
            + self.weekly.map(|s| s.width()).unwrap_or(0)
    }

    fn scaled_time(&self, date: NaiveDate) -> f64 {
        if self.span_days > 0.0 {
            (date - self.start).num_days() as f64 / self.span_days
        } else {
            0.0
        }
    }

    fn features_into(&self, date: NaiveDate, row: &mut Vec<f64>) {
        let t = self.scaled_time(date);
        row.push(1.0);
        row.push(t);
        for s in &self.changepoints {
            row.push((t - s).max(0.0));
        }
        if let Some(s) = self.yearly {
            s.features_into(date, row);
        }
        if let Some(s) = self.weekly {
            s.features_into(date, row);
        }
    }

    /// Ridge penalties equal to `noise_var / prior_variance` per column.
    fn penalties(&self, noise_var: f64) -> Vec<f64> {
        let base = (noise_var / BASE_PRIOR_SCALE.powi(2)).max(MIN_PENALTY);
        // Laplace(0, τ) has variance 2τ²
        let delta = (noise_var / (2.0 * self.changepoint_prior_scale.powi(2))).max(MIN_PENALTY);
        let seasonal = (noise_var / self.seasonality_prior_scale.powi(2)).max(MIN_PENALTY);

        let mut out = vec![base, base];
        out.resize(self.trend_width(), delta);
        out.resize(self.width(), seasonal);
        out
    }

    /// Evaluate the additive components for `date`.
    pub fn components(&self, date: NaiveDate) -> Components {
        let mut row = Vec::with_capacity(self.width());
        self.features_into(date, &mut row);

        let dot = |from: usize, to: usize| -> f64 {
            (from..to).map(|j| row[j] * self.beta[j]).sum::<f64>() * self.y_scale
        };

        let trend_end = self.trend_width();
        let yearly_end = trend_end + self.yearly.map(|s| s.width()).unwrap_or(0);
        let weekly_end = yearly_end + self.weekly.map(|s| s.width()).unwrap_or(0);

        Components {
            trend: dot(0, trend_end),
            yearly: dot(trend_end, yearly_end),
            weekly: dot(yearly_end, weekly_end),
        }
    }
}

/// Changepoints at evenly spaced history rows within the first
/// `changepoint_range` of the data, never on the first row.
fn changepoint_locations(
    history: &[(NaiveDate, f64)],
    start: NaiveDate,
    span_days: f64,
    config: &ForecastConfig,
) -> Vec<f64> {
    let hist_size = (history.len() as f64 * config.changepoint_range).floor() as usize;
    let count = config.n_changepoints.min(hist_size.saturating_sub(1));
    if count == 0 || span_days <= 0.0 {
        return Vec::new();
    }

    let last_idx = (hist_size - 1) as f64;
    let mut out: Vec<f64> = (1..=count)
        .map(|k| {
            let idx = (k as f64 * last_idx / count as f64).round() as usize;
            (history[idx].0 - start).num_days() as f64 / span_days
        })
        .collect();
    out.dedup_by(|a, b| (*a - *b).abs() < f64::EPSILON);
    out
}

fn median_spacing_days(history: &[(NaiveDate, f64)]) -> f64 {
    let mut gaps: Vec<i64> = history
        .windows(2)
        .map(|w| (w[1].0 - w[0].0).num_days())
        .collect();
    if gaps.is_empty() {
        return f64::INFINITY;
    }
    gaps.sort_unstable();
    gaps[gaps.len() / 2] as f64
}

fn solve(
    xtx: &DMatrix<f64>,
    xty: &DVector<f64>,
    penalties: &[f64],
) -> Result<DVector<f64>, DashboardError> {
    let mut a = xtx.clone();
    for (j, lambda) in penalties.iter().enumerate() {
        a[(j, j)] += lambda;
    }

    if let Some(chol) = a.clone().cholesky() {
        return Ok(chol.solve(xty));
    }
    a.lu()
        .solve(xty)
        .ok_or_else(|| DashboardError::Forecast("normal equations are singular".to_string()))
}

fn residual_variance(x: &DMatrix<f64>, y: &DVector<f64>, beta: &DVector<f64>) -> f64 {
    let resid = y - x * beta;
    let dof = (y.len().saturating_sub(1)).max(1) as f64;
    resid.norm_squared() / dof
}
