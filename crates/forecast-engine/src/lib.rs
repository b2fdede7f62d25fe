//! Additive-regression forecaster for daily price series.
//!
//! The model is refitted on every call; nothing is cached between requests.

pub mod model;
pub mod seasonality;

use chrono::{Duration, NaiveDate};
use market_core::{DashboardError, ForecastPoint, ForecastResult, Forecaster};
use statrs::distribution::{ContinuousCDF, Normal};

pub use model::{Components, FittedModel};

pub const DEFAULT_CHANGEPOINT_PRIOR_SCALE: f64 = 0.05;
pub const DEFAULT_SEASONALITY_PRIOR_SCALE: f64 = 10.0;
/// Fewest observations a fit accepts
pub const MIN_HISTORY: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastConfig {
    pub n_changepoints: usize,
    /// Share of the history eligible for changepoints
    pub changepoint_range: f64,
    pub changepoint_prior_scale: f64,
    pub seasonality_prior_scale: f64,
    pub yearly_order: usize,
    pub weekly_order: usize,
    /// `None` = decide from the data
    pub yearly: Option<bool>,
    pub weekly: Option<bool>,
    /// Coverage of the predicted_lower..predicted_upper band
    pub interval_width: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            n_changepoints: 25,
            changepoint_range: 0.8,
            changepoint_prior_scale: DEFAULT_CHANGEPOINT_PRIOR_SCALE,
            seasonality_prior_scale: DEFAULT_SEASONALITY_PRIOR_SCALE,
            yearly_order: 10,
            weekly_order: 3,
            yearly: None,
            weekly: None,
            interval_width: 0.8,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AdditiveForecaster {
    config: ForecastConfig,
}

impl AdditiveForecaster {
    pub fn new(config: ForecastConfig) -> Self {
        Self { config }
    }

    fn interval_z(&self) -> Result<f64, DashboardError> {
        let width = self.config.interval_width;
        if !(width > 0.0 && width < 1.0) {
            return Err(DashboardError::Forecast(format!(
                "interval width must be in (0, 1), got {}",
                width
            )));
        }
        let normal = Normal::new(0.0, 1.0).map_err(|e| DashboardError::Forecast(e.to_string()))?;
        Ok(normal.inverse_cdf(0.5 + width / 2.0))
    }
}

impl Forecaster for AdditiveForecaster {
    fn forecast(
        &self,
        history: &[(NaiveDate, f64)],
        horizon_days: u32,
    ) -> Result<ForecastResult, DashboardError> {
        validate_history(history)?;
        let z = self.interval_z()?;

        let model = FittedModel::fit(history, &self.config)?;
        let history_end = history[history.len() - 1].0;
        let span = model.span_days().max(1.0);

        let future = (1..=i64::from(horizon_days)).map(|d| history_end + Duration::days(d));
        let dates = history.iter().map(|(date, _)| *date).chain(future);

        let points = dates
            .map(|date| {
                let c = model.components(date);
                let predicted = c.total();
                let days_past_end = (date - history_end).num_days().max(0) as f64;
                let half_width = z * model.sigma * (1.0 + days_past_end / span).sqrt();
                ForecastPoint {
                    date,
                    predicted,
                    predicted_lower: predicted - half_width,
                    predicted_upper: predicted + half_width,
                    trend: c.trend,
                    yearly: c.yearly,
                    weekly: c.weekly,
                }
            })
            .collect::<Vec<_>>();

        tracing::info!(
            "Forecast fitted on {} observations, {} rows through {}",
            history.len(),
            points.len(),
            history_end + Duration::days(i64::from(horizon_days))
        );

        Ok(ForecastResult {
            points,
            history_end,
            horizon_days,
            yearly_enabled: model.yearly_enabled(),
            weekly_enabled: model.weekly_enabled(),
        })
    }
}

fn validate_history(history: &[(NaiveDate, f64)]) -> Result<(), DashboardError> {
    if history.len() < MIN_HISTORY {
        return Err(DashboardError::Forecast(format!(
            "need at least {} observations, got {}",
            MIN_HISTORY,
            history.len()
        )));
    }
    if let Some(w) = history.windows(2).find(|w| w[1].0 <= w[0].0) {
        return Err(DashboardError::Forecast(format!(
            "dates must be strictly increasing ({} then {})",
            w[0].0, w[1].0
        )));
    }
    if let Some((date, _)) = history.iter().find(|(_, v)| !v.is_finite()) {
        return Err(DashboardError::Forecast(format!(
            "non-finite value on {}",
            date
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests;
