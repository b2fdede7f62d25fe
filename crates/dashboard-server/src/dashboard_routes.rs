//! Render-pass API Routes
//!
//! `/api/prediction` and `/api/comparison` each run one pipeline pass and
//! return its outcome tagged with the final state.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{Local, NaiveDate};
use market_core::{DateRange, HorizonYears, Selection};
use serde::Deserialize;

use crate::pipeline::{self, PassOutcome, RenderPass};
use crate::{ApiResponse, AppError, AppState};

#[derive(Debug, Deserialize)]
pub struct PredictionQuery {
    pub company: Option<String>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub years: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ComparisonQuery {
    pub sector: Option<String>,
    /// Comma-separated company names
    pub companies: Option<String>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

pub fn dashboard_routes() -> Router<AppState> {
    Router::new()
        .route("/api/prediction", get(prediction))
        .route("/api/comparison", get(comparison))
}

fn bad_request(e: market_core::DashboardError) -> AppError {
    AppError::with_status(StatusCode::BAD_REQUEST, anyhow::Error::new(e))
}

fn date_range(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<DateRange, AppError> {
    let start = start.unwrap_or_else(pipeline::default_start);
    let end = end.unwrap_or_else(|| Local::now().date_naive());
    DateRange::new(start, end).map_err(bad_request)
}

fn split_companies(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

async fn prediction(
    State(state): State<AppState>,
    Query(query): Query<PredictionQuery>,
) -> Result<Json<ApiResponse<RenderPass<PassOutcome>>>, AppError> {
    let selection = Selection::Prediction {
        range: date_range(query.start, query.end)?,
        company: query.company,
        horizon: match query.years {
            Some(years) => HorizonYears::new(years).map_err(bad_request)?,
            None => HorizonYears::default(),
        },
    };

    run(&state, &selection).await
}

async fn comparison(
    State(state): State<AppState>,
    Query(query): Query<ComparisonQuery>,
) -> Result<Json<ApiResponse<RenderPass<PassOutcome>>>, AppError> {
    let selection = Selection::Comparison {
        range: date_range(query.start, query.end)?,
        companies: split_companies(query.companies.as_deref()),
        sector: query.sector,
    };

    run(&state, &selection).await
}

async fn run(
    state: &AppState,
    selection: &Selection,
) -> Result<Json<ApiResponse<RenderPass<PassOutcome>>>, AppError> {
    let reference = state.load_reference()?;
    let settings = state.config.pipeline_settings();

    let pass = pipeline::run_pass(
        selection,
        &reference,
        state.prices.as_ref(),
        state.forecaster.as_ref(),
        &settings,
    )
    .await;

    tracing::info!(
        "{} pass finished in state {:?}",
        selection.mode().label(),
        pass.final_state()
    );
    Ok(Json(ApiResponse::success(pass)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_companies() {
        assert_eq!(
            split_companies(Some("Acme Corp, Beta Inc,,  ")),
            vec!["Acme Corp", "Beta Inc"]
        );
        assert!(split_companies(None).is_empty());
    }

    #[test]
    fn test_date_range_defaults() {
        let range = date_range(None, Some(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap())).unwrap();
        assert_eq!(range.start(), NaiveDate::from_ymd_opt(1900, 1, 1).unwrap());

        let err = date_range(
            Some(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()),
            Some(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()),
        )
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
