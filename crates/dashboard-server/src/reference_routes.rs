//! Reference Table API Routes
//!
//! Options for the page's select boxes, read from the ticker and sector tables.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::{ApiResponse, AppError, AppState};

pub fn reference_routes() -> Router<AppState> {
    Router::new()
        .route("/api/companies", get(list_companies))
        .route("/api/sectors", get(list_sectors))
        .route("/api/sectors/:sector/companies", get(sector_companies))
}

async fn list_companies(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<String>>>, AppError> {
    let reference = state.load_reference()?;
    let names = reference
        .tickers
        .company_names()
        .map(str::to_string)
        .collect();
    Ok(Json(ApiResponse::success(names)))
}

async fn list_sectors(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<String>>>, AppError> {
    let reference = state.load_reference()?;
    Ok(Json(ApiResponse::success(reference.sectors.sectors().to_vec())))
}

async fn sector_companies(
    State(state): State<AppState>,
    Path(sector): Path<String>,
) -> Result<Json<ApiResponse<Vec<String>>>, AppError> {
    let reference = state.load_reference()?;
    if !reference.sectors.contains_sector(&sector) {
        return Err(AppError::with_status(
            StatusCode::NOT_FOUND,
            anyhow::anyhow!("Unknown sector: {}", sector),
        ));
    }
    Ok(Json(ApiResponse::success(
        reference.sectors.companies(&sector).to_vec(),
    )))
}
