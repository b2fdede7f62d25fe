//! StockGains dashboard server: embedded page plus the JSON API that runs
//! one render pass per request.

pub mod config;
pub mod dashboard_routes;
pub mod embedded_frontend;
pub mod pipeline;
pub mod reference_routes;
pub mod request_id;
pub mod security_headers;

use std::sync::Arc;

use axum::{
    http::{Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use forecast_engine::AdditiveForecaster;
use market_core::{DashboardError, Forecaster, PriceSource};
use reference_data::ReferenceData;
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;
use yahoo_client::YahooFinanceClient;

pub use config::DashboardConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<DashboardConfig>,
    pub prices: Arc<dyn PriceSource>,
    pub forecaster: Arc<dyn Forecaster>,
}

impl AppState {
    pub fn new(
        config: DashboardConfig,
        prices: Arc<dyn PriceSource>,
        forecaster: Arc<dyn Forecaster>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            prices,
            forecaster,
        }
    }

    /// Reference tables are read fresh for every pass.
    pub fn load_reference(&self) -> Result<ReferenceData, AppError> {
        ReferenceData::load(&self.config.reference_paths()).map_err(dashboard_err)
    }
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Handler error rendered as an `ApiResponse` with a status code.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn with_status(status: StatusCode, error: anyhow::Error) -> Self {
        Self { status, error }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("Request failed: {:#}", self.error);
        } else {
            tracing::debug!("Request rejected: {:#}", self.error);
        }
        (
            self.status,
            Json(ApiResponse::<()>::error(format!("{:#}", self.error))),
        )
            .into_response()
    }
}

/// Map a `DashboardError` to the status the page should see.
pub fn dashboard_err(e: DashboardError) -> AppError {
    let status = match &e {
        DashboardError::InvalidSelection(_) => StatusCode::BAD_REQUEST,
        DashboardError::UnresolvedSymbol(_) | DashboardError::EmptyResult(_) => {
            StatusCode::NOT_FOUND
        }
        DashboardError::Fetch(_) => StatusCode::BAD_GATEWAY,
        DashboardError::DataLoad(_) | DashboardError::Forecast(_) | DashboardError::Render(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    AppError::with_status(status, anyhow::Error::new(e))
}

async fn health() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::success("ok"))
}

/// Full router with middleware, ready to serve.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .merge(reference_routes::reference_routes())
        .merge(dashboard_routes::dashboard_routes())
        .merge(embedded_frontend::frontend_routes())
        .layer(middleware::from_fn(security_headers::security_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .layer(cors)
        .with_state(state)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "dashboard_server=info,yahoo_client=info,forecast_engine=info,tower_http=info".into()
    });
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = DashboardConfig::from_env()?;
    tracing::info!(
        "Reference tables: {} and {}",
        config.tickers_csv.display(),
        config.sectors_csv.display()
    );

    // Fail fast on a broken table instead of on the first request.
    let reference = ReferenceData::load(&config.reference_paths())?;
    tracing::info!(
        "Loaded {} companies across {} sectors",
        reference.tickers.len(),
        reference.sectors.sectors().len()
    );

    let prices = Arc::new(YahooFinanceClient::with_config(
        config.yahoo_base_url.clone(),
        config.http_timeout(),
    ));
    let forecaster = Arc::new(AdditiveForecaster::default());
    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(config, prices, forecaster);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("StockGains dashboard listening on http://{}", bind_addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod routes_tests;
