use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::{Duration, NaiveDate};
use forecast_engine::AdditiveForecaster;
use market_core::{DashboardError, DateRange, PriceBar, PriceSeries, PriceSource};
use serde_json::Value;
use tower::ServiceExt;

use super::*;

const TICKERS: &str = "Company Name,Symbol\nAcme Corp,ACME\nBeta Inc,BETA\n";
const SECTORS: &str = "Sector,Company Name\nTech,Acme Corp\nTech,Beta Inc\n";

/// Sixty daily closes for any symbol, clipped to the range.
struct StubSource;

#[async_trait]
impl PriceSource for StubSource {
    async fn fetch_prices(
        &self,
        symbols: &[String],
        range: DateRange,
    ) -> Result<HashMap<String, PriceSeries>, DashboardError> {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        Ok(symbols
            .iter()
            .map(|s| {
                let bars = (0..60)
                    .map(|i| PriceBar::flat(start + Duration::days(i), 10.0 + i as f64))
                    .filter(|b| range.contains(b.date))
                    .collect();
                (s.clone(), PriceSeries::from_bars(s.clone(), bars))
            })
            .collect())
    }

    fn source_name(&self) -> &'static str {
        "stub"
    }
}

/// Reference tables in their own temp directory, removed on drop.
struct TableDir(PathBuf);

impl TableDir {
    fn new() -> Self {
        let dir = std::env::temp_dir().join(format!("stockgains-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("tickers.csv"), TICKERS).unwrap();
        std::fs::write(dir.join("sectors.csv"), SECTORS).unwrap();
        Self(dir)
    }
}

impl Drop for TableDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

/// Router plus the tables it reads; both live as long as the test needs them.
struct TestApp {
    router: Router,
    _tables: TableDir,
}

fn test_app() -> TestApp {
    let tables = TableDir::new();
    let config = DashboardConfig {
        tickers_csv: tables.0.join("tickers.csv"),
        sectors_csv: tables.0.join("sectors.csv"),
        loading_delay_ms: 0,
        chart_width: 320,
        chart_height: 200,
        ..DashboardConfig::default()
    };
    let router = app(AppState::new(
        config,
        Arc::new(StubSource),
        Arc::new(AdditiveForecaster::default()),
    ));
    TestApp {
        router,
        _tables: tables,
    }
}

async fn send(router: Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, json)
}

async fn get(app: TestApp, uri: &str) -> (StatusCode, axum::http::HeaderMap, Value) {
    send(app.router.clone(), uri).await
}

/// Shared in-memory sink for formatted log lines.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

#[test]
fn test_table_dir_is_removed_on_drop() {
    let tables = TableDir::new();
    let path = tables.0.clone();
    assert!(path.join("tickers.csv").exists());

    drop(tables);
    assert!(!path.exists());
}

#[tokio::test]
async fn test_health() {
    let (status, headers, body) = get(test_app(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], "ok");
    assert!(headers.contains_key("x-request-id"));
    assert_eq!(headers["x-frame-options"], "DENY");
}

#[tokio::test]
async fn test_reference_lists() {
    let (status, _, body) = get(test_app(), "/api/companies").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], serde_json::json!(["Acme Corp", "Beta Inc"]));

    let (_, _, body) = get(test_app(), "/api/sectors").await;
    assert_eq!(body["data"], serde_json::json!(["Tech"]));

    let (status, _, body) = get(test_app(), "/api/sectors/Tech/companies").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_unknown_sector_is_404() {
    let (status, _, body) = get(test_app(), "/api/sectors/Mining/companies").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("Mining"));
}

#[tokio::test]
async fn test_prediction_pass() {
    let (status, headers, body) = get(
        test_app(),
        "/api/prediction?company=Acme%20Corp&start=2020-01-01&end=2020-12-31&years=2",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["cache-control"], "no-store");
    let data = &body["data"];
    assert_eq!(data["state"], "forecasted");
    assert_eq!(data["symbol"], "ACME");
    // Section headings on the page are titled with the company name
    assert_eq!(data["company"], "Acme Corp");
    assert_eq!(data["horizon_years"], 2);
    assert_eq!(data["raw_rows"].as_array().unwrap().len(), 60);
    // 2020-02-29 is the 60th day of 2020
    assert_eq!(data["forecast_tail"][9]["date"], "2022-02-28");
    assert!(data["forecast_chart"]["svg"].as_str().unwrap().contains("<svg"));
}

#[tokio::test]
async fn test_prediction_without_company_prompts() {
    let (status, _, body) = get(test_app(), "/api/prediction").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["state"], "prompt_company");
    assert_eq!(body["data"]["message"], "Enter a Stock Name");
}

#[tokio::test]
async fn test_bad_selection_is_400() {
    let (status, _, body) = get(test_app(), "/api/prediction?company=Acme%20Corp&years=7").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _, _) = get(
        test_app(),
        "/api/comparison?sector=Tech&start=2021-01-01&end=2020-01-01",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_comparison_pass() {
    let (status, _, body) = get(
        test_app(),
        "/api/comparison?sector=Tech&companies=Acme%20Corp,Beta%20Inc&start=2020-01-01&end=2020-12-31",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["state"], "rendered");
    assert_eq!(data["symbols"], serde_json::json!(["ACME", "BETA"]));
    assert_eq!(data["chart"]["figure"]["traces"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_missing_reference_table_is_500() {
    let config = DashboardConfig {
        tickers_csv: PathBuf::from("/nonexistent/tickers.csv"),
        loading_delay_ms: 0,
        ..DashboardConfig::default()
    };
    let router = app(AppState::new(
        config,
        Arc::new(StubSource),
        Arc::new(AdditiveForecaster::default()),
    ));

    let (status, _, body) = send(router, "/api/companies").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("tickers.csv"));
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let app = test_app();
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "abc-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "abc-123");
}

#[tokio::test]
async fn test_index_page_is_served() {
    let app = test_app();
    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/html"));

    let (status, _, _) = get(test_app(), "/missing.js").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_request_id_reaches_handler_logs() {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let app = test_app();
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/prediction?company=Acme%20Corp&start=2020-01-01&end=2020-12-31")
                .header("x-request-id", "rid-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let text = logs.contents();
    let line = text
        .lines()
        .find(|l| l.contains("Prediction pass for Acme Corp"))
        .unwrap_or_else(|| panic!("no pass log in:\n{}", text));
    assert!(line.contains("request_id=rid-42"), "{}", line);
    assert!(line.contains("prices from stub"), "{}", line);
}
