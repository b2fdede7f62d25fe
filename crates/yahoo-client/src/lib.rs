use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate};
use market_core::{validate_symbols, DashboardError, DateRange, PriceBar, PriceSeries, PriceSource};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;

pub const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const NOT_FOUND_CODE: &str = "Not Found";

#[derive(Clone)]
pub struct YahooFinanceClient {
    client: Client,
    base_url: String,
}

impl YahooFinanceClient {
    pub fn new() -> Self {
        Self::with_config(DEFAULT_BASE_URL, Duration::from_secs(30))
    }

    pub fn with_config(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn chart_url(&self, symbol: &str) -> Result<Url, DashboardError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| DashboardError::Fetch(format!("invalid base url {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| DashboardError::Fetch(format!("base url {} cannot hold a path", self.base_url)))?
            .pop_if_empty()
            .extend(["v8", "finance", "chart", symbol]);
        Ok(url)
    }

    /// Get daily history for one symbol, clipped to `range` (inclusive).
    pub async fn get_daily_history(
        &self,
        symbol: &str,
        range: DateRange,
    ) -> Result<PriceSeries, DashboardError> {
        let url = self.chart_url(symbol)?;
        // Widen the window by a day on each side; exchange-local dates are
        // derived after the fact and clipped back to the range.
        let period1 = unix_midnight(range.start()) - 86_400;
        let period2 = unix_midnight(range.end()) + 2 * 86_400;

        tracing::debug!("GET {} period1={} period2={}", url, period1, period2);

        let response = self
            .client
            .get(url)
            .query(&[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_string()),
                ("includeAdjustedClose", "true".to_string()),
                ("events", "div,split".to_string()),
            ])
            .send()
            .await
            .map_err(|e| DashboardError::Fetch(format!("{}: {}", symbol, e)))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!("Yahoo rate limited request for {}", symbol);
            return Err(DashboardError::Fetch(format!(
                "{}: rate limited by upstream (HTTP 429)",
                symbol
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| DashboardError::Fetch(format!("{}: {}", symbol, e)))?;

        if status == StatusCode::NOT_FOUND {
            // Yahoo answers 404 with a chart error for delisted or unknown symbols
            return match parse_chart(symbol, &body, range) {
                Ok(series) => Ok(series),
                Err(_) => Ok(PriceSeries::empty(symbol)),
            };
        }

        if !status.is_success() {
            tracing::warn!("Yahoo returned HTTP {} for {}", status, symbol);
            return Err(DashboardError::Fetch(format!(
                "{}: HTTP {}: {}",
                symbol,
                status,
                truncate(&body, 200)
            )));
        }

        parse_chart(symbol, &body, range)
    }
}

impl Default for YahooFinanceClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceSource for YahooFinanceClient {
    async fn fetch_prices(
        &self,
        symbols: &[String],
        range: DateRange,
    ) -> Result<HashMap<String, PriceSeries>, DashboardError> {
        validate_symbols(symbols)?;

        let mut out = HashMap::with_capacity(symbols.len());
        // One symbol at a time, no fan-out.
        for symbol in symbols {
            let series = self.get_daily_history(symbol, range).await?;
            tracing::info!(
                "Fetched {} daily bars for {} ({} to {})",
                series.len(),
                symbol,
                range.start(),
                range.end()
            );
            out.insert(symbol.clone(), series);
        }
        Ok(out)
    }

    fn source_name(&self) -> &'static str {
        "yahoo"
    }
}

// ─── Chart API payload ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    #[serde(default)]
    indicators: Indicators,
}

#[derive(Debug, Default, Deserialize)]
struct ChartMeta {
    /// Exchange offset from UTC in seconds
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Default, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteBlock>,
    #[serde(default)]
    adjclose: Vec<AdjCloseBlock>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteBlock {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Default, Deserialize)]
struct AdjCloseBlock {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

/// Decode a chart response body into a series clipped to `range`.
///
/// A "Not Found" chart error or a result without timestamps yields an empty
/// series; any other chart error is a `Fetch` error.
pub fn parse_chart(
    symbol: &str,
    body: &str,
    range: DateRange,
) -> Result<PriceSeries, DashboardError> {
    let envelope: ChartEnvelope = serde_json::from_str(body)
        .map_err(|e| DashboardError::Fetch(format!("{}: undecodable chart response: {}", symbol, e)))?;

    if let Some(err) = envelope.chart.error {
        if err.code == NOT_FOUND_CODE {
            return Ok(PriceSeries::empty(symbol));
        }
        return Err(DashboardError::Fetch(format!(
            "{}: {} {}",
            symbol,
            err.code,
            err.description.unwrap_or_default()
        )));
    }

    let Some(result) = envelope.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(PriceSeries::empty(symbol));
    };

    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let adj = result
        .indicators
        .adjclose
        .into_iter()
        .next()
        .unwrap_or_default();
    let at = |v: &[Option<f64>], i: usize| v.get(i).copied().flatten();

    let mut bars = Vec::with_capacity(result.timestamp.len());
    for (i, &ts) in result.timestamp.iter().enumerate() {
        let Some(date) = local_date(ts, result.meta.gmtoffset) else {
            continue;
        };
        if !range.contains(date) {
            continue;
        }
        bars.push(PriceBar {
            date,
            open: at(&quote.open, i),
            high: at(&quote.high, i),
            low: at(&quote.low, i),
            close: at(&quote.close, i),
            adj_close: at(&adj.adjclose, i),
            volume: at(&quote.volume, i)
                .filter(|v| v.is_finite() && *v >= 0.0)
                .map(|v| v as u64),
        });
    }

    Ok(PriceSeries::from_bars(symbol, bars))
}

fn local_date(ts: i64, gmtoffset: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| (dt.naive_utc() + ChronoDuration::seconds(gmtoffset)).date())
}

fn unix_midnight(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
