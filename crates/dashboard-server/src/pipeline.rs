//! One render pass per request.
//!
//! A pass takes an immutable [`Selection`], the reference tables and the two
//! collaborators, and walks the state machine for its mode:
//!
//! ```text
//! prediction:  Idle -> CompanySelected -> DataFetched -> Forecasted
//!                   \-> PromptCompany       |   \-> NoData / ForecastFailed
//!                                           \-> FetchFailed
//! comparison:  Idle -> SectorSelected -> CompaniesSelected -> DataFetched -> Rendered
//!                   \-> PromptSector     \-> PromptCompanies  \-> NoMatchingSymbols
//! ```
//!
//! Every failure past selection ends in a state the page can show; nothing
//! here returns an error.

use std::collections::HashSet;
use std::time::Duration;

use chart_renderer::{
    comparison_figure, component_figures, forecast_figure, raw_price_figure, render_svg, Figure,
};
use chrono::NaiveDate;
use forecast_engine::MIN_HISTORY;
use market_core::{
    DashboardError, DateRange, ForecastPoint, Forecaster, HorizonYears, PriceBar, PriceSeries,
    PriceSource, Selection,
};
use reference_data::ReferenceData;
use serde::Serialize;

pub const PROMPT_COMPANY: &str = "Enter a Stock Name";
pub const PROMPT_SECTOR: &str = "Select a Sector";
pub const PROMPT_COMPANIES: &str = "Pick Your Assets";

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub loading_delay: Duration,
    pub forecast_tail_rows: usize,
    pub chart_size: (u32, u32),
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            loading_delay: Duration::from_secs(2),
            forecast_tail_rows: 10,
            chart_size: (960, 480),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    CompanySelected,
    SectorSelected,
    CompaniesSelected,
    DataFetched,
    Forecasted,
    Rendered,
    PromptCompany,
    PromptSector,
    PromptCompanies,
    NoMatchingSymbols,
    NoData,
    FetchFailed,
    ForecastFailed,
}

/// A figure plus its server-side SVG, when rendering succeeded.
#[derive(Debug, Clone, Serialize)]
pub struct ChartView {
    pub figure: Figure,
    pub svg: Option<String>,
}

impl ChartView {
    fn render(figure: Figure, size: (u32, u32)) -> Self {
        let svg = match render_svg(&figure, size) {
            Ok(svg) => Some(svg),
            Err(e) => {
                tracing::warn!("Chart '{}' not rendered: {}", figure.title, e);
                None
            }
        };
        Self { figure, svg }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionView {
    pub company: String,
    pub symbol: String,
    pub range: DateRange,
    pub horizon_years: u32,
    pub raw_rows: Vec<PriceBar>,
    pub raw_chart: ChartView,
    pub forecast_tail: Vec<ForecastPoint>,
    pub forecast_chart: ChartView,
    pub component_charts: Vec<ChartView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PredictionOutcome {
    PromptCompany {
        company: Option<String>,
        message: String,
    },
    NoData {
        company: String,
        symbol: String,
        message: String,
    },
    FetchFailed {
        company: String,
        symbol: String,
        message: String,
    },
    ForecastFailed {
        company: String,
        symbol: String,
        message: String,
    },
    Forecasted(Box<PredictionView>),
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonView {
    pub sector: String,
    pub range: DateRange,
    pub symbols: Vec<String>,
    /// Symbols the upstream had no rows for
    pub empty_symbols: Vec<String>,
    pub chart: ChartView,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ComparisonOutcome {
    PromptSector {
        message: String,
    },
    PromptCompanies {
        sector: String,
        candidates: Vec<String>,
        message: String,
    },
    NoMatchingSymbols {
        sector: String,
        candidates: Vec<String>,
        message: String,
    },
    NoData {
        sector: String,
        symbols: Vec<String>,
        message: String,
    },
    FetchFailed {
        sector: String,
        symbols: Vec<String>,
        message: String,
    },
    Rendered(Box<ComparisonView>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PassOutcome {
    Prediction(PredictionOutcome),
    Comparison(ComparisonOutcome),
}

/// Outcome of a pass together with the states it went through.
#[derive(Debug, Clone, Serialize)]
pub struct RenderPass<O> {
    #[serde(flatten)]
    pub outcome: O,
    pub transitions: Vec<PipelineState>,
}

impl<O> RenderPass<O> {
    pub fn final_state(&self) -> PipelineState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(PipelineState::Idle)
    }
}

struct Transitions(Vec<PipelineState>);

impl Transitions {
    fn start() -> Self {
        Self(vec![PipelineState::Idle])
    }

    fn push(&mut self, state: PipelineState) {
        tracing::debug!("Pipeline -> {:?}", state);
        self.0.push(state);
    }

    fn finish<O>(mut self, state: PipelineState, outcome: O) -> RenderPass<O> {
        self.push(state);
        RenderPass {
            outcome,
            transitions: self.0,
        }
    }
}

/// Dispatch on the selection's mode.
pub async fn run_pass(
    selection: &Selection,
    reference: &ReferenceData,
    prices: &dyn PriceSource,
    forecaster: &dyn Forecaster,
    settings: &PipelineSettings,
) -> RenderPass<PassOutcome> {
    match selection {
        Selection::Prediction {
            range,
            company,
            horizon,
        } => {
            let pass = run_prediction(
                *range,
                company.as_deref(),
                *horizon,
                reference,
                prices,
                forecaster,
                settings,
            )
            .await;
            RenderPass {
                outcome: PassOutcome::Prediction(pass.outcome),
                transitions: pass.transitions,
            }
        }
        Selection::Comparison {
            range,
            sector,
            companies,
        } => {
            let pass = run_comparison(
                *range,
                sector.as_deref(),
                companies,
                reference,
                prices,
                settings,
            )
            .await;
            RenderPass {
                outcome: PassOutcome::Comparison(pass.outcome),
                transitions: pass.transitions,
            }
        }
    }
}

/// Prediction mode: fetch one company, forecast its closes, build the
/// raw and forecast views.
pub async fn run_prediction(
    range: DateRange,
    company: Option<&str>,
    horizon: HorizonYears,
    reference: &ReferenceData,
    prices: &dyn PriceSource,
    forecaster: &dyn Forecaster,
    settings: &PipelineSettings,
) -> RenderPass<PredictionOutcome> {
    let mut states = Transitions::start();

    let company = company.map(str::trim).filter(|c| !c.is_empty());
    let Some(company) = company else {
        return states.finish(
            PipelineState::PromptCompany,
            PredictionOutcome::PromptCompany {
                company: None,
                message: PROMPT_COMPANY.to_string(),
            },
        );
    };

    let symbol = match reference.tickers.resolve(company) {
        Ok(symbol) => symbol.to_string(),
        Err(e) => {
            tracing::debug!("{}", e);
            return states.finish(
                PipelineState::PromptCompany,
                PredictionOutcome::PromptCompany {
                    company: Some(company.to_string()),
                    message: PROMPT_COMPANY.to_string(),
                },
            );
        }
    };
    states.push(PipelineState::CompanySelected);

    tracing::info!(
        "Prediction pass for {} ({}) from {} to {}, {} year horizon, prices from {}",
        company,
        symbol,
        range.start(),
        range.end(),
        horizon.years(),
        prices.source_name()
    );

    loading_delay(settings).await;

    let series = match prices.fetch_prices(&[symbol.clone()], range).await {
        Ok(mut map) => map
            .remove(&symbol)
            .unwrap_or_else(|| PriceSeries::empty(symbol.clone())),
        Err(e) => {
            tracing::warn!("Fetch for {} failed: {}", symbol, e);
            return states.finish(
                PipelineState::FetchFailed,
                PredictionOutcome::FetchFailed {
                    company: company.to_string(),
                    symbol,
                    message: e.to_string(),
                },
            );
        }
    };
    states.push(PipelineState::DataFetched);

    if series.is_empty() {
        return states.finish(
            PipelineState::NoData,
            PredictionOutcome::NoData {
                company: company.to_string(),
                message: DashboardError::EmptyResult(format!(
                    "{} between {} and {}",
                    symbol,
                    range.start(),
                    range.end()
                ))
                .to_string(),
                symbol,
            },
        );
    }

    let history = series.close_points();
    if history.len() < MIN_HISTORY {
        return states.finish(
            PipelineState::NoData,
            PredictionOutcome::NoData {
                company: company.to_string(),
                message: format!(
                    "{} closing prices for {}, at least {} needed to forecast",
                    history.len(),
                    symbol,
                    MIN_HISTORY
                ),
                symbol,
            },
        );
    }

    let forecast = match forecaster.forecast(&history, horizon.days()) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!("Forecast for {} failed: {}", symbol, e);
            return states.finish(
                PipelineState::ForecastFailed,
                PredictionOutcome::ForecastFailed {
                    company: company.to_string(),
                    symbol,
                    message: e.to_string(),
                },
            );
        }
    };

    let size = settings.chart_size;
    let view = PredictionView {
        company: company.to_string(),
        range,
        horizon_years: horizon.years(),
        raw_chart: ChartView::render(raw_price_figure(company, &series), size),
        forecast_tail: forecast.tail(settings.forecast_tail_rows).to_vec(),
        forecast_chart: ChartView::render(
            forecast_figure(&history, &forecast, horizon.years()),
            size,
        ),
        component_charts: component_figures(company, &forecast)
            .into_iter()
            .map(|fig| ChartView::render(fig, size))
            .collect(),
        raw_rows: series.bars,
        symbol,
    };

    tracing::info!(
        "Forecasted {} on {} rows through {}",
        view.symbol,
        view.raw_rows.len(),
        forecast.horizon_end()
    );

    states.finish(
        PipelineState::Forecasted,
        PredictionOutcome::Forecasted(Box::new(view)),
    )
}

/// Comparison mode: one fetch for every picked company in the sector, one
/// adjusted-close line per symbol.
pub async fn run_comparison(
    range: DateRange,
    sector: Option<&str>,
    companies: &[String],
    reference: &ReferenceData,
    prices: &dyn PriceSource,
    settings: &PipelineSettings,
) -> RenderPass<ComparisonOutcome> {
    let mut states = Transitions::start();

    let Some(sector) = sector.map(str::trim).filter(|s| !s.is_empty()) else {
        return states.finish(
            PipelineState::PromptSector,
            ComparisonOutcome::PromptSector {
                message: PROMPT_SECTOR.to_string(),
            },
        );
    };
    states.push(PipelineState::SectorSelected);

    let candidates = reference.sectors.companies(sector).to_vec();
    let picked: Vec<&str> = companies
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .collect();
    if picked.is_empty() {
        return states.finish(
            PipelineState::PromptCompanies,
            ComparisonOutcome::PromptCompanies {
                sector: sector.to_string(),
                candidates,
                message: PROMPT_COMPANIES.to_string(),
            },
        );
    }
    states.push(PipelineState::CompaniesSelected);

    let allowed: HashSet<&str> = candidates.iter().map(String::as_str).collect();
    let (in_sector, outside): (Vec<&str>, Vec<&str>) =
        picked.into_iter().partition(|c| allowed.contains(c));
    if !outside.is_empty() {
        tracing::debug!("Dropped companies outside {}: {:?}", sector, outside);
    }

    let symbols = reference.tickers.resolve_all(&in_sector);
    if symbols.is_empty() {
        return states.finish(
            PipelineState::NoMatchingSymbols,
            ComparisonOutcome::NoMatchingSymbols {
                sector: sector.to_string(),
                candidates,
                message: "None of the selected companies has a ticker symbol".to_string(),
            },
        );
    }

    tracing::info!(
        "Comparison pass for {} with {} symbols from {} to {}, prices from {}",
        sector,
        symbols.len(),
        range.start(),
        range.end(),
        prices.source_name()
    );

    loading_delay(settings).await;

    let mut fetched = match prices.fetch_prices(&symbols, range).await {
        Ok(map) => map,
        Err(e) => {
            tracing::warn!("Fetch for {} failed: {}", sector, e);
            return states.finish(
                PipelineState::FetchFailed,
                ComparisonOutcome::FetchFailed {
                    sector: sector.to_string(),
                    symbols,
                    message: e.to_string(),
                },
            );
        }
    };
    states.push(PipelineState::DataFetched);

    let (series, empty_symbols): (Vec<PriceSeries>, Vec<PriceSeries>) = symbols
        .iter()
        .map(|s| {
            fetched
                .remove(s)
                .unwrap_or_else(|| PriceSeries::empty(s.clone()))
        })
        .partition(|s| !s.is_empty());

    if series.is_empty() {
        return states.finish(
            PipelineState::NoData,
            ComparisonOutcome::NoData {
                sector: sector.to_string(),
                message: DashboardError::EmptyResult(format!(
                    "{} between {} and {}",
                    symbols.join(", "),
                    range.start(),
                    range.end()
                ))
                .to_string(),
                symbols,
            },
        );
    }

    let chart = ChartView::render(comparison_figure(sector, &series), settings.chart_size);
    let view = ComparisonView {
        sector: sector.to_string(),
        range,
        symbols: series.iter().map(|s| s.symbol.clone()).collect(),
        empty_symbols: empty_symbols.into_iter().map(|s| s.symbol).collect(),
        chart,
    };

    states.finish(
        PipelineState::Rendered,
        ComparisonOutcome::Rendered(Box::new(view)),
    )
}

async fn loading_delay(settings: &PipelineSettings) {
    if !settings.loading_delay.is_zero() {
        tokio::time::sleep(settings.loading_delay).await;
    }
}

/// Default range start when the page sends none.
pub fn default_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN)
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod pipeline_tests;
