//! Figure model for the dashboard charts and the builders that produce them.
//!
//! A [`Figure`] is plain data: the page can draw it client-side from JSON, or
//! the server can turn it into SVG with [`render_svg`].

pub mod svg;

use chrono::NaiveDate;
use market_core::{ForecastResult, PriceSeries};
use serde::{Deserialize, Serialize};

pub use svg::render_svg;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    Line,
    Markers,
    /// Filled region between `points` (lower edge) and `upper`
    Band,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub name: String,
    pub kind: TraceKind,
    pub points: Vec<(NaiveDate, f64)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub upper: Vec<(NaiveDate, f64)>,
}

impl Trace {
    pub fn line(name: impl Into<String>, points: Vec<(NaiveDate, f64)>) -> Self {
        Self {
            name: name.into(),
            kind: TraceKind::Line,
            points,
            upper: Vec::new(),
        }
    }

    pub fn markers(name: impl Into<String>, points: Vec<(NaiveDate, f64)>) -> Self {
        Self {
            name: name.into(),
            kind: TraceKind::Markers,
            points,
            upper: Vec::new(),
        }
    }

    pub fn band(
        name: impl Into<String>,
        lower: Vec<(NaiveDate, f64)>,
        upper: Vec<(NaiveDate, f64)>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: TraceKind::Band,
            points: lower,
            upper,
        }
    }

    fn all_points(&self) -> impl Iterator<Item = &(NaiveDate, f64)> {
        self.points.iter().chain(self.upper.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Figure {
    pub title: String,
    pub x_title: String,
    pub y_title: String,
    pub traces: Vec<Trace>,
}

impl Figure {
    pub fn new(title: impl Into<String>, y_title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            x_title: "Date".to_string(),
            y_title: y_title.into(),
            traces: Vec::new(),
        }
    }

    pub fn with_trace(mut self, trace: Trace) -> Self {
        self.traces.push(trace);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.traces.iter().all(|t| t.points.is_empty() && t.upper.is_empty())
    }

    /// `(first date, last date, min y, max y)` across every trace.
    pub fn bounds(&self) -> Option<(NaiveDate, NaiveDate, f64, f64)> {
        let mut it = self
            .traces
            .iter()
            .flat_map(|t| t.all_points())
            .filter(|(_, y)| y.is_finite());
        let &(d0, y0) = it.next()?;
        Some(it.fold((d0, d0, y0, y0), |(lo, hi, ymin, ymax), &(d, y)| {
            (lo.min(d), hi.max(d), ymin.min(y), ymax.max(y))
        }))
    }
}

/// Open and close lines for the raw history.
pub fn raw_price_figure(company: &str, series: &PriceSeries) -> Figure {
    Figure::new(format!("Time Series Data of {}", company), "Price")
        .with_trace(Trace::line("stock_open", series.open_points()))
        .with_trace(Trace::line("stock_close", series.close_points()))
}

/// Observed closes, the fitted/predicted line and its uncertainty band.
pub fn forecast_figure(
    history: &[(NaiveDate, f64)],
    forecast: &ForecastResult,
    years: u32,
) -> Figure {
    let lower = forecast
        .points
        .iter()
        .map(|p| (p.date, p.predicted_lower))
        .collect();
    let upper = forecast
        .points
        .iter()
        .map(|p| (p.date, p.predicted_upper))
        .collect();
    let predicted = forecast.points.iter().map(|p| (p.date, p.predicted)).collect();

    let title = if years == 1 {
        "Forecast Plot for 1 Year".to_string()
    } else {
        format!("Forecast Plot for {} Years", years)
    };

    Figure::new(title, "Price")
        .with_trace(Trace::band("uncertainty", lower, upper))
        .with_trace(Trace::line("predicted", predicted))
        .with_trace(Trace::markers("actual", history.to_vec()))
}

/// One figure per active component: trend always, yearly and weekly when
/// the model used them. Weekly is drawn over the first week of the horizon.
pub fn component_figures(company: &str, forecast: &ForecastResult) -> Vec<Figure> {
    let title = |name: &str| format!("Forecast Components of {}: {}", company, name);
    let mut out = vec![Figure::new(title("trend"), "trend").with_trace(Trace::line(
        "trend",
        forecast.points.iter().map(|p| (p.date, p.trend)).collect(),
    ))];

    if forecast.yearly_enabled {
        out.push(Figure::new(title("yearly"), "yearly").with_trace(Trace::line(
            "yearly",
            forecast.points.iter().map(|p| (p.date, p.yearly)).collect(),
        )));
    }

    if forecast.weekly_enabled {
        let week: Vec<_> = forecast.future().take(7).map(|p| (p.date, p.weekly)).collect();
        out.push(Figure::new(title("weekly"), "weekly").with_trace(Trace::line("weekly", week)));
    }

    out
}

/// One adjusted-close line per symbol, in the order given.
pub fn comparison_figure<'a>(
    sector: &str,
    series: impl IntoIterator<Item = &'a PriceSeries>,
) -> Figure {
    series.into_iter().fold(
        Figure::new(format!("Sector Comparison: {}", sector), "Adj Close"),
        |fig, s| fig.with_trace(Trace::line(s.symbol.clone(), s.adj_close_points())),
    )
}
