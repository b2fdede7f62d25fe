use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::DashboardError;

/// Company name to ticker symbol row from the static ticker table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerRecord {
    pub company_name: String,
    pub symbol: String,
}

/// Sector membership row from the static sector table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorRecord {
    pub sector: String,
    pub company_name: String,
}

/// Daily OHLC bar with adjusted close.
///
/// Individual fields can be null upstream (halted sessions, partial rows). They
/// are kept as-is for the raw table and filtered out when reshaping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub adj_close: Option<f64>,
    #[serde(default)]
    pub volume: Option<u64>,
}

impl PriceBar {
    /// Bar with every price field set to `close`. Handy for fixtures.
    pub fn flat(date: NaiveDate, close: f64) -> Self {
        Self {
            date,
            open: Some(close),
            high: Some(close),
            low: Some(close),
            close: Some(close),
            adj_close: Some(close),
            volume: None,
        }
    }
}

/// Daily price history for one symbol, ascending by date with unique dates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: String,
    pub bars: Vec<PriceBar>,
}

impl PriceSeries {
    pub fn empty(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bars: Vec::new(),
        }
    }

    /// Build a series from unordered bars. Later bars win on duplicate dates.
    pub fn from_bars(symbol: impl Into<String>, mut bars: Vec<PriceBar>) -> Self {
        // stable sort keeps arrival order among equal dates
        bars.sort_by_key(|b| b.date);
        let mut deduped: Vec<PriceBar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match deduped.last_mut() {
                Some(last) if last.date == bar.date => *last = bar,
                _ => deduped.push(bar),
            }
        }
        Self {
            symbol: symbol.into(),
            bars: deduped,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    /// (date, close) pairs with null or non-finite closes dropped.
    pub fn close_points(&self) -> Vec<(NaiveDate, f64)> {
        self.bars
            .iter()
            .filter_map(|b| b.close.filter(|c| c.is_finite()).map(|c| (b.date, c)))
            .collect()
    }

    /// (date, open) pairs with null opens dropped.
    pub fn open_points(&self) -> Vec<(NaiveDate, f64)> {
        self.bars
            .iter()
            .filter_map(|b| b.open.filter(|o| o.is_finite()).map(|o| (b.date, o)))
            .collect()
    }

    /// (date, adjusted close) pairs, falling back to close when the adjusted
    /// value is missing.
    pub fn adj_close_points(&self) -> Vec<(NaiveDate, f64)> {
        self.bars
            .iter()
            .filter_map(|b| {
                b.adj_close
                    .or(b.close)
                    .filter(|v| v.is_finite())
                    .map(|v| (b.date, v))
            })
            .collect()
    }
}

/// Inclusive calendar date range with `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDateRange")]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Deserialize)]
struct RawDateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<RawDateRange> for DateRange {
    type Error = DashboardError;

    fn try_from(raw: RawDateRange) -> Result<Self, Self::Error> {
        Self::new(raw.start, raw.end)
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DashboardError> {
        if start > end {
            return Err(DashboardError::InvalidSelection(format!(
                "start date {} is after end date {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Forecast horizon in whole years, 1 through 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct HorizonYears(u32);

impl HorizonYears {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 4;
    /// Days per horizon year. Calendar days, not trading days.
    pub const DAYS_PER_YEAR: u32 = 365;

    pub fn new(years: u32) -> Result<Self, DashboardError> {
        if !(Self::MIN..=Self::MAX).contains(&years) {
            return Err(DashboardError::InvalidSelection(format!(
                "forecast horizon must be between {} and {} years, got {}",
                Self::MIN,
                Self::MAX,
                years
            )));
        }
        Ok(Self(years))
    }

    pub fn years(&self) -> u32 {
        self.0
    }

    pub fn days(&self) -> u32 {
        self.0 * Self::DAYS_PER_YEAR
    }
}

impl Default for HorizonYears {
    fn default() -> Self {
        Self(Self::MIN)
    }
}

impl TryFrom<u32> for HorizonYears {
    type Error = DashboardError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<HorizonYears> for u32 {
    fn from(h: HorizonYears) -> Self {
        h.0
    }
}

/// One forecast row: prediction, 80% interval and the additive components
/// that sum to `predicted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub predicted: f64,
    pub predicted_lower: f64,
    pub predicted_upper: f64,
    pub trend: f64,
    pub yearly: f64,
    pub weekly: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub points: Vec<ForecastPoint>,
    /// Last observed date fed into the model
    pub history_end: NaiveDate,
    pub horizon_days: u32,
    pub yearly_enabled: bool,
    pub weekly_enabled: bool,
}

impl ForecastResult {
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    /// Last `n` rows, the table shown under the forecast heading.
    pub fn tail(&self, n: usize) -> &[ForecastPoint] {
        let start = self.points.len().saturating_sub(n);
        &self.points[start..]
    }

    /// Rows strictly after the observed history.
    pub fn future(&self) -> impl Iterator<Item = &ForecastPoint> {
        let end = self.history_end;
        self.points.iter().filter(move |p| p.date > end)
    }

    /// Date the horizon should reach: `history_end + horizon_days`.
    pub fn horizon_end(&self) -> NaiveDate {
        self.history_end + Duration::days(i64::from(self.horizon_days))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Prediction,
    Comparison,
}

impl Mode {
    pub fn label(&self) -> &'static str {
        match self {
            Mode::Prediction => "Stock Prediction",
            Mode::Comparison => "Comparative Metrics",
        }
    }
}

/// Immutable snapshot of the user's choices for one render pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Selection {
    Prediction {
        range: DateRange,
        company: Option<String>,
        horizon: HorizonYears,
    },
    Comparison {
        range: DateRange,
        sector: Option<String>,
        companies: Vec<String>,
    },
}

impl Selection {
    pub fn mode(&self) -> Mode {
        match self {
            Selection::Prediction { .. } => Mode::Prediction,
            Selection::Comparison { .. } => Mode::Comparison,
        }
    }

    pub fn range(&self) -> DateRange {
        match self {
            Selection::Prediction { range, .. } | Selection::Comparison { range, .. } => *range,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_date_range_rejects_inverted() {
        assert!(DateRange::new(d(2020, 1, 2), d(2020, 1, 1)).is_err());
        let same = DateRange::new(d(2020, 1, 1), d(2020, 1, 1)).unwrap();
        assert!(same.contains(d(2020, 1, 1)));
        assert!(!same.contains(d(2020, 1, 2)));
    }

    #[test]
    fn test_horizon_bounds() {
        assert!(HorizonYears::new(0).is_err());
        assert!(HorizonYears::new(5).is_err());
        assert_eq!(HorizonYears::new(3).unwrap().days(), 1095);
        assert_eq!(HorizonYears::default().years(), 1);
    }

    #[test]
    fn test_horizon_deserialize_validates() {
        let ok: HorizonYears = serde_json::from_str("2").unwrap();
        assert_eq!(ok.years(), 2);
        assert!(serde_json::from_str::<HorizonYears>("7").is_err());
    }

    #[test]
    fn test_series_sorted_and_deduped() {
        let mut late = PriceBar::flat(d(2020, 1, 3), 10.0);
        late.close = Some(11.0);
        let series = PriceSeries::from_bars(
            "ACME",
            vec![
                PriceBar::flat(d(2020, 1, 3), 10.0),
                PriceBar::flat(d(2020, 1, 1), 9.0),
                late,
            ],
        );
        assert_eq!(series.len(), 2);
        assert_eq!(series.first_date(), Some(d(2020, 1, 1)));
        assert_eq!(series.bars[1].close, Some(11.0));
    }

    #[test]
    fn test_close_points_drop_nulls() {
        let mut gap = PriceBar::flat(d(2020, 1, 2), 5.0);
        gap.close = None;
        gap.adj_close = None;
        let mut nan = PriceBar::flat(d(2020, 1, 3), 5.0);
        nan.close = Some(f64::NAN);
        let series = PriceSeries::from_bars(
            "ACME",
            vec![PriceBar::flat(d(2020, 1, 1), 4.0), gap, nan],
        );
        assert_eq!(series.close_points(), vec![(d(2020, 1, 1), 4.0)]);
    }

    #[test]
    fn test_adj_close_falls_back_to_close() {
        let mut bar = PriceBar::flat(d(2020, 1, 1), 7.0);
        bar.adj_close = None;
        let series = PriceSeries::from_bars("ACME", vec![bar]);
        assert_eq!(series.adj_close_points(), vec![(d(2020, 1, 1), 7.0)]);
    }

    #[test]
    fn test_selection_serde_tag() {
        let sel = Selection::Comparison {
            range: DateRange::new(d(2020, 1, 1), d(2020, 12, 31)).unwrap(),
            sector: Some("Tech".into()),
            companies: vec!["Acme Corp".into()],
        };
        let json = serde_json::to_value(&sel).unwrap();
        assert_eq!(json["mode"], "comparison");
        assert_eq!(sel.mode(), Mode::Comparison);
    }
}
