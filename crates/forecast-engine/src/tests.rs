use chrono::{Datelike, Duration, NaiveDate, Weekday};
use market_core::{DashboardError, Forecaster, HorizonYears};

use crate::{AdditiveForecaster, ForecastConfig};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// Weekdays from `start` until `count` rows are produced.
fn trading_days(start: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut out = Vec::with_capacity(count);
    let mut date = start;
    while out.len() < count {
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            out.push(date);
        }
        date += Duration::days(1);
    }
    out
}

fn linear_history(start: NaiveDate, days: i64) -> Vec<(NaiveDate, f64)> {
    (0..days)
        .map(|i| (start + Duration::days(i), 100.0 + 0.5 * i as f64))
        .collect()
}

#[test]
fn test_horizon_extends_exactly_by_calendar_days() {
    let history = linear_history(d(2020, 1, 1), 120);
    let last = history.last().unwrap().0;

    for years in 1..=4 {
        let horizon = HorizonYears::new(years).unwrap();
        let result = AdditiveForecaster::default()
            .forecast(&history, horizon.days())
            .unwrap();

        assert_eq!(result.last_date(), Some(last + Duration::days(365 * years as i64)));
        assert_eq!(result.horizon_end(), last + Duration::days(365 * years as i64));
        assert_eq!(result.future().count(), 365 * years as usize);
        assert_eq!(result.points.len(), history.len() + 365 * years as usize);
    }
}

#[test]
fn test_output_dates_strictly_increasing() {
    let dates = trading_days(d(2020, 1, 1), 252);
    let history: Vec<_> = dates
        .iter()
        .enumerate()
        .map(|(i, d)| (*d, 50.0 + (i as f64 / 10.0).sin()))
        .collect();

    let result = AdditiveForecaster::default().forecast(&history, 365).unwrap();

    assert!(result.points.windows(2).all(|w| w[0].date < w[1].date));
}

#[test]
fn test_one_year_of_trading_days_reaches_year_end() {
    // 262 weekdays in 2020; drop ten early ones to stand in for holidays
    let weekdays = trading_days(d(2020, 1, 1), 262);
    assert_eq!(weekdays.last(), Some(&d(2020, 12, 31)));
    let dates = &weekdays[10..];
    assert_eq!(dates.len(), 252);
    let history: Vec<_> = dates
        .iter()
        .enumerate()
        .map(|(i, d)| (*d, 10.0 + 0.01 * i as f64))
        .collect();

    let result = AdditiveForecaster::default()
        .forecast(&history, HorizonYears::new(1).unwrap().days())
        .unwrap();

    assert!(result.last_date().unwrap() >= d(2021, 12, 31));
    assert!(result.weekly_enabled);
    assert!(!result.yearly_enabled);
}

#[test]
fn test_linear_trend_extrapolates() {
    let history = linear_history(d(2021, 1, 1), 200);
    let result = AdditiveForecaster::default().forecast(&history, 100).unwrap();

    let last = result.points.last().unwrap();
    let expected = 100.0 + 0.5 * 299.0;
    assert!(
        (last.predicted - expected).abs() < 1.0,
        "predicted {} vs expected {}",
        last.predicted,
        expected
    );

    let first = &result.points[0];
    assert!((first.predicted - 100.0).abs() < 1.0);
}

#[test]
fn test_components_sum_to_prediction() {
    let start = d(2018, 1, 1);
    let history: Vec<_> = (0..(3 * 365))
        .map(|i| {
            let x = i as f64;
            let y = 200.0 + 0.05 * x + 10.0 * (2.0 * std::f64::consts::PI * x / 365.25).sin();
            (start + Duration::days(i), y)
        })
        .collect();

    let result = AdditiveForecaster::default().forecast(&history, 365).unwrap();

    assert!(result.yearly_enabled);
    for p in &result.points {
        assert!((p.trend + p.yearly + p.weekly - p.predicted).abs() < 1e-6);
    }
    let yearly_peak = result
        .points
        .iter()
        .map(|p| p.yearly.abs())
        .fold(0.0_f64, f64::max);
    assert!(yearly_peak > 5.0, "yearly component too small: {}", yearly_peak);
}

#[test]
fn test_interval_brackets_prediction_and_widens() {
    let history: Vec<_> = (0..300)
        .map(|i| {
            let noise = if i % 2 == 0 { 1.5 } else { -1.5 };
            (d(2020, 1, 1) + Duration::days(i), 100.0 + 0.1 * i as f64 + noise)
        })
        .collect();

    let result = AdditiveForecaster::default().forecast(&history, 365).unwrap();

    for p in &result.points {
        assert!(p.predicted_lower <= p.predicted && p.predicted <= p.predicted_upper);
    }
    let width = |p: &market_core::ForecastPoint| p.predicted_upper - p.predicted_lower;
    let at_end_of_history = &result.points[history.len() - 1];
    let at_horizon = result.points.last().unwrap();
    assert!(width(at_horizon) > width(at_end_of_history));
}

#[test]
fn test_rejects_bad_history() {
    let f = AdditiveForecaster::default();

    assert!(matches!(
        f.forecast(&[], 365),
        Err(DashboardError::Forecast(_))
    ));
    assert!(f.forecast(&[(d(2020, 1, 1), 1.0)], 365).is_err());
    assert!(f
        .forecast(&[(d(2020, 1, 2), 1.0), (d(2020, 1, 1), 2.0)], 365)
        .is_err());
    assert!(f
        .forecast(&[(d(2020, 1, 1), 1.0), (d(2020, 1, 1), 2.0)], 365)
        .is_err());
    assert!(f
        .forecast(&[(d(2020, 1, 1), 1.0), (d(2020, 1, 2), f64::NAN)], 365)
        .is_err());
}

#[test]
fn test_two_points_fit() {
    let result = AdditiveForecaster::default()
        .forecast(&[(d(2020, 1, 1), 10.0), (d(2020, 1, 3), 12.0)], 365)
        .unwrap();
    assert_eq!(result.points.len(), 367);
    assert!(!result.weekly_enabled);
}

#[test]
fn test_invalid_interval_width() {
    let f = AdditiveForecaster::new(ForecastConfig {
        interval_width: 1.5,
        ..ForecastConfig::default()
    });
    assert!(f.forecast(&linear_history(d(2020, 1, 1), 30), 365).is_err());
}

#[test]
fn test_refits_every_call() {
    let f = AdditiveForecaster::default();
    let a = f.forecast(&linear_history(d(2020, 1, 1), 60), 365).unwrap();
    let flat: Vec<_> = (0..60)
        .map(|i| (d(2020, 1, 1) + Duration::days(i), 42.0))
        .collect();
    let b = f.forecast(&flat, 365).unwrap();
    assert!((b.points.last().unwrap().predicted - 42.0).abs() < 0.5);
    assert!(a.points.last().unwrap().predicted > 200.0);
}
