use chrono::NaiveDate;
use std::f64::consts::PI;

pub const YEARLY_PERIOD_DAYS: f64 = 365.25;
pub const WEEKLY_PERIOD_DAYS: f64 = 7.0;

/// A Fourier-series seasonal block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Seasonality {
    pub period_days: f64,
    pub order: usize,
}

impl Seasonality {
    pub fn yearly(order: usize) -> Self {
        Self {
            period_days: YEARLY_PERIOD_DAYS,
            order,
        }
    }

    pub fn weekly(order: usize) -> Self {
        Self {
            period_days: WEEKLY_PERIOD_DAYS,
            order,
        }
    }

    /// Number of design-matrix columns (a sine and a cosine per order).
    pub fn width(&self) -> usize {
        2 * self.order
    }

    /// Append `[sin(2πkx/P), cos(2πkx/P)]` for k = 1..=order to `row`.
    pub fn features_into(&self, date: NaiveDate, row: &mut Vec<f64>) {
        let x = epoch_days(date);
        for k in 1..=self.order {
            let angle = 2.0 * PI * k as f64 * x / self.period_days;
            row.push(angle.sin());
            row.push(angle.cos());
        }
    }
}

/// Days since 1970-01-01, so seasonal phase does not depend on the history.
pub fn epoch_days(date: NaiveDate) -> f64 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    (date - epoch).num_days() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weekly_features_repeat_every_seven_days() {
        let s = Seasonality::weekly(3);
        let a = NaiveDate::from_ymd_opt(2020, 3, 2).unwrap();
        let b = a + chrono::Duration::days(7);
        let (mut ra, mut rb) = (Vec::new(), Vec::new());
        s.features_into(a, &mut ra);
        s.features_into(b, &mut rb);
        assert_eq!(ra.len(), 6);
        for (x, y) in ra.iter().zip(&rb) {
            assert!((x - y).abs() < 1e-9);
        }
    }

    #[test]
    fn test_epoch_days() {
        assert_eq!(epoch_days(NaiveDate::from_ymd_opt(1970, 1, 11).unwrap()), 10.0);
        assert_eq!(epoch_days(NaiveDate::from_ymd_opt(1969, 12, 31).unwrap()), -1.0);
    }
}
