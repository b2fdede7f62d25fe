use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{DashboardError, DateRange, ForecastResult, PriceSeries};

/// Source of daily price history.
///
/// One call covers every requested symbol. A symbol with no rows in the range
/// maps to an empty series rather than an error.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_prices(
        &self,
        symbols: &[String],
        range: DateRange,
    ) -> Result<HashMap<String, PriceSeries>, DashboardError>;

    fn source_name(&self) -> &'static str;
}

/// Univariate forecaster fitted from scratch on every call.
pub trait Forecaster: Send + Sync {
    /// `history` must be non-empty, strictly increasing in date and free of
    /// non-finite values. The output covers every history date plus each
    /// calendar day up to `history_end + horizon_days`.
    fn forecast(
        &self,
        history: &[(NaiveDate, f64)],
        horizon_days: u32,
    ) -> Result<ForecastResult, DashboardError>;
}

/// Reject symbol lists the fetcher must never see.
pub fn validate_symbols(symbols: &[String]) -> Result<(), DashboardError> {
    if symbols.is_empty() {
        return Err(DashboardError::InvalidSelection(
            "at least one symbol is required".to_string(),
        ));
    }
    if symbols.iter().any(|s| s.trim().is_empty()) {
        return Err(DashboardError::InvalidSelection(
            "symbols must be non-empty strings".to_string(),
        ));
    }
    Ok(())
}
