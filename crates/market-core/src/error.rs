use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DashboardError {
    /// A static reference table is missing or lacks an expected column.
    #[error("Data load error: {0}")]
    DataLoad(String),

    /// The company name has no entry in the ticker table.
    #[error("No ticker symbol for company: {0}")]
    UnresolvedSymbol(String),

    /// The upstream market-data service failed (network, rate limit, bad body).
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// A valid request returned zero rows.
    #[error("No data returned for {0}")]
    EmptyResult(String),

    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    #[error("Forecast error: {0}")]
    Forecast(String),

    #[error("Render error: {0}")]
    Render(String),
}

pub type DashboardResult<T> = Result<T, DashboardError>;
