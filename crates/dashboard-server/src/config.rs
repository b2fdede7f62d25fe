use anyhow::{Context, Result};
use reference_data::ReferencePaths;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::pipeline::PipelineSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    // Server
    pub bind_addr: String,

    // Reference tables
    pub tickers_csv: PathBuf,
    pub sectors_csv: PathBuf,

    // Upstream market data
    pub yahoo_base_url: String,
    pub http_timeout_secs: u64,

    // Render pass
    pub loading_delay_ms: u64,     // spinner cue before the fetch
    pub forecast_tail_rows: usize, // rows of the forecast table shown
    pub chart_width: u32,
    pub chart_height: u32,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            tickers_csv: PathBuf::from("data/StockStreamTickersData.csv"),
            sectors_csv: PathBuf::from("data/SectorData.csv"),
            yahoo_base_url: yahoo_client::DEFAULT_BASE_URL.to_string(),
            http_timeout_secs: 30,
            loading_delay_ms: 2000,
            forecast_tail_rows: 10,
            chart_width: 960,
            chart_height: 480,
        }
    }
}

impl DashboardConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),

            tickers_csv: env::var("TICKERS_CSV")
                .unwrap_or_else(|_| "data/StockStreamTickersData.csv".to_string())
                .into(),
            sectors_csv: env::var("SECTORS_CSV")
                .unwrap_or_else(|_| "data/SectorData.csv".to_string())
                .into(),

            yahoo_base_url: env::var("YAHOO_BASE_URL")
                .unwrap_or_else(|_| yahoo_client::DEFAULT_BASE_URL.to_string()),
            http_timeout_secs: env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("HTTP_TIMEOUT_SECS must be a whole number of seconds")?,

            loading_delay_ms: env::var("LOADING_DELAY_MS")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()
                .context("LOADING_DELAY_MS must be a whole number of milliseconds")?,
            forecast_tail_rows: env::var("FORECAST_TAIL_ROWS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("FORECAST_TAIL_ROWS must be a non-negative integer")?,
            chart_width: env::var("CHART_WIDTH")
                .unwrap_or_else(|_| "960".to_string())
                .parse()
                .context("CHART_WIDTH must be a pixel count")?,
            chart_height: env::var("CHART_HEIGHT")
                .unwrap_or_else(|_| "480".to_string())
                .parse()
                .context("CHART_HEIGHT must be a pixel count")?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.http_timeout_secs == 0 {
            anyhow::bail!("HTTP_TIMEOUT_SECS must be greater than zero");
        }
        if self.chart_width == 0 || self.chart_height == 0 {
            anyhow::bail!("chart dimensions must be non-zero");
        }
        Ok(())
    }

    pub fn reference_paths(&self) -> ReferencePaths {
        ReferencePaths {
            tickers: self.tickers_csv.clone(),
            sectors: self.sectors_csv.clone(),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            loading_delay: Duration::from_millis(self.loading_delay_ms),
            forecast_tail_rows: self.forecast_tail_rows,
            chart_size: (self.chart_width, self.chart_height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DashboardConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline_settings().loading_delay, Duration::from_secs(2));
        assert_eq!(config.pipeline_settings().chart_size, (960, 480));
        assert_eq!(
            config.reference_paths().tickers,
            PathBuf::from("data/StockStreamTickersData.csv")
        );
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = DashboardConfig {
            http_timeout_secs: 0,
            ..DashboardConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
