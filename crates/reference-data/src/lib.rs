//! Static reference tables: company → ticker symbol and sector → companies.
//!
//! Both tables are small CSV files read at the start of every render pass.

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use market_core::{DashboardError, SectorRecord, TickerRecord};
use serde::Serialize;

pub const COMPANY_COLUMN: &str = "Company Name";
pub const SYMBOL_COLUMN: &str = "Symbol";
pub const SECTOR_COLUMN: &str = "Sector";

/// Company name → symbol lookup, keeping the file's row order for display.
#[derive(Debug, Clone, Default)]
pub struct TickerMap {
    records: Vec<TickerRecord>,
    index: HashMap<String, usize>,
}

impl TickerMap {
    pub fn from_records(records: impl IntoIterator<Item = TickerRecord>) -> Self {
        let mut map = Self::default();
        for record in records {
            map.insert(record);
        }
        map
    }

    /// Parse a ticker table with `Company Name` and `Symbol` columns.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DashboardError> {
        let mut rdr = csv_reader(reader);
        let headers = read_headers(&mut rdr)?;
        let name_idx = column_index(&headers, COMPANY_COLUMN)?;
        let symbol_idx = column_index(&headers, SYMBOL_COLUMN)?;

        let mut map = Self::default();
        for result in rdr.records() {
            let record = result.map_err(|e| DashboardError::DataLoad(e.to_string()))?;
            let company_name = record.get(name_idx).unwrap_or("").trim();
            let symbol = record.get(symbol_idx).unwrap_or("").trim();
            if company_name.is_empty() || symbol.is_empty() {
                continue;
            }
            map.insert(TickerRecord {
                company_name: company_name.to_string(),
                symbol: symbol.to_string(),
            });
        }

        Ok(map)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DashboardError> {
        Self::from_reader(open(path.as_ref())?)
    }

    fn insert(&mut self, record: TickerRecord) {
        if self.index.contains_key(&record.company_name) {
            tracing::warn!(
                "Duplicate ticker row for '{}', keeping the first symbol",
                record.company_name
            );
            return;
        }
        self.index
            .insert(record.company_name.clone(), self.records.len());
        self.records.push(record);
    }

    /// Symbol for a company, or `UnresolvedSymbol`.
    pub fn resolve(&self, company_name: &str) -> Result<&str, DashboardError> {
        self.index
            .get(company_name.trim())
            .map(|&i| self.records[i].symbol.as_str())
            .ok_or_else(|| DashboardError::UnresolvedSymbol(company_name.to_string()))
    }

    /// Resolve every name it can and drop the rest. The result never contains
    /// an empty symbol and keeps the first occurrence of repeated symbols.
    pub fn resolve_all<S: AsRef<str>>(&self, company_names: &[S]) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut symbols = Vec::new();
        for name in company_names {
            match self.resolve(name.as_ref()) {
                Ok(symbol) => {
                    if seen.insert(symbol.to_string()) {
                        symbols.push(symbol.to_string());
                    }
                }
                Err(_) => tracing::debug!("Dropping unresolved company '{}'", name.as_ref()),
            }
        }
        symbols
    }

    pub fn company_names(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.company_name.as_str())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Sector → member companies. Sectors keep first-seen order.
#[derive(Debug, Clone, Default)]
pub struct SectorMap {
    sectors: Vec<String>,
    members: HashMap<String, Vec<String>>,
}

impl SectorMap {
    pub fn from_records(records: impl IntoIterator<Item = SectorRecord>) -> Self {
        let mut map = Self::default();
        for record in records {
            map.insert(record);
        }
        map
    }

    /// Parse a sector table with `Sector` and `Company Name` columns.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DashboardError> {
        let mut rdr = csv_reader(reader);
        let headers = read_headers(&mut rdr)?;
        let sector_idx = column_index(&headers, SECTOR_COLUMN)?;
        let name_idx = column_index(&headers, COMPANY_COLUMN)?;

        let mut map = Self::default();
        for result in rdr.records() {
            let record = result.map_err(|e| DashboardError::DataLoad(e.to_string()))?;
            let sector = record.get(sector_idx).unwrap_or("").trim();
            let company_name = record.get(name_idx).unwrap_or("").trim();
            if sector.is_empty() || company_name.is_empty() {
                continue;
            }
            map.insert(SectorRecord {
                sector: sector.to_string(),
                company_name: company_name.to_string(),
            });
        }

        Ok(map)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DashboardError> {
        Self::from_reader(open(path.as_ref())?)
    }

    fn insert(&mut self, record: SectorRecord) {
        let members = self.members.entry(record.sector.clone()).or_default();
        if members.is_empty() {
            self.sectors.push(record.sector);
        }
        if !members.contains(&record.company_name) {
            members.push(record.company_name);
        }
    }

    pub fn sectors(&self) -> &[String] {
        &self.sectors
    }

    /// Companies listed under `sector`; empty for an unknown sector.
    pub fn companies(&self, sector: &str) -> &[String] {
        self.members
            .get(sector.trim())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains_sector(&self, sector: &str) -> bool {
        self.members.contains_key(sector.trim())
    }
}

/// Locations of the two reference tables.
#[derive(Debug, Clone, Serialize)]
pub struct ReferencePaths {
    pub tickers: PathBuf,
    pub sectors: PathBuf,
}

/// Both tables, loaded together at the start of a render pass.
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    pub tickers: TickerMap,
    pub sectors: SectorMap,
}

impl ReferenceData {
    pub fn load(paths: &ReferencePaths) -> Result<Self, DashboardError> {
        let tickers = TickerMap::load(&paths.tickers)?;
        let sectors = SectorMap::load(&paths.sectors)?;
        tracing::debug!(
            "Loaded {} tickers and {} sectors",
            tickers.len(),
            sectors.sectors().len()
        );
        Ok(Self { tickers, sectors })
    }
}

fn open(path: &Path) -> Result<File, DashboardError> {
    File::open(path)
        .map_err(|e| DashboardError::DataLoad(format!("cannot open {}: {}", path.display(), e)))
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader)
}

fn read_headers<R: Read>(rdr: &mut csv::Reader<R>) -> Result<csv::StringRecord, DashboardError> {
    rdr.headers()
        .cloned()
        .map_err(|e| DashboardError::DataLoad(format!("malformed header row: {}", e)))
}

fn column_index(headers: &csv::StringRecord, column: &str) -> Result<usize, DashboardError> {
    headers
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}').trim() == column)
        .ok_or_else(|| DashboardError::DataLoad(format!("missing column '{}'", column)))
}
