// 🏠 Price Ingestion - Monthly Index to Annual Means
// Parses the monthly property-price sheet and reduces it to one mean per (area, year)

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::normalize::normalize_area;
use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

// ============================================================================
// RECORDS
// ============================================================================

/// One monthly price reading exactly as the sheet carries it
#[derive(Debug, Clone)]
pub struct RawPriceObservation {
    pub area_raw: String,
    pub date: NaiveDate,
    pub price: f64,
}

/// Mean price for one (area, year). At least one monthly observation behind it.
#[derive(Debug, Clone, Serialize)]
pub struct AnnualPriceRecord {
    pub area_norm: String,
    pub area_display: String,
    pub year: i32,
    pub mean_price: f64,
}

// ============================================================================
// SHEET PARSING
// ============================================================================

/// Sheet layout: row 0 names one area per column from column 1 onward,
/// row 1 is a units row, data rows follow with a date in column 0.
const PRICE_DATA_START_ROW: usize = 2;

/// Date spellings seen across exports of the price index
fn parse_price_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    for fmt in ["%Y-%m-%d", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(date);
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(stamp) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(stamp.date());
        }
    }

    // Month-granularity labels ("2002-01", "Jan-02") pin to the first of the month
    if let Ok(date) = NaiveDate::parse_from_str(&format!("{}-01", trimmed), "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(&format!("01-{}", trimmed), "%d-%b-%y") {
        return Some(date);
    }

    None
}

/// Coerce a price cell to a number. Currency symbols and thousands separators
/// are tolerated; anything else becomes missing and the observation is dropped.
fn parse_price_cell(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace(['£', ','], "");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

/// Check the header row before touching any data: at least one area column
/// must exist or the whole dataset would silently come out empty.
fn validate_price_header(header: &csv::StringRecord) -> Result<Vec<(usize, String)>, PipelineError> {
    let mut area_columns = Vec::new();
    for (idx, cell) in header.iter().enumerate().skip(1) {
        let name = cell.trim();
        if !name.is_empty() {
            area_columns.push((idx, name.to_string()));
        }
    }

    if area_columns.is_empty() {
        return Err(PipelineError::schema(
            "price sheet",
            "header row has no area columns (expected one area name per column from column 2)",
        ));
    }

    Ok(area_columns)
}

/// Parse the monthly price sheet into raw observations.
///
/// Rows with an unparseable date are skipped, cells with an unparseable price
/// become missing. Both mirror the coercing reader the sheet was built for.
pub fn parse_price_sheet<R: Read>(reader: R) -> Result<Vec<RawPriceObservation>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut records = csv_reader.records();

    let header = match records.next() {
        Some(record) => record.context("failed to read price sheet header row")?,
        None => {
            return Err(PipelineError::schema("price sheet", "sheet is empty, no header row").into())
        }
    };
    let columns = validate_price_header(&header)?;

    let mut observations = Vec::new();
    for (offset, record) in records.enumerate() {
        let row_idx = offset + 1;
        let record = record.with_context(|| format!("failed to read price sheet row {}", row_idx))?;
        if row_idx < PRICE_DATA_START_ROW {
            continue;
        }

        let date = match record.get(0).and_then(parse_price_date) {
            Some(date) => date,
            None => continue,
        };

        for (col_idx, area_raw) in &columns {
            if let Some(price) = record.get(*col_idx).and_then(parse_price_cell) {
                observations.push(RawPriceObservation {
                    area_raw: area_raw.clone(),
                    date,
                    price,
                });
            }
        }
    }

    Ok(observations)
}

/// Read the price sheet from disk
pub fn load_price_observations<P: AsRef<Path>>(path: P) -> Result<Vec<RawPriceObservation>> {
    let file = File::open(path.as_ref())
        .with_context(|| format!("failed to open price sheet: {:?}", path.as_ref()))?;
    parse_price_sheet(file)
}

// ============================================================================
// ANNUAL AGGREGATION
// ============================================================================

/// Reduce monthly observations to one arithmetic mean per (area, year).
///
/// Observations outside the configured year range or naming an excluded area
/// are dropped. When several raw spellings share one normalized key, the
/// first spelling seen in sheet order becomes the display name for the whole
/// group, so the choice is deterministic.
pub fn aggregate_prices(
    observations: &[RawPriceObservation],
    config: &PipelineConfig,
) -> Vec<AnnualPriceRecord> {
    let mut sums: HashMap<(String, i32), (f64, u32)> = HashMap::new();
    let mut display_names: HashMap<String, String> = HashMap::new();

    for obs in observations {
        let year = obs.date.year();
        if !config.year_in_range(year) || config.is_excluded(&obs.area_raw) {
            continue;
        }

        let area_norm = normalize_area(&obs.area_raw);
        if area_norm.is_empty() {
            continue;
        }

        display_names
            .entry(area_norm.clone())
            .or_insert_with(|| obs.area_raw.clone());

        let entry = sums.entry((area_norm, year)).or_insert((0.0, 0));
        entry.0 += obs.price;
        entry.1 += 1;
    }

    let mut records: Vec<AnnualPriceRecord> = sums
        .into_iter()
        .map(|((area_norm, year), (sum, count))| AnnualPriceRecord {
            area_display: display_names[&area_norm].clone(),
            area_norm,
            year,
            mean_price: sum / count as f64,
        })
        .collect();

    records.sort_by(|a, b| a.area_norm.cmp(&b.area_norm).then(a.year.cmp(&b.year)));
    records
}

// ============================================================================
// TESTS
// ============================================================================
