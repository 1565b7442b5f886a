// 💷 Income Ingestion - Weekly Survey to Annual Figures
// Unpivots the wide earnings survey and annualizes weekly pay per (area, year)

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::normalize::normalize_area;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

const WEEKS_PER_YEAR: f64 = 52.0;
const MONTHS_PER_YEAR: f64 = 12.0;

// ============================================================================
// RECORDS
// ============================================================================

/// One (area, year) weekly-pay cell after the wide table is unpivoted.
/// Carries the source row's area code so aggregation can filter genuine
/// area rows from national and regional totals.
#[derive(Debug, Clone)]
pub struct RawIncomeObservation {
    pub area_raw: String,
    pub area_code: String,
    pub year: i32,
    pub weekly_income: Option<f64>,
}

/// Annualized income for one (area, year)
#[derive(Debug, Clone, Serialize)]
pub struct AnnualIncomeRecord {
    pub area_norm: String,
    pub year: i32,
    pub annual_income: f64,
    pub monthly_income: f64,
}

// ============================================================================
// SHEET PARSING
// ============================================================================

/// A usable pay column: its position and the year it belongs to
#[derive(Debug, Clone, Copy, PartialEq)]
struct PayColumn {
    index: usize,
    year: i32,
}

/// Scan the two-level header for pay columns.
///
/// The outer level carries year labels, blank across merged spans, so the
/// last seen label is carried forward. The inner level names the metric;
/// only columns whose label starts with "Pay" hold usable figures (the
/// sibling columns are confidence metadata). Finding none is fatal: a
/// silently empty income table would make every year invisible downstream
/// with no explanation.
fn locate_pay_columns(
    outer: &csv::StringRecord,
    inner: &csv::StringRecord,
) -> Result<Vec<PayColumn>, PipelineError> {
    let mut pay_columns = Vec::new();
    let mut current_year_label: Option<String> = None;

    for idx in 0..outer.len().max(inner.len()) {
        let outer_label = outer.get(idx).map(str::trim).unwrap_or("");
        if !outer_label.is_empty() {
            current_year_label = Some(outer_label.to_string());
        }

        // Columns 0 and 1 are the area code and display name
        if idx < 2 {
            continue;
        }

        let inner_label = inner.get(idx).map(str::trim).unwrap_or("");
        if !inner_label.to_lowercase().starts_with("pay") {
            continue;
        }

        let year_label = current_year_label.as_deref().ok_or_else(|| {
            PipelineError::schema(
                "income sheet",
                format!("pay column {} has no year label above it", idx + 1),
            )
        })?;
        let year = year_label.parse::<i32>().map_err(|_| {
            PipelineError::schema(
                "income sheet",
                format!("pay column has a non-numeric year label: '{}'", year_label),
            )
        })?;

        pay_columns.push(PayColumn { index: idx, year });
    }

    if pay_columns.is_empty() {
        return Err(PipelineError::schema(
            "income sheet",
            "no Pay columns found in the header; expected one 'Pay (£)' column per year",
        ));
    }

    Ok(pay_columns)
}

/// Survey cells use a comma as the decimal separator; `!` and `#` mark
/// suppressed or low-quality estimates. Anything that does not parse after
/// the comma swap is missing.
fn parse_income_cell(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace(',', ".");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

/// Genuine area rows carry a code shaped `00` plus two uppercase
/// alphanumerics. National and regional totals use other shapes.
pub fn is_area_code(code: &str) -> bool {
    code.len() == 4
        && code.starts_with("00")
        && code[2..].chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

/// Parse the income survey sheet into raw per-(area, year) observations.
///
/// Expects two physical header rows (years above, metric labels below),
/// then one row per area with the code and display name in the first two
/// columns. Every pay cell becomes one observation, missing or not.
pub fn parse_income_sheet<R: Read>(reader: R) -> Result<Vec<RawIncomeObservation>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut records = csv_reader.records();

    let outer = match records.next() {
        Some(record) => record.context("failed to read income sheet year header")?,
        None => {
            return Err(
                PipelineError::schema("income sheet", "sheet is empty, expected two header rows")
                    .into(),
            )
        }
    };
    let inner = match records.next() {
        Some(record) => record.context("failed to read income sheet metric header")?,
        None => {
            return Err(PipelineError::schema(
                "income sheet",
                "missing second header row with metric labels",
            )
            .into())
        }
    };

    let pay_columns = locate_pay_columns(&outer, &inner)?;

    let mut observations = Vec::new();
    for (offset, record) in records.enumerate() {
        let record =
            record.with_context(|| format!("failed to read income sheet row {}", offset + 2))?;

        let area_code = record.get(0).map(str::trim).unwrap_or("").to_string();
        let area_raw = record.get(1).map(str::trim).unwrap_or("").to_string();
        if area_raw.is_empty() {
            continue;
        }

        for column in &pay_columns {
            let weekly_income = record.get(column.index).and_then(parse_income_cell);
            observations.push(RawIncomeObservation {
                area_raw: area_raw.clone(),
                area_code: area_code.clone(),
                year: column.year,
                weekly_income,
            });
        }
    }

    Ok(observations)
}

/// Read the income sheet from disk
pub fn load_income_observations<P: AsRef<Path>>(path: P) -> Result<Vec<RawIncomeObservation>> {
    let file = File::open(path.as_ref())
        .with_context(|| format!("failed to open income sheet: {:?}", path.as_ref()))?;
    parse_income_sheet(file)
}

// ============================================================================
// ANNUAL AGGREGATION
// ============================================================================

/// Filter and annualize raw observations into one record per (area, year).
///
/// Keeps only rows whose code matches the area shape, drops excluded areas,
/// missing values and out-of-range years, then annualizes weekly pay (×52)
/// and derives the monthly figure (/12).
pub fn aggregate_income(
    observations: &[RawIncomeObservation],
    config: &PipelineConfig,
) -> Vec<AnnualIncomeRecord> {
    let mut by_key: HashMap<(String, i32), AnnualIncomeRecord> = HashMap::new();

    for obs in observations {
        if !is_area_code(&obs.area_code) {
            continue;
        }
        if config.is_excluded(&obs.area_raw) || !config.year_in_range(obs.year) {
            continue;
        }
        let weekly = match obs.weekly_income {
            Some(value) if value.is_finite() => value,
            _ => continue,
        };

        let area_norm = normalize_area(&obs.area_raw);
        if area_norm.is_empty() {
            continue;
        }

        let annual_income = weekly * WEEKS_PER_YEAR;
        by_key
            .entry((area_norm.clone(), obs.year))
            .or_insert(AnnualIncomeRecord {
                area_norm,
                year: obs.year,
                annual_income,
                monthly_income: annual_income / MONTHS_PER_YEAR,
            });
    }

    let mut records: Vec<AnnualIncomeRecord> = by_key.into_values().collect();
    records.sort_by(|a, b| a.area_norm.cmp(&b.area_norm).then(a.year.cmp(&b.year)));
    records
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = r#",,2002,,2003,
Code,Area,Pay (£),Conf %,Pay (£),Conf %
00AA,City of London,"545,2",4.5,"560,0",4.1
00AB,Barking & Dagenham,"400,5",3.2,"410,1",3.0
K02000001,United Kingdom,"450,0",1.0,"460,0",1.0
00BK,Westminster,!,2.2,"765,4",2.8
"#;

    fn default_config() -> PipelineConfig {
        PipelineConfig::default()
    }

    #[test]
    fn test_pay_columns_found_with_forward_filled_years() {
        let observations = parse_income_sheet(SHEET.as_bytes()).unwrap();

        // Conf % columns sit under the same forward-filled year but are ignored
        let years: Vec<i32> = observations
            .iter()
            .filter(|o| o.area_raw == "Westminster")
            .map(|o| o.year)
            .collect();
        assert_eq!(years, vec![2002, 2003]);
    }

    #[test]
    fn test_no_pay_columns_is_fatal() {
        let sheet = ",,2002,2003\nCode,Area,Median,Median\n00AA,City of London,545,560\n";
        let err = parse_income_sheet(sheet.as_bytes()).unwrap_err();

        let message = err.to_string();
        assert!(message.contains("income sheet"));
        assert!(message.contains("Pay"));
    }

    #[test]
    fn test_non_numeric_year_label_is_fatal() {
        let sheet = ",,FY-two\nCode,Area,Pay (£)\n00AA,City of London,545\n";
        let err = parse_income_sheet(sheet.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("FY-two"));
    }

    #[test]
    fn test_comma_decimal_and_sentinel_coercion() {
        assert_eq!(parse_income_cell("545,2"), Some(545.2));
        assert_eq!(parse_income_cell("765.4"), Some(765.4));
        assert_eq!(parse_income_cell("!"), None);
        assert_eq!(parse_income_cell("#"), None);
        assert_eq!(parse_income_cell(""), None);
    }

    #[test]
    fn test_area_code_shape() {
        assert!(is_area_code("00AA"));
        assert!(is_area_code("00BK"));
        assert!(is_area_code("00A1"));
        assert!(!is_area_code("K02000001"));
        assert!(!is_area_code("00aa"));
        assert!(!is_area_code("0AA"));
        assert!(!is_area_code("00AAA"));
    }

    #[test]
    fn test_national_total_never_reaches_output() {
        let observations = parse_income_sheet(SHEET.as_bytes()).unwrap();
        let records = aggregate_income(&observations, &default_config());

        assert!(records.iter().all(|r| r.area_norm != "united kingdom"));
    }

    #[test]
    fn test_annualization() {
        let observations = parse_income_sheet(SHEET.as_bytes()).unwrap();
        let records = aggregate_income(&observations, &default_config());

        let barking_2002 = records
            .iter()
            .find(|r| r.area_norm == "barking and dagenham" && r.year == 2002)
            .unwrap();
        assert!((barking_2002.annual_income - 400.5 * 52.0).abs() < 1e-9);
        assert!((barking_2002.monthly_income - barking_2002.annual_income / 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_suppressed_cell_dropped_not_zero() {
        let observations = parse_income_sheet(SHEET.as_bytes()).unwrap();
        let records = aggregate_income(&observations, &default_config());

        assert!(!records
            .iter()
            .any(|r| r.area_norm == "westminster" && r.year == 2002));
        assert!(records
            .iter()
            .any(|r| r.area_norm == "westminster" && r.year == 2003));
    }

    #[test]
    fn test_excluded_area_dropped() {
        let observations = parse_income_sheet(SHEET.as_bytes()).unwrap();
        let records = aggregate_income(&observations, &default_config());

        assert!(records.iter().all(|r| r.area_norm != "city of london"));
    }

    #[test]
    fn test_year_range_filter() {
        let config = PipelineConfig::new(2003, 2010);
        let observations = parse_income_sheet(SHEET.as_bytes()).unwrap();
        let records = aggregate_income(&observations, &config);

        assert!(records.iter().all(|r| r.year == 2003));
    }
}
