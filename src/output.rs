// 📤 Output Boundary - Display Rounding + File Export
// The only place precision is dropped; everything upstream stays exact

use crate::merge::{pivot, MergedRecord, Metric, WideView};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// DISPLAY ROUNDING
// ============================================================================

/// Whole currency units for display. Applied only here, never before
/// aggregation or forecasting, so rounding error cannot compound upstream.
pub fn round0(value: f64) -> f64 {
    value.round()
}

/// Two decimals for the affordability ratio
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// A merged row as published: currency at whole units, ratio at 2 dp
#[derive(Debug, Clone, Serialize)]
pub struct DisplayRecord {
    pub year: i32,
    pub area: String,
    pub house_price: f64,
    pub annual_income: f64,
    pub monthly_income: f64,
    pub ratio: f64,
}

impl DisplayRecord {
    pub fn from_merged(record: &MergedRecord) -> Self {
        DisplayRecord {
            year: record.year,
            area: record.area.clone(),
            house_price: round0(record.house_price),
            annual_income: round0(record.annual_income),
            monthly_income: round0(record.monthly_income),
            ratio: round2(record.ratio),
        }
    }
}

/// The whole merged table, display-rounded, in its canonical order
pub fn display_records(records: &[MergedRecord]) -> Vec<DisplayRecord> {
    records.iter().map(DisplayRecord::from_merged).collect()
}

// ============================================================================
// CSV EXPORT
// ============================================================================

/// Long-table column headers, matching the published dataset
const MERGED_HEADERS: [&str; 6] = [
    "year",
    "Area",
    "house_price",
    "annual_income",
    "monthly_income",
    "price_to_income_ratio",
];

/// Write the merged long table as CSV
pub fn write_merged_csv(records: &[MergedRecord], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create output file: {:?}", path))?;

    writer.write_record(MERGED_HEADERS)?;
    for record in records {
        writer.write_record(&[
            record.year.to_string(),
            record.area.clone(),
            format!("{:.0}", record.house_price),
            format!("{:.0}", record.annual_income),
            format!("{:.0}", record.monthly_income),
            format!("{:.2}", record.ratio),
        ])?;
    }

    writer.flush().context("failed to flush merged CSV")?;
    Ok(())
}

/// Write one pivoted view as CSV: a year column, then one column per area.
/// Holes left by the inner join stay empty.
pub fn write_wide_csv(view: &WideView, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create output file: {:?}", path))?;

    let ratio_view = view.metric == Metric::Ratio.as_str();
    let mut header = vec!["year".to_string()];
    header.extend(view.areas.iter().cloned());
    writer.write_record(&header)?;

    for (year, cells) in view.years.iter().zip(&view.cells) {
        let mut row = vec![year.to_string()];
        for cell in cells {
            row.push(match cell {
                Some(value) if ratio_view => format!("{:.2}", value),
                Some(value) => format!("{:.0}", value),
                None => String::new(),
            });
        }
        writer.write_record(&row)?;
    }

    writer.flush().context("failed to flush wide CSV")?;
    Ok(())
}

/// Write the merged table as pretty JSON
pub fn write_merged_json(records: &[MergedRecord], path: &Path) -> Result<()> {
    let payload = serde_json::to_string_pretty(&display_records(records))
        .context("failed to serialize merged table")?;
    fs::write(path, payload).with_context(|| format!("failed to write: {:?}", path))?;
    Ok(())
}

/// Export the full output set into a directory: the merged long table (CSV
/// and JSON) plus one wide view per metric. Returns the written paths.
pub fn export_all(records: &[MergedRecord], out_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create output directory: {:?}", out_dir))?;

    let mut written = Vec::new();

    let merged_csv = out_dir.join("merged_annual_long.csv");
    write_merged_csv(records, &merged_csv)?;
    written.push(merged_csv);

    let merged_json = out_dir.join("merged_annual_long.json");
    write_merged_json(records, &merged_json)?;
    written.push(merged_json);

    for (metric, name) in [
        (Metric::Ratio, "ratio_annual_wide.csv"),
        (Metric::HousePrice, "house_price_annual_wide.csv"),
        (Metric::AnnualIncome, "annual_income_wide.csv"),
    ] {
        let view = pivot(records, metric);
        let path = out_dir.join(name);
        write_wide_csv(&view, &path)?;
        written.push(path);
    }

    Ok(written)
}

// ============================================================================
// TESTS
// ============================================================================
