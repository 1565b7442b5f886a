// 🗂️ Data Context - The Immutable Snapshot
// Builds everything derived from the two source sheets once, then only reads

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::income::{aggregate_income, load_income_observations, parse_income_sheet, AnnualIncomeRecord};
use crate::merge::{merge, overview, pivot, MergedRecord, Metric, OverviewRecord, WideView};
use crate::prices::{aggregate_prices, load_price_observations, parse_price_sheet, AnnualPriceRecord};
use crate::resolve::AreaResolver;
use anyhow::Result;
use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

// ============================================================================
// DATA CONTEXT
// ============================================================================

/// Everything the pipeline derives from the two source sheets.
///
/// Built once at process start, never mutated afterwards. Request handlers
/// hold it by reference (or behind an `Arc`) and compute fresh results per
/// request; with no writes after construction there is nothing to lock.
#[derive(Debug)]
pub struct DataContext {
    merged: Vec<MergedRecord>,
    areas: Vec<String>,
    resolver: AreaResolver,
}

impl DataContext {
    /// Build the snapshot from pre-aggregated annual records
    pub fn from_annual(prices: &[AnnualPriceRecord], incomes: &[AnnualIncomeRecord]) -> Self {
        let merged = merge(prices, incomes);
        let areas: Vec<String> = merged
            .iter()
            .map(|record| record.area.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let resolver = AreaResolver::new(areas.clone());

        DataContext {
            merged,
            areas,
            resolver,
        }
    }

    /// Parse both sheets from readers and build the snapshot
    pub fn from_sheets(
        price_sheet: impl Read,
        income_sheet: impl Read,
        config: &PipelineConfig,
    ) -> Result<Self> {
        let price_obs = parse_price_sheet(price_sheet)?;
        let income_obs = parse_income_sheet(income_sheet)?;
        let prices = aggregate_prices(&price_obs, config);
        let incomes = aggregate_income(&income_obs, config);
        Ok(DataContext::from_annual(&prices, &incomes))
    }

    /// Ingest both sheets from disk and build the snapshot.
    /// Any schema problem aborts here, before anything is served.
    pub fn load(
        price_path: impl AsRef<Path>,
        income_path: impl AsRef<Path>,
        config: &PipelineConfig,
    ) -> Result<Self> {
        let price_obs = load_price_observations(price_path)?;
        let income_obs = load_income_observations(income_path)?;
        let prices = aggregate_prices(&price_obs, config);
        let incomes = aggregate_income(&income_obs, config);
        Ok(DataContext::from_annual(&prices, &incomes))
    }

    // ------------------------------------------------------------------
    // READ ACCESS
    // ------------------------------------------------------------------

    /// The canonical merged table, ordered by (area, year), full precision
    pub fn merged(&self) -> &[MergedRecord] {
        &self.merged
    }

    /// Canonical area display names, sorted ascending (autocomplete feed)
    pub fn areas(&self) -> &[String] {
        &self.areas
    }

    pub fn is_empty(&self) -> bool {
        self.merged.is_empty()
    }

    /// Inclusive (first, last) year present in the merged table
    pub fn year_span(&self) -> Option<(i32, i32)> {
        let first = self.merged.iter().map(|r| r.year).min()?;
        let last = self.merged.iter().map(|r| r.year).max()?;
        Some((first, last))
    }

    /// Resolve a free-text area query against the canonical list
    pub fn resolve_area(&self, query: &str) -> Result<String, PipelineError> {
        self.resolver.resolve(query)
    }

    /// All merged rows for one canonical display name, ordered by year
    pub fn series_for(&self, area: &str) -> Vec<&MergedRecord> {
        self.merged.iter().filter(|r| r.area == area).collect()
    }

    /// One metric of one area as (year, value) pairs, forecast-ready
    pub fn metric_series(&self, area: &str, metric: Metric) -> Vec<(i32, f64)> {
        self.series_for(area)
            .into_iter()
            .map(|r| (r.year, metric.value_of(r)))
            .collect()
    }

    /// Citywide per-year means across all areas
    pub fn overview(&self) -> Vec<OverviewRecord> {
        overview(&self.merged)
    }

    /// One metric of the citywide overview as (year, value) pairs
    pub fn overview_series(&self, metric: Metric) -> Vec<(i32, f64)> {
        self.overview()
            .iter()
            .map(|r| {
                let value = match metric {
                    Metric::HousePrice => r.house_price,
                    Metric::AnnualIncome => r.annual_income,
                    Metric::Ratio => r.house_price / r.annual_income,
                };
                (r.year, value)
            })
            .collect()
    }

    /// Year-indexed, area-columned view of one metric
    pub fn pivot(&self, metric: Metric) -> WideView {
        pivot(&self.merged, metric)
    }
}

// ============================================================================
// TESTS
// ============================================================================
