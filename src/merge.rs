// ⚖️ Annual Reconciliation - Inner Join + Affordability Ratio
// Joins the two annual tables on (normalized area, year) and derives the ratio

use crate::income::AnnualIncomeRecord;
use crate::prices::AnnualPriceRecord;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

// ============================================================================
// MERGED RECORD
// ============================================================================

/// One reconciled (area, year) row, full precision.
///
/// Exists only where both sources have the pair: the merge is a strict inner
/// join, and pairs present in only one source drop out silently. Display
/// rounding happens at the output boundary, never here, so downstream
/// forecasting sees unrounded values.
#[derive(Debug, Clone, Serialize)]
pub struct MergedRecord {
    pub year: i32,
    pub area: String,
    pub house_price: f64,
    pub annual_income: f64,
    pub monthly_income: f64,
    pub ratio: f64,
}

/// Inner-join prices and incomes on (area_norm, year).
///
/// For every matched pair the affordability ratio is derived as
/// house_price / annual_income. Output is ordered by (area, year).
pub fn merge(prices: &[AnnualPriceRecord], incomes: &[AnnualIncomeRecord]) -> Vec<MergedRecord> {
    let income_by_key: HashMap<(&str, i32), &AnnualIncomeRecord> = incomes
        .iter()
        .map(|record| ((record.area_norm.as_str(), record.year), record))
        .collect();

    let mut merged: Vec<MergedRecord> = prices
        .iter()
        .filter_map(|price| {
            income_by_key
                .get(&(price.area_norm.as_str(), price.year))
                .map(|income| MergedRecord {
                    year: price.year,
                    area: price.area_display.clone(),
                    house_price: price.mean_price,
                    annual_income: income.annual_income,
                    monthly_income: income.monthly_income,
                    ratio: price.mean_price / income.annual_income,
                })
        })
        .collect();

    merged.sort_by(|a, b| a.area.cmp(&b.area).then(a.year.cmp(&b.year)));
    merged
}

// ============================================================================
// PIVOTED VIEWS
// ============================================================================

/// Which column of the merged table a view or forecast reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    HousePrice,
    AnnualIncome,
    Ratio,
}

impl Metric {
    pub fn as_str(&self) -> &str {
        match self {
            Metric::HousePrice => "house_price",
            Metric::AnnualIncome => "annual_income",
            Metric::Ratio => "price_to_income_ratio",
        }
    }

    pub fn value_of(&self, record: &MergedRecord) -> f64 {
        match self {
            Metric::HousePrice => record.house_price,
            Metric::AnnualIncome => record.annual_income,
            Metric::Ratio => record.ratio,
        }
    }
}

/// Year-indexed, area-columned read shape for one metric.
///
/// Derived from the merged table on demand; holds no independent state.
/// `cells` rows follow `years`, columns follow `areas`; a hole means the
/// inner join had no record for that pair.
#[derive(Debug, Clone, Serialize)]
pub struct WideView {
    pub metric: String,
    pub years: Vec<i32>,
    pub areas: Vec<String>,
    pub cells: Vec<Vec<Option<f64>>>,
}

pub fn pivot(records: &[MergedRecord], metric: Metric) -> WideView {
    let years: Vec<i32> = records.iter().map(|r| r.year).collect::<BTreeSet<_>>().into_iter().collect();
    let areas: Vec<String> = records
        .iter()
        .map(|r| r.area.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let lookup: HashMap<(i32, &str), f64> = records
        .iter()
        .map(|r| ((r.year, r.area.as_str()), metric.value_of(r)))
        .collect();

    let cells = years
        .iter()
        .map(|year| {
            areas
                .iter()
                .map(|area| lookup.get(&(*year, area.as_str())).copied())
                .collect()
        })
        .collect();

    WideView {
        metric: metric.as_str().to_string(),
        years,
        areas,
        cells,
    }
}

// ============================================================================
// CITYWIDE OVERVIEW
// ============================================================================

/// Per-year arithmetic mean of each metric across every area present that year
#[derive(Debug, Clone, Serialize)]
pub struct OverviewRecord {
    pub year: i32,
    pub house_price: f64,
    pub annual_income: f64,
}

/// Collapse the merged table into the citywide overview series, one record
/// per year, sorted ascending.
pub fn overview(records: &[MergedRecord]) -> Vec<OverviewRecord> {
    let mut sums: BTreeMap<i32, (f64, f64, u32)> = BTreeMap::new();

    for record in records {
        let entry = sums.entry(record.year).or_insert((0.0, 0.0, 0));
        entry.0 += record.house_price;
        entry.1 += record.annual_income;
        entry.2 += 1;
    }

    sums.into_iter()
        .map(|(year, (price_sum, income_sum, count))| OverviewRecord {
            year,
            house_price: price_sum / count as f64,
            annual_income: income_sum / count as f64,
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn make_price(norm: &str, display: &str, year: i32, mean_price: f64) -> AnnualPriceRecord {
        AnnualPriceRecord {
            area_norm: norm.to_string(),
            area_display: display.to_string(),
            year,
            mean_price,
        }
    }

    fn make_income(norm: &str, year: i32, annual_income: f64) -> AnnualIncomeRecord {
        AnnualIncomeRecord {
            area_norm: norm.to_string(),
            year,
            annual_income,
            monthly_income: annual_income / 12.0,
        }
    }

    #[test]
    fn test_inner_join_keeps_only_two_sided_pairs() {
        let prices = vec![
            make_price("camden", "Camden", 2002, 250000.0),
            make_price("camden", "Camden", 2003, 260000.0),
            make_price("hackney", "Hackney", 2002, 180000.0),
        ];
        let incomes = vec![
            make_income("camden", 2002, 28000.0),
            make_income("islington", 2002, 27000.0),
        ];

        let merged = merge(&prices, &incomes);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].area, "Camden");
        assert_eq!(merged[0].year, 2002);

        // Every merged pair must exist in both inputs
        for record in &merged {
            assert!(prices
                .iter()
                .any(|p| p.area_display == record.area && p.year == record.year));
            assert!(incomes.iter().any(|i| i.year == record.year));
        }
    }

    #[test]
    fn test_ratio_matches_division_before_rounding() {
        let prices = vec![make_price("camden", "Camden", 2002, 250123.456)];
        let incomes = vec![make_income("camden", 2002, 28123.789)];

        let merged = merge(&prices, &incomes);
        let expected = 250123.456 / 28123.789;
        assert!((merged[0].ratio - expected).abs() < 1e-6);
    }

    #[test]
    fn test_output_sorted_by_area_then_year() {
        let prices = vec![
            make_price("westminster", "Westminster", 2003, 400000.0),
            make_price("camden", "Camden", 2003, 260000.0),
            make_price("camden", "Camden", 2002, 250000.0),
        ];
        let incomes = vec![
            make_income("westminster", 2003, 35000.0),
            make_income("camden", 2002, 28000.0),
            make_income("camden", 2003, 29000.0),
        ];

        let merged = merge(&prices, &incomes);
        let keys: Vec<(&str, i32)> = merged.iter().map(|r| (r.area.as_str(), r.year)).collect();
        assert_eq!(
            keys,
            vec![("Camden", 2002), ("Camden", 2003), ("Westminster", 2003)]
        );
    }

    #[test]
    fn test_pivot_alignment_and_holes() {
        let prices = vec![
            make_price("camden", "Camden", 2002, 250000.0),
            make_price("camden", "Camden", 2003, 260000.0),
            make_price("hackney", "Hackney", 2003, 190000.0),
        ];
        let incomes = vec![
            make_income("camden", 2002, 28000.0),
            make_income("camden", 2003, 29000.0),
            make_income("hackney", 2003, 26000.0),
        ];

        let merged = merge(&prices, &incomes);
        let view = pivot(&merged, Metric::HousePrice);

        assert_eq!(view.metric, "house_price");
        assert_eq!(view.years, vec![2002, 2003]);
        assert_eq!(view.areas, vec!["Camden".to_string(), "Hackney".to_string()]);
        assert_eq!(view.cells[0], vec![Some(250000.0), None]);
        assert_eq!(view.cells[1], vec![Some(260000.0), Some(190000.0)]);
    }

    #[test]
    fn test_pivot_ratio_view() {
        let prices = vec![make_price("camden", "Camden", 2002, 280000.0)];
        let incomes = vec![make_income("camden", 2002, 28000.0)];

        let merged = merge(&prices, &incomes);
        let view = pivot(&merged, Metric::Ratio);

        assert_eq!(view.metric, "price_to_income_ratio");
        assert_eq!(view.cells[0][0], Some(10.0));
    }

    #[test]
    fn test_overview_means_per_year() {
        let prices = vec![
            make_price("camden", "Camden", 2002, 200000.0),
            make_price("hackney", "Hackney", 2002, 100000.0),
            make_price("camden", "Camden", 2003, 300000.0),
        ];
        let incomes = vec![
            make_income("camden", 2002, 30000.0),
            make_income("hackney", 2002, 20000.0),
            make_income("camden", 2003, 31000.0),
        ];

        let merged = merge(&prices, &incomes);
        let series = overview(&merged);

        assert_eq!(series.len(), 2);
        assert_eq!(series[0].year, 2002);
        assert_eq!(series[0].house_price, 150000.0);
        assert_eq!(series[0].annual_income, 25000.0);
        assert_eq!(series[1].year, 2003);
        assert_eq!(series[1].house_price, 300000.0);
    }
}
