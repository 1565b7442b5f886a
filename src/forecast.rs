// 📈 Trend Forecasting - Log-Space Piecewise Trend with Uncertainty
// Validates annual series, fits a changepoint-aware trend, extrapolates with bounds

use crate::config::{ForecastConfig, MAX_YEARS_AHEAD, MIN_FORECAST_POINTS, MIN_YEARS_AHEAD};
use crate::error::PipelineError;
use chrono::NaiveDate;
use serde::Serialize;

/// Cap on changepoint candidates; more would be noise at annual granularity
const MAX_CHANGEPOINTS: usize = 25;

/// A degenerate exact fit has zero residual spread; the floor keeps the
/// reported bounds strictly ordered around yhat
const SIGMA_FLOOR: f64 = 1e-6;

// ============================================================================
// PREPARED SERIES
// ============================================================================

/// One validated observation on the log scale
#[derive(Debug, Clone, Copy)]
pub struct ForecastPoint {
    /// January 1 of the source year, the fixed annual timestamp
    pub ds: NaiveDate,
    pub year: i32,
    pub log_value: f64,
}

/// A series `prepare` has already validated: sorted ascending, one entry per
/// year, every log_value finite and derived from a positive input.
#[derive(Debug, Clone)]
pub struct ForecastSeries {
    points: Vec<ForecastPoint>,
}

impl ForecastSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[ForecastPoint] {
        &self.points
    }

    pub fn last_year(&self) -> Option<i32> {
        self.points.last().map(|p| p.year)
    }
}

/// Validate and log-transform an annual series.
///
/// Missing (non-finite) values are dropped, entries are sorted ascending by
/// year and duplicate years collapse to the first value seen. Growth is
/// modeled multiplicatively, so any remaining value ≤ 0 is rejected before
/// the natural log is applied: compound percentage growth is linear in
/// log space, which is what the trend fitter assumes.
pub fn prepare(series: &[(i32, f64)]) -> Result<ForecastSeries, PipelineError> {
    let mut kept: Vec<(i32, f64)> = series
        .iter()
        .copied()
        .filter(|(_, value)| value.is_finite())
        .collect();
    kept.sort_by_key(|(year, _)| *year);

    if let Some((year, value)) = kept.iter().find(|(_, value)| *value <= 0.0) {
        return Err(PipelineError::validation(format!(
            "cannot log-transform non-positive values: {} at year {}",
            value, year
        )));
    }

    kept.dedup_by_key(|(year, _)| *year);

    let mut points = Vec::with_capacity(kept.len());
    for (year, value) in kept {
        let ds = NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(|| {
            PipelineError::validation(format!("year {} is outside the calendar range", year))
        })?;
        points.push(ForecastPoint {
            ds,
            year,
            log_value: value.ln(),
        });
    }

    Ok(ForecastSeries { points })
}

// ============================================================================
// FORECAST OUTPUT
// ============================================================================

/// One year of output on the original (non-log) scale
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ForecastRow {
    pub year: i32,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}

/// Fitted history plus the requested horizon, sorted ascending by year,
/// with yhat_lower ≤ yhat ≤ yhat_upper in every row.
#[derive(Debug, Clone, Serialize)]
pub struct ForecastResult {
    pub rows: Vec<ForecastRow>,
    pub last_historical_year: i32,
}

impl ForecastResult {
    /// Rows covering the fitted historical range
    pub fn history_rows(&self) -> impl Iterator<Item = &ForecastRow> {
        let last = self.last_historical_year;
        self.rows.iter().filter(move |r| r.year <= last)
    }

    /// Rows strictly after the last historical year
    pub fn future_rows(&self) -> impl Iterator<Item = &ForecastRow> {
        let last = self.last_historical_year;
        self.rows.iter().filter(move |r| r.year > last)
    }
}

// ============================================================================
// TREND MODEL
// ============================================================================

/// Basis for one time point: intercept, global slope, one hinge per changepoint
fn trend_basis(t: f64, changepoints: &[f64]) -> Vec<f64> {
    let mut row = Vec::with_capacity(2 + changepoints.len());
    row.push(1.0);
    row.push(t);
    for s in changepoints {
        row.push((t - s).max(0.0));
    }
    row
}

/// Candidate changepoints: interior observation times within the leading
/// `changepoint_range` fraction of history, evenly thinned to the cap.
/// Restricting placement keeps the trend estimate stable near the series end.
fn place_changepoints(t: &[f64], changepoint_range: f64) -> Vec<f64> {
    let candidates: Vec<f64> = t
        .iter()
        .copied()
        .skip(1)
        .filter(|t| *t <= changepoint_range && *t < 1.0)
        .collect();

    if candidates.len() <= MAX_CHANGEPOINTS {
        return candidates;
    }

    let mut thinned = Vec::with_capacity(MAX_CHANGEPOINTS);
    for j in 0..MAX_CHANGEPOINTS {
        let idx = j * (candidates.len() - 1) / (MAX_CHANGEPOINTS - 1);
        thinned.push(candidates[idx]);
    }
    thinned.dedup();
    thinned
}

/// Solve A·x = b by Gaussian elimination with partial pivoting.
/// The systems here are tiny (≤ 27 unknowns). None means singular.
fn solve_linear_system(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();

    for col in 0..n {
        let mut pivot_row = col;
        for row in (col + 1)..n {
            if a[row][col].abs() > a[pivot_row][col].abs() {
                pivot_row = row;
            }
        }
        if a[pivot_row][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut sum = b[row];
        for k in (row + 1)..n {
            sum -= a[row][k] * x[k];
        }
        x[row] = sum / a[row][row];
    }
    Some(x)
}

/// Ridge-penalized least squares on the hinge basis.
///
/// Only the slope-shift coefficients are penalized; the base intercept and
/// slope stay free. The penalty weight is 1 / prior_scale², so a larger
/// changepoint prior scale lets the trend bend more readily.
fn fit_trend(t: &[f64], y: &[f64], changepoints: &[f64], prior_scale: f64) -> Option<Vec<f64>> {
    let m = 2 + changepoints.len();
    let mut a = vec![vec![0.0; m]; m];
    let mut b = vec![0.0; m];

    for (ti, yi) in t.iter().zip(y) {
        let row = trend_basis(*ti, changepoints);
        for i in 0..m {
            b[i] += row[i] * yi;
            for j in 0..m {
                a[i][j] += row[i] * row[j];
            }
        }
    }

    let ridge = 1.0 / (prior_scale * prior_scale);
    for i in 2..m {
        a[i][i] += ridge;
    }

    solve_linear_system(a, b)
}

fn predict_log(t: f64, beta: &[f64], changepoints: &[f64]) -> f64 {
    trend_basis(t, changepoints)
        .iter()
        .zip(beta)
        .map(|(x, b)| x * b)
        .sum()
}

/// Central-interval z multiplier for the configured probability mass.
/// Only the tabulated widths are supported; anything else is rejected
/// upstream rather than silently mapped to a neighbouring interval.
fn z_score(interval_width: f64) -> Option<f64> {
    let percent = (interval_width * 100.0).round() as i32;
    match percent {
        80 => Some(1.2816),
        90 => Some(1.6449),
        95 => Some(1.9600),
        99 => Some(2.5758),
        _ => None,
    }
}

// ============================================================================
// FITTER
// ============================================================================

/// Fit the trend and extrapolate `years_ahead` year-start steps forward.
///
/// Seasonal components are deliberately absent: the data is annual, so
/// daily/weekly/yearly seasonality is meaningless here and the model is pure
/// trend. Fails below the 8-point floor, under which changepoint estimation
/// is unreliable. Output covers the fitted history and the future horizon on
/// the original scale, sorted ascending; callers that need only the future
/// filter by year > last_historical_year.
///
/// Uncertainty is the residual spread in log space scaled by the interval's
/// z multiplier, widening with horizon as sqrt(1 + h).
pub fn fit_forecast(
    series: &ForecastSeries,
    years_ahead: usize,
    config: &ForecastConfig,
) -> Result<ForecastResult, PipelineError> {
    let n = series.len();
    if n < MIN_FORECAST_POINTS {
        return Err(PipelineError::insufficient_data(MIN_FORECAST_POINTS, n));
    }
    let z = z_score(config.interval_width).ok_or_else(|| {
        PipelineError::validation(format!(
            "unsupported interval_width {}; supported widths are 0.80, 0.90, 0.95, 0.99",
            config.interval_width
        ))
    })?;

    let points = series.points();
    let first_year = points[0].year;
    let last_year = points[n - 1].year;
    let span = (last_year - first_year) as f64;

    let t: Vec<f64> = points
        .iter()
        .map(|p| (p.year - first_year) as f64 / span)
        .collect();
    let y: Vec<f64> = points.iter().map(|p| p.log_value).collect();

    let changepoints = place_changepoints(&t, config.changepoint_range);
    let beta = fit_trend(&t, &y, &changepoints, config.changepoint_prior_scale).ok_or_else(
        || PipelineError::validation("trend fitting failed: singular normal equations"),
    )?;

    let fitted: Vec<f64> = t.iter().map(|t| predict_log(*t, &beta, &changepoints)).collect();

    let params = 2 + changepoints.len();
    let freedom = n.saturating_sub(params).max(1);
    let residual_variance: f64 = y
        .iter()
        .zip(&fitted)
        .map(|(yi, fi)| (yi - fi) * (yi - fi))
        .sum::<f64>()
        / freedom as f64;
    let sigma = residual_variance.sqrt().max(SIGMA_FLOOR);

    let mut rows = Vec::with_capacity(n + years_ahead);
    for (point, log_yhat) in points.iter().zip(&fitted) {
        let margin = z * sigma;
        rows.push(ForecastRow {
            year: point.year,
            yhat: log_yhat.exp(),
            yhat_lower: (log_yhat - margin).exp(),
            yhat_upper: (log_yhat + margin).exp(),
        });
    }

    for step in 1..=years_ahead {
        let year = last_year + step as i32;
        let t_future = (year - first_year) as f64 / span;
        let log_yhat = predict_log(t_future, &beta, &changepoints);
        let margin = z * sigma * (1.0 + step as f64).sqrt();
        rows.push(ForecastRow {
            year,
            yhat: log_yhat.exp(),
            yhat_lower: (log_yhat - margin).exp(),
            yhat_upper: (log_yhat + margin).exp(),
        });
    }

    Ok(ForecastResult {
        rows,
        last_historical_year: last_year,
    })
}

/// Prepare and fit in one call, the shape every endpoint uses
pub fn forecast_values(
    series: &[(i32, f64)],
    years_ahead: usize,
    config: &ForecastConfig,
) -> Result<ForecastResult, PipelineError> {
    let prepared = prepare(series)?;
    fit_forecast(&prepared, years_ahead, config)
}

/// Reject a caller-supplied horizon outside the allowed range.
/// Lives at the request boundary so the fitter itself stays horizon-agnostic.
pub fn validate_years_ahead(years_ahead: usize) -> Result<usize, PipelineError> {
    if !(MIN_YEARS_AHEAD..=MAX_YEARS_AHEAD).contains(&years_ahead) {
        return Err(PipelineError::validation(format!(
            "years_ahead must be between {} and {}, got {}",
            MIN_YEARS_AHEAD, MAX_YEARS_AHEAD, years_ahead
        )));
    }
    Ok(years_ahead)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Ten years of exact 5% compound growth starting at 300000
    fn compound_series() -> Vec<(i32, f64)> {
        (0..10)
            .map(|i| (2014 + i as i32, 300000.0 * 1.05_f64.powi(i)))
            .collect()
    }

    #[test]
    fn test_prepare_sorts_logs_and_drops_missing() {
        let series = vec![(2003, 110000.0), (2001, f64::NAN), (2002, 100000.0)];
        let prepared = prepare(&series).unwrap();

        assert_eq!(prepared.len(), 2);
        let points = prepared.points();
        assert_eq!(points[0].year, 2002);
        assert_eq!(points[1].year, 2003);
        assert!((points[0].log_value - 100000.0_f64.ln()).abs() < 1e-12);
        assert_eq!(points[0].ds, NaiveDate::from_ymd_opt(2002, 1, 1).unwrap());
    }

    #[test]
    fn test_prepare_rejects_non_positive() {
        let zero = vec![(2002, 100000.0), (2003, 0.0)];
        let err = prepare(&zero).unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(err.to_string().contains("cannot log-transform non-positive values"));

        let negative = vec![(2002, -5.0)];
        assert!(prepare(&negative).is_err());
    }

    #[test]
    fn test_prepare_accepts_all_positive() {
        assert!(prepare(&compound_series()).is_ok());
    }

    #[test]
    fn test_insufficient_data_below_floor() {
        let short: Vec<(i32, f64)> = (0..7).map(|i| (2010 + i, 100000.0 + i as f64)).collect();
        let prepared = prepare(&short).unwrap();

        let err = fit_forecast(&prepared, 3, &ForecastConfig::default()).unwrap_err();
        assert_eq!(err.kind(), "insufficient_data");
        assert_eq!(
            err,
            PipelineError::insufficient_data(MIN_FORECAST_POINTS, 7)
        );
    }

    #[test]
    fn test_compound_growth_scenario() {
        let series = compound_series();
        let result = forecast_values(&series, 6, &ForecastConfig::default()).unwrap();

        // 10 historical rows plus exactly 6 future rows, sorted ascending
        assert_eq!(result.rows.len(), 16);
        assert_eq!(result.last_historical_year, 2023);
        let years: Vec<i32> = result.rows.iter().map(|r| r.year).collect();
        let mut sorted = years.clone();
        sorted.sort_unstable();
        assert_eq!(years, sorted);

        let future: Vec<&ForecastRow> = result.future_rows().collect();
        assert_eq!(future.len(), 6);
        assert_eq!(future[0].year, 2024);
        assert_eq!(future[5].year, 2029);

        // Trend keeps rising and bounds stay strictly ordered
        for pair in future.windows(2) {
            assert!(pair[1].yhat > pair[0].yhat);
        }
        for row in &result.rows {
            assert!(row.yhat_lower < row.yhat, "lower bound collapsed at {}", row.year);
            assert!(row.yhat < row.yhat_upper, "upper bound collapsed at {}", row.year);
        }

        // Exact compound growth extrapolates to the compounded value
        let expected_2024 = 300000.0 * 1.05_f64.powi(10);
        assert!((future[0].yhat - expected_2024).abs() / expected_2024 < 0.01);
    }

    #[test]
    fn test_flat_series_stays_flat() {
        let series: Vec<(i32, f64)> = (0..12).map(|i| (2010 + i, 250000.0)).collect();
        let result = forecast_values(&series, 4, &ForecastConfig::default()).unwrap();

        for row in result.future_rows() {
            assert!((row.yhat - 250000.0).abs() / 250000.0 < 0.01);
            assert!(row.yhat_lower < row.yhat && row.yhat < row.yhat_upper);
        }
    }

    #[test]
    fn test_bounds_ordered_for_noisy_series() {
        // Growth with a wiggle so the residual spread is real
        let series: Vec<(i32, f64)> = (0..15)
            .map(|i| {
                let wiggle = if i % 2 == 0 { 1.03 } else { 0.97 };
                (2008 + i as i32, 200000.0 * 1.04_f64.powi(i) * wiggle)
            })
            .collect();

        let result = forecast_values(&series, 5, &ForecastConfig::default()).unwrap();
        for row in &result.rows {
            assert!(row.yhat_lower <= row.yhat && row.yhat <= row.yhat_upper);
        }

        // Uncertainty widens with horizon
        let future: Vec<&ForecastRow> = result.future_rows().collect();
        let near_width = future[0].yhat_upper / future[0].yhat_lower;
        let far_width = future[4].yhat_upper / future[4].yhat_lower;
        assert!(far_width > near_width);
    }

    #[test]
    fn test_history_and_future_split() {
        let result = forecast_values(&compound_series(), 3, &ForecastConfig::default()).unwrap();

        assert_eq!(result.history_rows().count(), 10);
        assert_eq!(result.future_rows().count(), 3);
        assert!(result.future_rows().all(|r| r.year > result.last_historical_year));
    }

    #[test]
    fn test_changepoints_respect_range_and_cap() {
        let t: Vec<f64> = (0..100).map(|i| i as f64 / 99.0).collect();
        let placed = place_changepoints(&t, 0.9);

        assert!(placed.len() <= MAX_CHANGEPOINTS);
        assert!(placed.iter().all(|s| *s > 0.0 && *s <= 0.9));

        let few: Vec<f64> = (0..10).map(|i| i as f64 / 9.0).collect();
        let placed = place_changepoints(&few, 0.9);
        assert_eq!(placed.len(), 8);
    }

    #[test]
    fn test_z_score_table() {
        assert_eq!(z_score(0.80), Some(1.2816));
        assert_eq!(z_score(0.90), Some(1.6449));
        assert_eq!(z_score(0.95), Some(1.9600));
        assert_eq!(z_score(0.99), Some(2.5758));
        assert_eq!(z_score(0.83), None);
    }

    #[test]
    fn test_unsupported_interval_width_rejected() {
        let config = ForecastConfig::new(0.25, 0.9, 0.50);
        let err = forecast_values(&compound_series(), 3, &config).unwrap_err();

        assert_eq!(err.kind(), "validation");
        assert!(err.to_string().contains("interval_width"));
        assert!(err.to_string().contains("0.5"));
    }

    #[test]
    fn test_solve_linear_system() {
        // 2x + y = 5, x - y = 1  ->  x = 2, y = 1
        let a = vec![vec![2.0, 1.0], vec![1.0, -1.0]];
        let b = vec![5.0, 1.0];
        let x = solve_linear_system(a, b).unwrap();
        assert!((x[0] - 2.0).abs() < 1e-12);
        assert!((x[1] - 1.0).abs() < 1e-12);

        let singular = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        assert!(solve_linear_system(singular, vec![1.0, 2.0]).is_none());
    }

    #[test]
    fn test_years_ahead_bounds() {
        assert!(validate_years_ahead(0).is_err());
        assert!(validate_years_ahead(1).is_ok());
        assert!(validate_years_ahead(6).is_ok());
        assert!(validate_years_ahead(20).is_ok());
        assert!(validate_years_ahead(21).is_err());
    }

    #[test]
    fn test_duplicate_years_collapse_to_first() {
        let series = vec![(2002, 100.0), (2002, 999.0), (2003, 110.0)];
        let prepared = prepare(&series).unwrap();

        assert_eq!(prepared.len(), 2);
        assert!((prepared.points()[0].log_value - 100.0_f64.ln()).abs() < 1e-12);
    }
}
