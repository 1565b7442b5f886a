// ⚙️ Pipeline Configuration - Named Constants
// Every tunable the pipeline consumes lives here, not scattered through the code

use std::collections::HashSet;

/// Floor below which trend/changepoint estimation is unreliable
pub const MIN_FORECAST_POINTS: usize = 8;

/// Caller-supplied horizon must stay inside this inclusive range
pub const MIN_YEARS_AHEAD: usize = 1;
pub const MAX_YEARS_AHEAD: usize = 20;

/// Horizon used when the caller does not name one
pub const DEFAULT_YEARS_AHEAD: usize = 6;

// ============================================================================
// PIPELINE CONFIG
// ============================================================================

/// Ingestion-side settings: which years and areas make it into the snapshot.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// First year kept, inclusive
    pub start_year: i32,

    /// Last year kept, inclusive
    pub end_year: i32,

    /// Areas dropped from both sources before aggregation.
    /// The City of London is a historically distinct administrative core with
    /// a tiny resident population; its figures distort every citywide view.
    pub excluded_areas: HashSet<String>,
}

impl PipelineConfig {
    pub fn new(start_year: i32, end_year: i32) -> Self {
        PipelineConfig {
            start_year,
            end_year,
            excluded_areas: HashSet::new(),
        }
    }

    pub fn with_excluded_area(mut self, area: &str) -> Self {
        self.excluded_areas.insert(area.to_string());
        self
    }

    /// True when `year` falls inside the configured inclusive range
    pub fn year_in_range(&self, year: i32) -> bool {
        year >= self.start_year && year <= self.end_year
    }

    /// True when `area` is configured out of the pipeline
    pub fn is_excluded(&self, area: &str) -> bool {
        self.excluded_areas.contains(area)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig::new(2002, 2024).with_excluded_area("City of London")
    }
}

// ============================================================================
// FORECAST CONFIG
// ============================================================================

/// Trend-model settings. One copy, consumed by every caller that fits.
#[derive(Debug, Clone, Copy)]
pub struct ForecastConfig {
    /// How readily the trend may bend at a changepoint.
    /// Larger values weaken the penalty on slope shifts.
    pub changepoint_prior_scale: f64,

    /// Fraction of the historical range, from the start, where changepoints
    /// may be placed. Keeps the trend estimate stable near the series start.
    pub changepoint_range: f64,

    /// Central probability mass covered by the reported lower/upper bounds.
    /// Supported widths: 0.80, 0.90, 0.95, 0.99; anything else is rejected
    /// at fit time with a validation error.
    pub interval_width: f64,
}

impl ForecastConfig {
    pub fn new(changepoint_prior_scale: f64, changepoint_range: f64, interval_width: f64) -> Self {
        ForecastConfig {
            changepoint_prior_scale,
            changepoint_range,
            interval_width,
        }
    }
}

impl Default for ForecastConfig {
    fn default() -> Self {
        ForecastConfig::new(0.25, 0.9, 0.80)
    }
}

// ============================================================================
// TESTS
// ============================================================================
