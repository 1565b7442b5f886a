// Housing Affordability Pipeline - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod config;
pub mod error;
pub mod normalize;
pub mod prices;
pub mod income;
pub mod merge;
pub mod forecast;
pub mod resolve;
pub mod context;
pub mod output;

// Re-export commonly used types
pub use config::{
    ForecastConfig, PipelineConfig,
    DEFAULT_YEARS_AHEAD, MAX_YEARS_AHEAD, MIN_FORECAST_POINTS, MIN_YEARS_AHEAD,
};
pub use context::DataContext;
pub use error::PipelineError;
pub use forecast::{
    fit_forecast, forecast_values, prepare, validate_years_ahead,
    ForecastPoint, ForecastResult, ForecastRow, ForecastSeries,
};
pub use income::{
    aggregate_income, load_income_observations, parse_income_sheet,
    AnnualIncomeRecord, RawIncomeObservation,
};
pub use merge::{
    merge, overview, pivot,
    MergedRecord, Metric, OverviewRecord, WideView,
};
pub use normalize::normalize_area;
pub use output::{
    display_records, export_all, round0, round2,
    DisplayRecord,
};
pub use prices::{
    aggregate_prices, load_price_observations, parse_price_sheet,
    AnnualPriceRecord, RawPriceObservation,
};
pub use resolve::AreaResolver;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
