// Housing Affordability - API Server
// JSON endpoints over the immutable data snapshot

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use housing_affordability::{
    display_records, forecast_values, round0, validate_years_ahead, DataContext, ForecastConfig,
    ForecastResult, Metric, PipelineConfig, PipelineError, DEFAULT_YEARS_AHEAD, VERSION,
};

/// Label used for the citywide aggregate series
const OVERVIEW_LABEL: &str = "London (all areas average)";

/// Shared application state. The snapshot never changes after startup, so a
/// plain Arc is enough; handlers read it concurrently without locking.
#[derive(Clone)]
struct AppState {
    context: Arc<DataContext>,
    forecast: ForecastConfig,
}

#[derive(Deserialize)]
struct HorizonParams {
    years_ahead: Option<usize>,
}

// ============================================================================
// Error Mapping
// ============================================================================

/// Translate a pipeline failure into a structured HTTP response.
/// Only the error kind and the offending input leave the boundary.
fn error_response(err: &PipelineError) -> Response {
    let status = match err {
        PipelineError::NotFound { .. } => StatusCode::NOT_FOUND,
        PipelineError::Schema { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    };

    (status, Json(json!({ "error": err.kind(), "detail": err.to_string() }))).into_response()
}

/// Decode URL-encoded area names from the path
fn decode_area(raw: &str) -> String {
    urlencoding::decode(raw)
        .unwrap_or_else(|_| raw.into())
        .into_owned()
}

// ============================================================================
// Forecast Payload
// ============================================================================

fn bound_block(result: &ForecastResult) -> serde_json::Value {
    let yhat: Vec<f64> = result.future_rows().map(|r| round0(r.yhat)).collect();
    let lower: Vec<f64> = result.future_rows().map(|r| round0(r.yhat_lower)).collect();
    let upper: Vec<f64> = result.future_rows().map(|r| round0(r.yhat_upper)).collect();
    json!({ "yhat": yhat, "lower": lower, "upper": upper })
}

/// History plus future-only forecast blocks for both metrics.
/// `forecast.years` holds the years strictly after the last historical one,
/// in the same order as the yhat/lower/upper arrays.
fn build_forecast_response(
    price_series: &[(i32, f64)],
    income_series: &[(i32, f64)],
    years_ahead: usize,
    area_label: &str,
    config: &ForecastConfig,
) -> Result<serde_json::Value, PipelineError> {
    let price_fc = forecast_values(price_series, years_ahead, config)?;
    let income_fc = forecast_values(income_series, years_ahead, config)?;

    let hist_years: Vec<i32> = price_series.iter().map(|(year, _)| *year).collect();
    let hist_price: Vec<f64> = price_series.iter().map(|(_, v)| round0(*v)).collect();
    let hist_income: Vec<f64> = income_series.iter().map(|(_, v)| round0(*v)).collect();
    let future_years: Vec<i32> = price_fc.future_rows().map(|r| r.year).collect();

    Ok(json!({
        "area": area_label,
        "history": {
            "years": hist_years,
            "house_price": hist_price,
            "annual_income": hist_income,
        },
        "forecast": {
            "years": future_years,
            "house_price": bound_block(&price_fc),
            "annual_income": bound_block(&income_fc),
        },
        "meta": {
            "area": area_label,
            "years_ahead": years_ahead,
            "note": "Trend fitted on the log scale, seasonality disabled; uncertainty widens with horizon.",
        },
    }))
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": VERSION }))
}

/// GET /api/areas - Canonical area names for autocomplete
async fn list_areas(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "areas": state.context.areas() }))
}

/// GET /api/merged - The canonical merged table, display-rounded
async fn get_merged(State(state): State<AppState>) -> impl IntoResponse {
    Json(display_records(state.context.merged()))
}

/// GET /api/series/:area - Historical series for one area
async fn get_series(State(state): State<AppState>, Path(area): Path<String>) -> impl IntoResponse {
    let query = decode_area(&area);
    let display = match state.context.resolve_area(&query) {
        Ok(name) => name,
        Err(err) => return error_response(&err),
    };

    let rows = state.context.series_for(&display);
    let years: Vec<i32> = rows.iter().map(|r| r.year).collect();
    let house_price: Vec<f64> = rows.iter().map(|r| round0(r.house_price)).collect();
    let annual_income: Vec<f64> = rows.iter().map(|r| round0(r.annual_income)).collect();

    Json(json!({
        "area": display,
        "years": years,
        "house_price": house_price,
        "annual_income": annual_income,
    }))
    .into_response()
}

/// GET /api/forecast/:area?years_ahead=N - Per-area forecast, both metrics
async fn get_forecast(
    State(state): State<AppState>,
    Path(area): Path<String>,
    Query(params): Query<HorizonParams>,
) -> impl IntoResponse {
    let query = decode_area(&area);
    let requested = params.years_ahead.unwrap_or(DEFAULT_YEARS_AHEAD);

    let result = validate_years_ahead(requested)
        .and_then(|years_ahead| {
            state
                .context
                .resolve_area(&query)
                .map(|display| (years_ahead, display))
        })
        .and_then(|(years_ahead, display)| {
            let prices = state.context.metric_series(&display, Metric::HousePrice);
            let incomes = state.context.metric_series(&display, Metric::AnnualIncome);
            build_forecast_response(&prices, &incomes, years_ahead, &display, &state.forecast)
        });

    match result {
        Ok(payload) => Json(payload).into_response(),
        Err(err) => error_response(&err),
    }
}

/// GET /api/overview - Citywide mean series
async fn get_overview(State(state): State<AppState>) -> impl IntoResponse {
    let series = state.context.overview();
    let years: Vec<i32> = series.iter().map(|r| r.year).collect();
    let house_price: Vec<f64> = series.iter().map(|r| round0(r.house_price)).collect();
    let annual_income: Vec<f64> = series.iter().map(|r| round0(r.annual_income)).collect();

    Json(json!({
        "area": OVERVIEW_LABEL,
        "years": years,
        "house_price": house_price,
        "annual_income": annual_income,
    }))
}

/// GET /api/overview-forecast?years_ahead=N - Forecast of the citywide means
async fn get_overview_forecast(
    State(state): State<AppState>,
    Query(params): Query<HorizonParams>,
) -> impl IntoResponse {
    let requested = params.years_ahead.unwrap_or(DEFAULT_YEARS_AHEAD);

    let result = validate_years_ahead(requested).and_then(|years_ahead| {
        let prices = state.context.overview_series(Metric::HousePrice);
        let incomes = state.context.overview_series(Metric::AnnualIncome);
        build_forecast_response(&prices, &incomes, years_ahead, OVERVIEW_LABEL, &state.forecast)
    });

    match result {
        Ok(payload) => Json(payload).into_response(),
        Err(err) => error_response(&err),
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    println!("🌐 Housing Affordability - API Server v{}", VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let args: Vec<String> = std::env::args().collect();
    let price_path = args
        .get(1)
        .cloned()
        .unwrap_or_else(|| "data/price_index.csv".to_string());
    let income_path = args
        .get(2)
        .cloned()
        .unwrap_or_else(|| "data/income_survey.csv".to_string());

    // Build the snapshot once; a schema problem aborts before serving
    let config = PipelineConfig::default();
    let context = match DataContext::load(&price_path, &income_path, &config) {
        Ok(context) => context,
        Err(err) => {
            eprintln!("❌ Failed to build the data snapshot: {:#}", err);
            eprintln!("   Sheets: {} / {}", price_path, income_path);
            std::process::exit(1);
        }
    };
    println!(
        "✓ Snapshot ready: {} merged rows, {} areas",
        context.merged().len(),
        context.areas().len()
    );

    let state = AppState {
        context: Arc::new(context),
        forecast: ForecastConfig::default(),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/areas", get(list_areas))
        .route("/merged", get(get_merged))
        .route("/series/:area", get(get_series))
        .route("/forecast/:area", get(get_forecast))
        .route("/overview", get(get_overview))
        .route("/overview-forecast", get(get_overview_forecast))
        .with_state(state);

    let app = Router::new().nest("/api", api_routes).layer(CorsLayer::permissive());

    // Start server
    let addr = "0.0.0.0:8000";
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    println!("\n🚀 Server running on http://localhost:8000");
    println!("   Areas:    http://localhost:8000/api/areas");
    println!("   Forecast: http://localhost:8000/api/forecast/Camden?years_ahead=6");
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
