use anyhow::{bail, Result};
use std::env;
use std::path::Path;

// Use library instead of local modules
use housing_affordability::{
    export_all, forecast_values, validate_years_ahead, DataContext, ForecastConfig, Metric,
    PipelineConfig, DEFAULT_YEARS_AHEAD, VERSION,
};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("build") => run_build(&args[2..])?,
        Some("forecast") => run_forecast(&args[2..])?,
        _ => print_usage(),
    }

    Ok(())
}

fn print_usage() {
    println!("🏘️  Housing Affordability Pipeline v{}", VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Usage:");
    println!("  build <price_sheet.csv> <income_sheet.csv> [out_dir]");
    println!("      Reconcile both sources and export the merged tables");
    println!("  forecast <price_sheet.csv> <income_sheet.csv> <area> [years_ahead]");
    println!("      Print the trend forecast for one area");
}

fn load_context(price_path: &str, income_path: &str) -> Result<DataContext> {
    let config = PipelineConfig::default();

    println!("\n📂 Loading source sheets...");
    let context = DataContext::load(Path::new(price_path), Path::new(income_path), &config)?;
    println!(
        "✓ Snapshot ready: {} merged rows across {} areas",
        context.merged().len(),
        context.areas().len()
    );
    if let Some((first, last)) = context.year_span() {
        println!("✓ Years covered: {}-{}", first, last);
    }
    if context.is_empty() {
        eprintln!("⚠️  The inner join produced no rows; check that both sheets overlap");
    }

    Ok(context)
}

fn run_build(args: &[String]) -> Result<()> {
    let (price_path, income_path) = match (args.first(), args.get(1)) {
        (Some(p), Some(i)) => (p.as_str(), i.as_str()),
        _ => bail!("usage: build <price_sheet.csv> <income_sheet.csv> [out_dir]"),
    };
    let out_dir = args.get(2).map(String::as_str).unwrap_or("output");

    println!("🏗️  Reconciliation Build v{}", VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let context = load_context(price_path, income_path)?;

    println!("\n💾 Writing outputs to {}/ ...", out_dir);
    let written = export_all(context.merged(), Path::new(out_dir))?;
    for path in &written {
        println!("✓ {}", path.display());
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ Build complete: {} files written", written.len());

    Ok(())
}

fn run_forecast(args: &[String]) -> Result<()> {
    let (price_path, income_path, query) = match (args.first(), args.get(1), args.get(2)) {
        (Some(p), Some(i), Some(q)) => (p.as_str(), i.as_str(), q.as_str()),
        _ => bail!("usage: forecast <price_sheet.csv> <income_sheet.csv> <area> [years_ahead]"),
    };
    let years_ahead = match args.get(3) {
        Some(raw) => {
            let parsed = raw
                .parse::<usize>()
                .map_err(|_| anyhow::anyhow!("years_ahead must be a whole number, got '{}'", raw))?;
            validate_years_ahead(parsed)?
        }
        None => DEFAULT_YEARS_AHEAD,
    };

    println!("📈 Area Forecast v{}", VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let context = load_context(price_path, income_path)?;

    println!("\n🔍 Resolving area '{}'...", query);
    let area = context.resolve_area(query)?;
    println!("✓ Matched: {}", area);

    let forecast_config = ForecastConfig::default();
    for (metric, label) in [
        (Metric::HousePrice, "House price"),
        (Metric::AnnualIncome, "Annual income"),
    ] {
        let series = context.metric_series(&area, metric);
        let result = forecast_values(&series, years_ahead, &forecast_config)?;

        println!("\n{} — {} ({} years ahead)", label, area, years_ahead);
        println!("{:>6}  {:>12}  {:>12}  {:>12}", "year", "lower", "yhat", "upper");
        for row in result.future_rows() {
            println!(
                "{:>6}  {:>12.0}  {:>12.0}  {:>12.0}",
                row.year, row.yhat_lower, row.yhat, row.yhat_upper
            );
        }
    }

    println!("\n✅ Forecast complete");

    Ok(())
}
