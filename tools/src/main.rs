//! analytics-runner: headless batch runner for the commerce analytics
//! engine.
//!
//! Usage:
//!   analytics-runner --csv data/ecommerce_transactions.csv --seed 42
//!   analytics-runner --csv txns.csv --db artifacts.db --horizon 30

use anyhow::Result;
use commerce_core::{
    engine::{AnalysisModule, AnalyticsEngine},
    ingest::ingest_csv_path,
    params::AnalysisParams,
    store::ArtifactStore,
};
use chrono::NaiveDate;
use std::env;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let csv_path = match string_arg(&args, "--csv") {
        Some(p) => p,
        None => {
            eprintln!("usage: analytics-runner --csv <transactions.csv> [--db <path>] [--seed N]");
            eprintln!("        [--start YYYY-MM-DD] [--end YYYY-MM-DD] [--trials N] [--clusters N]");
            eprintln!("        [--horizon N] [--timeout-ms N]");
            std::process::exit(2);
        }
    };
    let db = string_arg(&args, "--db").unwrap_or_else(|| "artifacts.db".to_string());

    let mut params = AnalysisParams {
        seed: parse_arg(&args, "--seed", 42u64),
        trial_count: parse_arg(&args, "--trials", 100usize),
        cluster_count: parse_arg(&args, "--clusters", 4usize),
        forecast_horizon_days: parse_arg(&args, "--horizon", 30usize),
        timeout_ms: parse_arg(&args, "--timeout-ms", 30_000u64),
        ..AnalysisParams::default()
    };
    params.start_date = string_arg(&args, "--start").and_then(|s| parse_date(&s));
    params.end_date = string_arg(&args, "--end").and_then(|s| parse_date(&s));

    println!("analytics-runner");
    println!("  csv:   {csv_path}");
    println!("  db:    {db}");
    println!("  seed:  {}", params.seed);
    println!();

    let (snapshot, report) = ingest_csv_path(&csv_path)?;
    println!("=== INGESTION ===");
    println!("  total rows:   {}", report.total_rows);
    println!("  valid rows:   {}", report.valid_rows);
    println!("  dropped rows: {}", report.dropped_rows);
    if let Some((first, last)) = snapshot.date_span() {
        println!("  span:         {first} .. {last}");
    }
    println!();

    let store = ArtifactStore::open(&db)?;
    store.migrate()?;
    let engine = AnalyticsEngine::new(snapshot, params, store);

    let artifacts = engine.run_all(&AnalysisModule::ALL)?;

    println!("=== RUN SUMMARY ===");
    for artifact in &artifacts {
        println!(
            "  {:<14} {}",
            artifact.module_name, artifact.parameter_signature
        );
    }
    println!();

    for artifact in &artifacts {
        match artifact.module_name.as_str() {
            "kpi" => {
                let revenue = artifact.payload["total_revenue"].as_f64().unwrap_or(0.0);
                let orders = artifact.payload["order_count"].as_u64().unwrap_or(0);
                let aov = artifact.payload["average_order_value"].as_f64().unwrap_or(0.0);
                println!("  kpi:          revenue {revenue:.2}, {orders} orders, AOV {aov:.2}");
            }
            "ab_single" => {
                let results = artifact.payload["results"].as_array().map_or(0, |a| a.len());
                let skipped = artifact.payload["skipped"].as_array().map_or(0, |a| a.len());
                println!("  ab_single:    {results} categories tested, {skipped} skipped");
            }
            "ab_simulation" => {
                let dists = artifact.payload["distributions"]
                    .as_array()
                    .map_or(0, |a| a.len());
                println!("  ab_simulation: {dists} lift distributions");
            }
            "segmentation" => {
                let customers = artifact.payload["assignments"]
                    .as_array()
                    .map_or(0, |a| a.len());
                println!("  segmentation: {customers} customers clustered");
            }
            "clv" => {
                let mae = artifact.payload["holdout_mae"].as_f64().unwrap_or(0.0);
                println!("  clv:          holdout MAE {mae:.2}");
            }
            "forecasting" => {
                let mae = artifact.payload["mae"].as_f64().unwrap_or(0.0);
                let rmse = artifact.payload["rmse"].as_f64().unwrap_or(0.0);
                println!("  forecasting:  MAE {mae:.2}, RMSE {rmse:.2}");
            }
            _ => {}
        }
    }

    Ok(())
}

fn string_arg(args: &[String], flag: &str) -> Option<String> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].clone())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}
