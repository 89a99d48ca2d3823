//! Olist dashboard: loads the flat order dataset, selects a date range and
//! prints order, category, customer and RFM summaries.

use anyhow::Result;
use clap::Parser;
use olist_dashboard::{report, Args, Dashboard, OrderDataset};
use std::time::Instant;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(args.log_filter()))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&args) {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let start_time = Instant::now();

    info!("Loading dataset from {}", args.input);
    let dataset = OrderDataset::load(&args.input)?;
    let load_time = start_time.elapsed();
    debug!("Dataset loaded in {:.2}s", load_time.as_secs_f64());

    let range = dataset.resolve_range(args.start, args.end);
    info!("Analysing orders from {} to {}", range.start, range.end);

    let dashboard = Dashboard::build(&dataset, range, args.missing_amount_policy())?;
    report::print_dashboard(&dashboard, args.top, args.verbose);

    if let Some(path) = &args.rfm_output {
        report::write_rfm_csv(&dashboard.rfm, path)?;
        println!("\nRFM table saved to: {}", path);
    }

    if args.verbose {
        println!(
            "\nTotal processing time: {:.2}s",
            start_time.elapsed().as_secs_f64()
        );
    }

    Ok(())
}
