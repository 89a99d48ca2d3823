//! Command-line interface definitions and argument parsing

use chrono::NaiveDate;
use clap::Parser;

use crate::rfm::MissingAmountPolicy;

/// Descriptive order, category, customer and RFM summaries for the Olist dataset
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the flat dataset CSV
    #[arg(short, long, default_value = "Dashboard/all_data.csv")]
    pub input: String,

    /// First order date to include (YYYY-MM-DD), defaults to the earliest order
    #[arg(short, long)]
    pub start: Option<NaiveDate>,

    /// Last order date to include (YYYY-MM-DD), defaults to the latest order
    #[arg(short, long)]
    pub end: Option<NaiveDate>,

    /// Length of the category, seller and customer rankings
    #[arg(short = 'n', long, default_value = "10")]
    pub top: usize,

    /// Write the per-customer RFM table to this CSV file
    #[arg(long)]
    pub rfm_output: Option<String>,

    /// Fail on order lines without a total_price instead of counting them as zero
    #[arg(long)]
    pub reject_missing_amounts: bool,

    /// Log filter, e.g. "info" or "olist_dashboard=debug"
    #[arg(long, env = "DASHBOARD_LOG", default_value = "info")]
    pub log_level: String,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn missing_amount_policy(&self) -> MissingAmountPolicy {
        if self.reject_missing_amounts {
            MissingAmountPolicy::Reject
        } else {
            MissingAmountPolicy::TreatAsZero
        }
    }

    /// Log filter directive, raised to `debug` by `--verbose` when left at the default
    pub fn log_filter(&self) -> &str {
        if self.verbose && self.log_level == "info" {
            "debug"
        } else {
            &self.log_level
        }
    }
}
