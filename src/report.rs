//! Assembling the dashboard for a date range and printing it as a text report

use std::fs::File;
use std::path::Path;

use anyhow::Context;
use polars::prelude::*;
use tracing::{info, warn};

use crate::data::{
    order_records, DateRange, OrderDataset, CATEGORY, CUSTOMER_CITY, CUSTOMER_STATE,
    FREIGHT_VALUE, QUANTITY, REVIEW_SCORE, SELLER_ID, TOTAL_VALUE,
};
use crate::metrics::{
    self, top_categories_by_quantity, top_categories_by_value, CategoryPerformance,
    CustomerCount, DailyOrders, OrderTotals, SellerPerformance,
};
use crate::rfm::{
    compute_rfm_with, top_by_frequency, top_by_monetary, top_by_recency, MissingAmountPolicy,
    RfmRow, RfmSummary,
};

/// Number of cities and states listed in the demographics section
pub const DEMOGRAPHICS_TOP: usize = 5;

/// Every summary shown for one date range
///
/// Summaries whose source columns are absent from the dataset are `None`.
#[derive(Debug, Clone)]
pub struct Dashboard {
    pub range: DateRange,
    pub selected_rows: usize,
    pub daily: Option<Vec<DailyOrders>>,
    /// Daily series over the whole dataset, ignoring `range`
    pub all_daily: Option<Vec<DailyOrders>>,
    pub totals: Option<OrderTotals>,
    pub average_score: Option<f64>,
    pub categories: Option<Vec<CategoryPerformance>>,
    pub sellers: Option<Vec<SellerPerformance>>,
    pub cities: Option<Vec<CustomerCount>>,
    pub states: Option<Vec<CustomerCount>>,
    pub rfm: Vec<RfmRow>,
    pub rfm_summary: RfmSummary,
}

impl Dashboard {
    /// Compute all summaries over the rows of `dataset` inside `range`
    pub fn build(
        dataset: &OrderDataset,
        range: DateRange,
        policy: MissingAmountPolicy,
    ) -> crate::Result<Self> {
        let frame = dataset.filter(&range)?;

        let records = order_records(&frame)?;
        let rfm = compute_rfm_with(&records, policy)?;
        let rfm_summary = RfmSummary::from_rows(&rfm);
        info!("Scored {} customers from {} order lines", rfm.len(), records.len());

        let daily_columns = [FREIGHT_VALUE, TOTAL_VALUE];
        let daily = when_present(&frame, &daily_columns, "daily orders", || {
            metrics::daily_orders(&frame)
        })?;
        let totals = daily.as_deref().map(OrderTotals::from_daily);
        let all_daily = when_present(dataset.frame(), &daily_columns, "daily orders", || {
            metrics::daily_orders(dataset.frame())
        })?;

        Ok(Self {
            range,
            selected_rows: frame.height(),
            totals,
            daily,
            all_daily,
            average_score: when_present(&frame, &[REVIEW_SCORE], "review score", || {
                metrics::average_review_score(&frame)
            })?,
            categories: when_present(&frame, &[CATEGORY, QUANTITY], "category performance", || {
                metrics::orders_by_category(&frame)
            })?,
            sellers: when_present(&frame, &[SELLER_ID], "seller performance", || {
                metrics::sellers_performance(&frame)
            })?,
            cities: when_present(&frame, &[CUSTOMER_CITY], "customer cities", || {
                metrics::customers_by_city(&frame)
            })?,
            states: when_present(&frame, &[CUSTOMER_STATE], "customer states", || {
                metrics::customers_by_state(&frame)
            })?,
            rfm,
            rfm_summary,
        })
    }
}

fn when_present<T, F>(
    frame: &DataFrame,
    columns: &[&str],
    summary: &str,
    compute: F,
) -> crate::Result<Option<T>>
where
    F: FnOnce() -> crate::Result<T>,
{
    let missing: Vec<&str> = columns
        .iter()
        .copied()
        .filter(|name| frame.column(name).is_err())
        .collect();

    if missing.is_empty() {
        compute().map(Some)
    } else {
        warn!("Skipping {}: missing column(s) {}", summary, missing.join(", "));
        Ok(None)
    }
}

/// Print the dashboard to stdout
///
/// # Arguments
/// * `dashboard` - Computed summaries
/// * `top` - Length of the category and RFM rankings
/// * `verbose` - Also print the daily order series, for the selection and for all dates
pub fn print_dashboard(dashboard: &Dashboard, top: usize, verbose: bool) {
    let range = &dashboard.range;
    println!("=== Olist Dashboard ===");
    println!(
        "Period: {} .. {} ({} days, {} order lines)",
        range.start,
        range.end,
        range.days(),
        dashboard.selected_rows
    );
    if range.adjusted {
        println!("  (end date moved up to the start date)");
    }
    if dashboard.selected_rows == 0 {
        println!("Warning: no data in this date range");
    }

    println!("\n=== Daily Orders ===");
    match &dashboard.totals {
        Some(totals) => {
            println!("Total orders: {}", totals.orders);
            println!("Total revenue: {:.2}", totals.revenue);
        }
        None => println!("Total orders: unavailable"),
    }
    match dashboard.average_score {
        Some(score) => println!("Average score: {:.1}/5.0", score),
        None => println!("Average score: unavailable"),
    }

    if verbose {
        if let Some(daily) = &dashboard.daily {
            print_daily("Selected period", daily);
        }
        if let Some(daily) = &dashboard.all_daily {
            print_daily("All dates", daily);
        }
    }

    if let Some(categories) = &dashboard.categories {
        println!("\n=== Best Product Category ===");
        println!("By quantity:");
        for (rank, row) in top_categories_by_quantity(categories, top).iter().enumerate() {
            println!("  {:2}. {:<40} {:>8}", rank + 1, row.category, row.quantity);
        }
        println!("By value:");
        for (rank, row) in top_categories_by_value(categories, top).iter().enumerate() {
            println!("  {:2}. {:<40} {:>12.2}", rank + 1, row.category, row.value);
        }
    }

    if let Some(sellers) = &dashboard.sellers {
        println!("\n=== Seller Performance ===");
        println!("  Seller                           | Orders |       Value | Score");
        println!("  ---------------------------------|--------|-------------|------");
        for row in sellers.iter().take(top) {
            let score = row
                .average_score
                .map(|s| format!("{:.2}", s))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {:<32} | {:6} | {:11.2} | {:>5}",
                row.seller_id, row.order_count, row.total_value, score
            );
        }
    }

    println!("\n=== Customer Demographics ===");
    print_counts("By city", dashboard.cities.as_deref());
    print_counts("By state", dashboard.states.as_deref());

    let summary = &dashboard.rfm_summary;
    println!("\n=== Best Customer Based on RFM Parameters ===");
    println!("Customers: {}", summary.customers);
    println!("Average recency (days): {:.1}", summary.avg_recency);
    println!("Average frequency: {:.2}", summary.avg_frequency);
    println!("Average monetary: {:.2}", summary.avg_monetary);

    println!("By recency (days):");
    for row in top_by_recency(&dashboard.rfm, top) {
        println!("  {:<32} {:>6}", row.customer_unique_id, row.recency);
    }
    println!("By frequency:");
    for row in top_by_frequency(&dashboard.rfm, top) {
        println!("  {:<32} {:>6}", row.customer_unique_id, row.frequency);
    }
    println!("By monetary:");
    for row in top_by_monetary(&dashboard.rfm, top) {
        println!("  {:<32} {:>12.2}", row.customer_unique_id, row.monetary);
    }
}

fn print_daily(title: &str, days: &[DailyOrders]) {
    println!("\n{}:", title);
    println!("  Date       | Orders | Product value | Freight value | Total value");
    println!("  -----------|--------|---------------|---------------|------------");
    for day in days {
        println!(
            "  {} | {:6} | {:13.2} | {:13.2} | {:11.2}",
            day.date, day.order_count, day.product_value, day.freight_value, day.total_value
        );
    }
}

fn print_counts(title: &str, rows: Option<&[CustomerCount]>) {
    match rows {
        Some(rows) => {
            println!("{}:", title);
            for (rank, row) in rows.iter().take(DEMOGRAPHICS_TOP).enumerate() {
                println!("  {}. {:<32} {:>6}", rank + 1, row.name, row.customer_count);
            }
        }
        None => println!("{}: unavailable", title),
    }
}

/// RFM rows as a DataFrame with columns `customer_unique_id, recency, frequency, monetary`
pub fn rfm_frame(rows: &[RfmRow]) -> crate::Result<DataFrame> {
    let ids: Vec<&str> = rows.iter().map(|r| r.customer_unique_id.as_str()).collect();
    let recency: Vec<i64> = rows.iter().map(|r| r.recency).collect();
    let frequency: Vec<u64> = rows.iter().map(|r| r.frequency as u64).collect();
    let monetary: Vec<f64> = rows.iter().map(|r| r.monetary).collect();

    let frame = DataFrame::new(vec![
        Column::new("customer_unique_id".into(), ids),
        Column::new("recency".into(), recency),
        Column::new("frequency".into(), frequency),
        Column::new("monetary".into(), monetary),
    ])?;
    Ok(frame)
}

/// Write the RFM table to a CSV file
pub fn write_rfm_csv(rows: &[RfmRow], path: impl AsRef<Path>) -> crate::Result<()> {
    let path = path.as_ref();
    let mut frame = rfm_frame(rows)?;
    let mut file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut frame)?;
    info!("Wrote {} RFM rows to {}", rows.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
    }

    fn create_minimal_csv() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "order_id,customer_unique_id,order_purchase_timestamp,total_price,customer_state").unwrap();
        writeln!(file, "o1,A,2024-01-01 08:00:00,100,SP").unwrap();
        writeln!(file, "o1,A,2024-01-01 08:00:00,50,SP").unwrap();
        writeln!(file, "o2,B,2024-01-10 19:45:00,200,RJ").unwrap();
        file
    }

    #[test]
    fn test_build_with_missing_optional_columns() {
        let file = create_minimal_csv();
        let dataset = OrderDataset::load(file.path()).unwrap();
        let range = dataset.full_range();
        let dashboard = Dashboard::build(&dataset, range, MissingAmountPolicy::default()).unwrap();

        assert_eq!(dashboard.selected_rows, 3);
        assert!(dashboard.daily.is_none());
        assert!(dashboard.all_daily.is_none());
        assert!(dashboard.totals.is_none());
        assert!(dashboard.sellers.is_none());
        assert!(dashboard.categories.is_none());
        assert!(dashboard.cities.is_none());
        assert_eq!(dashboard.states.as_ref().map(Vec::len), Some(2));

        assert_eq!(dashboard.rfm.len(), 2);
        assert_eq!(dashboard.rfm[0].monetary, 150.0);
        assert_eq!(dashboard.rfm[0].recency, 9);
        assert_eq!(dashboard.rfm_summary.avg_monetary, 175.0);

        print_dashboard(&dashboard, 10, true);
    }

    #[test]
    fn test_recency_follows_the_selected_range() {
        let file = create_minimal_csv();
        let dataset = OrderDataset::load(file.path()).unwrap();
        let range = dataset.resolve_range(None, Some(date("2024-01-05")));
        let dashboard = Dashboard::build(&dataset, range, MissingAmountPolicy::Reject).unwrap();

        assert_eq!(dashboard.rfm.len(), 1);
        assert_eq!(dashboard.rfm[0].customer_unique_id, "A");
        assert_eq!(dashboard.rfm[0].recency, 0);
    }

    #[test]
    fn test_empty_selection() {
        let file = create_minimal_csv();
        let dataset = OrderDataset::load(file.path()).unwrap();
        let range = DateRange {
            start: date("2024-01-03"),
            end: date("2024-01-04"),
            adjusted: false,
        };
        let dashboard = Dashboard::build(&dataset, range, MissingAmountPolicy::default()).unwrap();

        assert_eq!(dashboard.selected_rows, 0);
        assert!(dashboard.rfm.is_empty());
        assert_eq!(dashboard.rfm_summary.avg_recency, 0.0);
        assert_eq!(dashboard.states, Some(Vec::new()));
    }

    #[test]
    fn test_write_rfm_csv() {
        let rows = vec![
            RfmRow {
                customer_unique_id: "A".to_string(),
                recency: 9,
                frequency: 1,
                monetary: 150.0,
            },
            RfmRow {
                customer_unique_id: "B".to_string(),
                recency: 0,
                frequency: 2,
                monetary: 200.5,
            },
        ];
        let dir = tempdir().unwrap();
        let path = dir.path().join("rfm.csv");

        write_rfm_csv(&rows, &path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next(), Some("customer_unique_id,recency,frequency,monetary"));
        assert_eq!(lines.next(), Some("A,9,1,150.0"));
        assert_eq!(lines.next(), Some("B,0,2,200.5"));
        assert_eq!(lines.next(), None);
    }
}
