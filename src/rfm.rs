//! RFM (Recency, Frequency, Monetary) scoring of customers from order records

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::DataError;

/// One order line as supplied by the data loader
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecord {
    pub customer_unique_id: String,
    pub order_id: String,
    pub order_purchase_timestamp: NaiveDateTime,
    /// Line item value, `None` when the dataset cell was empty
    pub total_price: Option<f64>,
}

impl OrderRecord {
    /// Calendar date of the purchase; time of day is dropped
    pub fn purchase_date(&self) -> NaiveDate {
        self.order_purchase_timestamp.date()
    }
}

/// RFM summary for a single customer
#[derive(Debug, Clone, PartialEq)]
pub struct RfmRow {
    pub customer_unique_id: String,
    /// Days between the latest order in the input and this customer's latest order
    pub recency: i64,
    /// Distinct orders placed by this customer
    pub frequency: usize,
    /// Sum of the customer's line item values
    pub monetary: f64,
}

/// How a missing `total_price` contributes to a customer's monetary value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingAmountPolicy {
    /// Count the line as zero spend
    #[default]
    TreatAsZero,
    /// Fail with [`DataError::MissingAmount`]
    Reject,
}

impl MissingAmountPolicy {
    fn resolve(self, row: usize, amount: Option<f64>) -> Result<f64, DataError> {
        let value = match (amount, self) {
            (Some(value), _) => value,
            (None, MissingAmountPolicy::TreatAsZero) => 0.0,
            (None, MissingAmountPolicy::Reject) => return Err(DataError::MissingAmount { row }),
        };

        if !value.is_finite() {
            return Err(DataError::NonNumericAmount {
                row,
                value: value.to_string(),
            });
        }
        if value < 0.0 {
            return Err(DataError::NegativeAmount { row, value });
        }
        Ok(value)
    }
}

#[derive(Default)]
struct CustomerAccumulator<'a> {
    last_purchase: Option<NaiveDate>,
    orders: HashSet<&'a str>,
    monetary: f64,
}

/// Compute one RFM row per customer, treating missing amounts as zero
pub fn compute_rfm(records: &[OrderRecord]) -> Result<Vec<RfmRow>, DataError> {
    compute_rfm_with(records, MissingAmountPolicy::default())
}

/// Compute one RFM row per customer
///
/// Recency is measured against the latest purchase date across all of
/// `records`, so the same customer scores differently under different date
/// filters. Rows come back sorted by `customer_unique_id`. Empty input yields
/// an empty result.
pub fn compute_rfm_with(
    records: &[OrderRecord],
    policy: MissingAmountPolicy,
) -> Result<Vec<RfmRow>, DataError> {
    let mut customers: BTreeMap<&str, CustomerAccumulator> = BTreeMap::new();
    let mut latest: Option<NaiveDate> = None;

    for (row, record) in records.iter().enumerate() {
        if record.customer_unique_id.trim().is_empty() {
            return Err(DataError::MissingIdentifier {
                row,
                field: "customer_unique_id",
            });
        }
        if record.order_id.trim().is_empty() {
            return Err(DataError::MissingIdentifier {
                row,
                field: "order_id",
            });
        }
        let amount = policy.resolve(row, record.total_price)?;
        let date = record.purchase_date();

        latest = latest.max(Some(date));

        let acc = customers
            .entry(record.customer_unique_id.as_str())
            .or_default();
        acc.last_purchase = acc.last_purchase.max(Some(date));
        acc.orders.insert(record.order_id.as_str());
        acc.monetary += amount;
    }

    let Some(latest) = latest else {
        return Ok(Vec::new());
    };

    let rows = customers
        .into_iter()
        .filter_map(|(customer, acc)| {
            let last_purchase = acc.last_purchase?;
            Some(RfmRow {
                customer_unique_id: customer.to_string(),
                recency: (latest - last_purchase).num_days(),
                frequency: acc.orders.len(),
                monetary: acc.monetary,
            })
        })
        .collect();

    Ok(rows)
}

/// Mean of `values`, or `0.0` when there are none
pub fn mean_or_zero<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Average RFM values over a set of customers
#[derive(Debug, Clone, PartialEq)]
pub struct RfmSummary {
    pub customers: usize,
    pub avg_recency: f64,
    pub avg_frequency: f64,
    pub avg_monetary: f64,
}

impl RfmSummary {
    /// An empty set of rows summarises to all zeros
    pub fn from_rows(rows: &[RfmRow]) -> Self {
        Self {
            customers: rows.len(),
            avg_recency: mean_or_zero(rows.iter().map(|r| r.recency as f64)),
            avg_frequency: mean_or_zero(rows.iter().map(|r| r.frequency as f64)),
            avg_monetary: mean_or_zero(rows.iter().map(|r| r.monetary)),
        }
    }
}

fn top_by<F>(rows: &[RfmRow], n: usize, mut cmp: F) -> Vec<RfmRow>
where
    F: FnMut(&RfmRow, &RfmRow) -> Ordering,
{
    let mut ranked: Vec<&RfmRow> = rows.iter().collect();
    ranked.sort_by(|a, b| {
        cmp(a, b).then_with(|| a.customer_unique_id.cmp(&b.customer_unique_id))
    });
    ranked.into_iter().take(n).cloned().collect()
}

/// The `n` most recently active customers
pub fn top_by_recency(rows: &[RfmRow], n: usize) -> Vec<RfmRow> {
    top_by(rows, n, |a, b| a.recency.cmp(&b.recency))
}

/// The `n` customers with the most orders
pub fn top_by_frequency(rows: &[RfmRow], n: usize) -> Vec<RfmRow> {
    top_by(rows, n, |a, b| b.frequency.cmp(&a.frequency))
}

/// The `n` customers with the highest spend
pub fn top_by_monetary(rows: &[RfmRow], n: usize) -> Vec<RfmRow> {
    top_by(rows, n, |a, b| b.monetary.total_cmp(&a.monetary))
}
