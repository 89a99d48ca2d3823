//! Dataset loading, date range selection and conversion to order records using Polars

use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use tracing::{debug, info, warn};

use crate::error::DataError;
use crate::rfm::OrderRecord;

pub const ORDER_ID: &str = "order_id";
pub const CUSTOMER_ID: &str = "customer_unique_id";
pub const PURCHASE_TIMESTAMP: &str = "order_purchase_timestamp";
pub const TOTAL_PRICE: &str = "total_price";
pub const FREIGHT_VALUE: &str = "freight_value";
pub const TOTAL_VALUE: &str = "total_value";
pub const QUANTITY: &str = "quantity";
pub const CATEGORY: &str = "product_category_name";
pub const SELLER_ID: &str = "seller_id";
pub const REVIEW_SCORE: &str = "review_score";
pub const CUSTOMER_CITY: &str = "customer_city";
pub const CUSTOMER_STATE: &str = "customer_state";

/// Derived calendar date of the purchase, formatted with [`DATE_FORMAT`]
pub const ORDER_DATE: &str = "order_date";

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Columns needed to compute RFM; everything else is optional
pub const REQUIRED_COLUMNS: [&str; 4] = [CUSTOMER_ID, ORDER_ID, PURCHASE_TIMESTAMP, TOTAL_PRICE];


const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parse a purchase timestamp as written in the dataset
///
/// Accepts `YYYY-MM-DD HH:MM:SS` (optionally with fractional seconds or a
/// `T` separator), RFC 3339 with an offset, and bare dates. Offset timestamps
/// keep their local wall-clock time so the calendar date is the one written.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.naive_local())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(value, DATE_FORMAT)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Inclusive range of order dates to analyse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Set when the requested end fell before the start and was moved up to it
    pub adjusted: bool,
}

impl DateRange {
    /// Resolve a requested range against the dataset's first and last order dates
    ///
    /// Missing bounds default to the dataset bounds and both bounds are kept
    /// inside them. An end before the start is replaced by the start.
    pub fn resolve(
        first: NaiveDate,
        last: NaiveDate,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Self {
        let within = |date: NaiveDate| date.max(first).min(last);
        let resolved_start = within(start.unwrap_or(first));
        let resolved_end = within(end.unwrap_or(last));

        if start.is_some_and(|s| s != resolved_start) || end.is_some_and(|e| e != resolved_end) {
            debug!("Requested range clamped to dataset bounds {} .. {}", first, last);
        }

        if resolved_end < resolved_start {
            warn!(
                "End date {} is before start date {}; using {} for both",
                resolved_end, resolved_start, resolved_start
            );
            return Self {
                start: resolved_start,
                end: resolved_start,
                adjusted: true,
            };
        }

        Self {
            start: resolved_start,
            end: resolved_end,
            adjusted: false,
        }
    }

    /// Number of calendar days covered, both ends included
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// The full order dataset with its derived `order_date` column
#[derive(Debug, Clone)]
pub struct OrderDataset {
    frame: DataFrame,
    first_date: NaiveDate,
    last_date: NaiveDate,
}

impl OrderDataset {
    /// Load the flat dataset CSV
    ///
    /// # Arguments
    /// * `path` - Path to the CSV file (e.g. `Dashboard/all_data.csv`)
    ///
    /// # Returns
    /// * `OrderDataset` with every purchase timestamp resolved to a date
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let frame = CsvReadOptions::default()
            .with_has_header(true)
            // every column is read as text; numeric columns are cast where they are used
            .with_infer_schema_length(Some(0))
            .try_into_reader_with_file_path(Some(path.to_path_buf()))
            .with_context(|| format!("failed to open dataset {}", path.display()))?
            .finish()
            .with_context(|| format!("failed to read dataset {}", path.display()))?;

        info!("Read {} rows from {}", frame.height(), path.display());
        Self::from_frame(frame)
    }

    /// Validate an already loaded frame and derive its order dates
    pub fn from_frame(mut frame: DataFrame) -> crate::Result<Self> {
        for name in REQUIRED_COLUMNS {
            if frame.column(name).is_err() {
                return Err(DataError::MissingColumn(name.to_string()).into());
            }
        }

        let timestamps = string_values(&frame, PURCHASE_TIMESTAMP)?;
        let mut dates = Vec::with_capacity(timestamps.len());
        for (row, value) in timestamps.into_iter().enumerate() {
            let date = value
                .as_deref()
                .and_then(parse_timestamp)
                .map(|ts| ts.date())
                .ok_or_else(|| DataError::InvalidTimestamp {
                    row,
                    value: value.clone(),
                })?;
            dates.push(date);
        }

        let (Some(first_date), Some(last_date)) =
            (dates.iter().min().copied(), dates.iter().max().copied())
        else {
            anyhow::bail!("No orders found in dataset");
        };

        let order_dates: Vec<String> = dates
            .iter()
            .map(|date| date.format(DATE_FORMAT).to_string())
            .collect();
        frame.with_column(Series::new(ORDER_DATE.into(), order_dates))?;

        debug!("Dataset covers {} .. {}", first_date, last_date);

        Ok(Self {
            frame,
            first_date,
            last_date,
        })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn first_date(&self) -> NaiveDate {
        self.first_date
    }

    pub fn last_date(&self) -> NaiveDate {
        self.last_date
    }

    pub fn full_range(&self) -> DateRange {
        DateRange {
            start: self.first_date,
            end: self.last_date,
            adjusted: false,
        }
    }

    /// Resolve a requested range against this dataset's bounds
    pub fn resolve_range(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> DateRange {
        DateRange::resolve(self.first_date, self.last_date, start, end)
    }

    /// Rows whose order date falls inside `range`
    pub fn filter(&self, range: &DateRange) -> crate::Result<DataFrame> {
        let start = range.start.format(DATE_FORMAT).to_string();
        let end = range.end.format(DATE_FORMAT).to_string();

        // ISO dates order lexicographically
        let filtered = self
            .frame
            .clone()
            .lazy()
            .filter(
                col(ORDER_DATE)
                    .gt_eq(lit(start))
                    .and(col(ORDER_DATE).lt_eq(lit(end))),
            )
            .collect()?;

        if filtered.height() == 0 {
            warn!("No orders between {} and {}", range.start, range.end);
        } else {
            debug!(
                "Selected {} of {} rows between {} and {}",
                filtered.height(),
                self.frame.height(),
                range.start,
                range.end
            );
        }

        Ok(filtered)
    }
}

/// Convert dataset rows into RFM input records
///
/// Timestamps are parsed here; a `total_price` cell that is present but not a
/// number is rejected, an empty one stays `None`.
pub fn order_records(frame: &DataFrame) -> crate::Result<Vec<OrderRecord>> {
    let customers = string_values(frame, CUSTOMER_ID)?;
    let orders = string_values(frame, ORDER_ID)?;
    let timestamps = string_values(frame, PURCHASE_TIMESTAMP)?;
    let prices = amount_values(frame, TOTAL_PRICE)?;

    let mut records = Vec::with_capacity(frame.height());
    let rows = customers
        .into_iter()
        .zip(orders)
        .zip(timestamps)
        .zip(prices)
        .enumerate();

    for (row, (((customer, order), timestamp), total_price)) in rows {
        let order_purchase_timestamp = timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .ok_or_else(|| DataError::InvalidTimestamp {
                row,
                value: timestamp.clone(),
            })?;

        records.push(OrderRecord {
            customer_unique_id: customer.unwrap_or_default(),
            order_id: order.unwrap_or_default(),
            order_purchase_timestamp,
            total_price,
        });
    }

    Ok(records)
}

fn missing_column(name: &str) -> DataError {
    DataError::MissingColumn(name.to_string())
}

/// Column values as strings, whatever type the CSV reader inferred
pub(crate) fn string_values(frame: &DataFrame, name: &str) -> crate::Result<Vec<Option<String>>> {
    let column = frame
        .column(name)
        .map_err(|_| missing_column(name))?
        .cast(&DataType::String)?;
    let values = column
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect();
    Ok(values)
}

/// Column values as floats; anything that does not parse becomes `None`
pub(crate) fn float_values(frame: &DataFrame, name: &str) -> crate::Result<Vec<Option<f64>>> {
    let column = frame
        .column(name)
        .map_err(|_| missing_column(name))?
        .cast(&DataType::Float64)?;
    Ok(column.f64()?.into_iter().collect())
}

pub(crate) fn count_values(frame: &DataFrame, name: &str) -> crate::Result<Vec<u64>> {
    let column = frame
        .column(name)
        .map_err(|_| missing_column(name))?
        .cast(&DataType::UInt64)?;
    Ok(column.u64()?.into_iter().map(Option::unwrap_or_default).collect())
}

/// Monetary column values, rejecting cells that are present but not numeric
fn amount_values(frame: &DataFrame, name: &str) -> crate::Result<Vec<Option<f64>>> {
    let raw = frame.column(name).map_err(|_| missing_column(name))?;
    let cast = raw.cast(&DataType::Float64)?;
    let values = cast.f64()?;

    if values.null_count() > raw.null_count() {
        let text = raw.cast(&DataType::String)?;
        for (row, (value, text)) in values.into_iter().zip(text.str()?).enumerate() {
            if let (None, Some(text)) = (value, text) {
                if !text.trim().is_empty() {
                    return Err(DataError::NonNumericAmount {
                        row,
                        value: text.to_string(),
                    }
                    .into());
                }
            }
        }
    }

    Ok(values.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, DATE_FORMAT).unwrap()
    }

    fn create_test_csv() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "order_id,customer_unique_id,order_purchase_timestamp,total_price").unwrap();
        writeln!(file, "o1,c1,2017-10-02 10:56:33,29.99").unwrap();
        writeln!(file, "o1,c1,2017-10-02 10:56:33,10.01").unwrap();
        writeln!(file, "o2,c2,2017-10-05 08:00:00,").unwrap();
        writeln!(file, "o3,c1,2017-10-09 23:59:59,5.50").unwrap();
        file
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = date("2018-07-24").and_hms_opt(20, 41, 37).unwrap();
        assert_eq!(parse_timestamp("2018-07-24 20:41:37"), Some(expected));
        assert_eq!(parse_timestamp(" 2018-07-24T20:41:37 "), Some(expected));
        assert_eq!(parse_timestamp("2018-07-24T20:41:37Z"), Some(expected));
        assert_eq!(
            parse_timestamp("2018-07-24T22:30:00-03:00").map(|ts| ts.date()),
            Some(date("2018-07-24"))
        );
        assert_eq!(
            parse_timestamp("2018-07-25T01:15:00+05:00").map(|ts| ts.date()),
            Some(date("2018-07-25"))
        );
        assert_eq!(
            parse_timestamp("2018-07-24"),
            date("2018-07-24").and_hms_opt(0, 0, 0)
        );
        assert_eq!(parse_timestamp("24/07/2018"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn test_resolve_defaults_and_clamps() {
        let first = date("2017-01-01");
        let last = date("2017-12-31");

        let range = DateRange::resolve(first, last, None, None);
        assert_eq!((range.start, range.end, range.adjusted), (first, last, false));

        let range = DateRange::resolve(
            first,
            last,
            Some(date("2016-05-01")),
            Some(date("2019-01-01")),
        );
        assert_eq!((range.start, range.end), (first, last));
        assert_eq!(range.days(), 365);
    }

    #[test]
    fn test_resolve_end_before_start() {
        let first = date("2017-01-01");
        let last = date("2017-12-31");

        let range = DateRange::resolve(
            first,
            last,
            Some(date("2017-06-10")),
            Some(date("2017-03-01")),
        );
        assert_eq!(range.start, date("2017-06-10"));
        assert_eq!(range.end, date("2017-06-10"));
        assert!(range.adjusted);
        assert_eq!(range.days(), 1);
    }

    #[test]
    fn test_load_and_filter() {
        let file = create_test_csv();
        let dataset = OrderDataset::load(file.path()).unwrap();

        assert_eq!(dataset.first_date(), date("2017-10-02"));
        assert_eq!(dataset.last_date(), date("2017-10-09"));
        assert_eq!(dataset.frame().height(), 4);

        let all = dataset.filter(&dataset.full_range()).unwrap();
        assert_eq!(all.height(), 4);

        let range = dataset.resolve_range(Some(date("2017-10-03")), Some(date("2017-10-09")));
        let filtered = dataset.filter(&range).unwrap();
        assert_eq!(filtered.height(), 2);
    }

    #[test]
    fn test_order_records() {
        let file = create_test_csv();
        let dataset = OrderDataset::load(file.path()).unwrap();
        let records = order_records(dataset.frame()).unwrap();

        assert_eq!(records.len(), 4);
        assert_eq!(records[0].customer_unique_id, "c1");
        assert_eq!(records[0].order_id, "o1");
        assert_eq!(records[0].total_price, Some(29.99));
        assert_eq!(records[2].total_price, None);
        assert_eq!(records[3].purchase_date(), date("2017-10-09"));
    }

    #[test]
    fn test_missing_required_column() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "order_id,customer_unique_id,order_purchase_timestamp").unwrap();
        writeln!(file, "o1,c1,2017-10-02 10:56:33").unwrap();

        let err = OrderDataset::load(file.path()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<DataError>(),
            Some(&DataError::MissingColumn(TOTAL_PRICE.to_string()))
        );
    }

    #[test]
    fn test_invalid_timestamp() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "order_id,customer_unique_id,order_purchase_timestamp,total_price").unwrap();
        writeln!(file, "o1,c1,2017-10-02 10:56:33,1.0").unwrap();
        writeln!(file, "o2,c2,yesterday,2.0").unwrap();

        let err = OrderDataset::load(file.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DataError>(),
            Some(DataError::InvalidTimestamp { row: 1, .. })
        ));
    }

    #[test]
    fn test_non_numeric_amount() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "order_id,customer_unique_id,order_purchase_timestamp,total_price").unwrap();
        writeln!(file, "o1,c1,2017-10-02 10:56:33,1.0").unwrap();
        writeln!(file, "o2,c2,2017-10-03 10:56:33,abc").unwrap();

        let dataset = OrderDataset::load(file.path()).unwrap();
        let err = order_records(dataset.frame()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<DataError>(),
            Some(&DataError::NonNumericAmount {
                row: 1,
                value: "abc".to_string()
            })
        );
    }

    #[test]
    fn test_non_numeric_amount_after_many_valid_rows() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "order_id,customer_unique_id,order_purchase_timestamp,total_price").unwrap();
        for i in 0..10_001 {
            writeln!(file, "o{i},c{i},2017-10-02 10:56:33,12.50").unwrap();
        }
        writeln!(file, "ox,cx,2017-10-03 10:56:33,abc").unwrap();

        let dataset = OrderDataset::load(file.path()).unwrap();
        let err = order_records(dataset.frame()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<DataError>(),
            Some(&DataError::NonNumericAmount {
                row: 10_001,
                value: "abc".to_string()
            })
        );
    }

    #[test]
    fn test_empty_dataset() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "order_id,customer_unique_id,order_purchase_timestamp,total_price").unwrap();

        assert!(OrderDataset::load(file.path()).is_err());
    }
}
