//! Data errors raised while turning dataset rows into RFM inputs

use thiserror::Error;

/// Invalid or incomplete order data.
///
/// Rows are numbered from zero in the order they were supplied (header excluded).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("required column '{0}' is missing from the dataset")]
    MissingColumn(String),

    #[error("row {row}: purchase timestamp {value:?} is not a calendar date")]
    InvalidTimestamp { row: usize, value: Option<String> },

    #[error("row {row}: {field} is empty")]
    MissingIdentifier { row: usize, field: &'static str },

    #[error("row {row}: total_price is missing")]
    MissingAmount { row: usize },

    #[error("row {row}: total_price {value:?} is not a number")]
    NonNumericAmount { row: usize, value: String },

    #[error("row {row}: total_price {value} is negative")]
    NegativeAmount { row: usize, value: f64 },
}
