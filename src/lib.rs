//! Olist dashboard: descriptive analytics and RFM customer scoring over a flat
//! e-commerce order dataset.
//!
//! The RFM core in [`rfm`] is a pure function over [`OrderRecord`]s; loading,
//! date selection and the remaining dashboard summaries are built on Polars.

pub mod cli;
pub mod data;
pub mod error;
pub mod metrics;
pub mod report;
pub mod rfm;

// Re-export public items for easier access
pub use cli::Args;
pub use data::{order_records, DateRange, OrderDataset};
pub use error::DataError;
pub use report::{print_dashboard, write_rfm_csv, Dashboard};
pub use rfm::{
    compute_rfm, compute_rfm_with, top_by_frequency, top_by_monetary, top_by_recency,
    MissingAmountPolicy, OrderRecord, RfmRow, RfmSummary,
};

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
