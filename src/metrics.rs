//! Descriptive dashboard aggregations over a filtered order frame

use std::cmp::Ordering;
use std::collections::BTreeMap;

use anyhow::Context;
use chrono::NaiveDate;
use polars::prelude::*;

use crate::data::{
    count_values, float_values, string_values, CATEGORY, CUSTOMER_CITY, CUSTOMER_ID,
    CUSTOMER_STATE, DATE_FORMAT, FREIGHT_VALUE, ORDER_DATE, ORDER_ID, QUANTITY, REVIEW_SCORE,
    SELLER_ID, TOTAL_PRICE, TOTAL_VALUE,
};
use crate::rfm::mean_or_zero;

/// Order volume and value for one calendar day
#[derive(Debug, Clone, PartialEq)]
pub struct DailyOrders {
    pub date: NaiveDate,
    pub order_count: u64,
    pub product_value: f64,
    pub freight_value: f64,
    pub total_value: f64,
}

impl DailyOrders {
    fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            order_count: 0,
            product_value: 0.0,
            freight_value: 0.0,
            total_value: 0.0,
        }
    }
}

/// Headline totals of a daily series
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OrderTotals {
    pub orders: u64,
    pub revenue: f64,
}

impl OrderTotals {
    pub fn from_daily(days: &[DailyOrders]) -> Self {
        days.iter().fold(Self::default(), |acc, day| Self {
            orders: acc.orders + day.order_count,
            revenue: acc.revenue + day.total_value,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryPerformance {
    pub category: String,
    pub quantity: u64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SellerPerformance {
    pub seller_id: String,
    pub order_count: u64,
    pub total_value: f64,
    /// `None` when none of the seller's orders carry a review score
    pub average_score: Option<f64>,
}

/// Distinct customers sharing a city or state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerCount {
    pub name: String,
    pub customer_count: u64,
}

/// Orders per day between the first and last order day in `frame`
///
/// Days without orders are included with zero counts. An empty frame gives
/// an empty series.
pub fn daily_orders(frame: &DataFrame) -> crate::Result<Vec<DailyOrders>> {
    let grouped = frame
        .clone()
        .lazy()
        .group_by([col(ORDER_DATE)])
        .agg([
            col(ORDER_ID).drop_nulls().n_unique().alias("order_count"),
            col(TOTAL_PRICE).cast(DataType::Float64).sum().alias("product_value"),
            col(FREIGHT_VALUE).cast(DataType::Float64).sum().alias("freight_value"),
            col(TOTAL_VALUE).cast(DataType::Float64).sum().alias("total_value"),
        ])
        .collect()?;

    let dates = string_values(&grouped, ORDER_DATE)?;
    let counts = count_values(&grouped, "order_count")?;
    let product = float_values(&grouped, "product_value")?;
    let freight = float_values(&grouped, "freight_value")?;
    let total = float_values(&grouped, "total_value")?;

    let mut by_day = BTreeMap::new();
    for (i, date) in dates.into_iter().enumerate() {
        let Some(date) = date else { continue };
        let date = NaiveDate::parse_from_str(&date, DATE_FORMAT)
            .with_context(|| format!("invalid order date {date:?}"))?;
        by_day.insert(
            date,
            DailyOrders {
                date,
                order_count: counts[i],
                product_value: product[i].unwrap_or_default(),
                freight_value: freight[i].unwrap_or_default(),
                total_value: total[i].unwrap_or_default(),
            },
        );
    }

    let (Some(&first), Some(&last)) = (by_day.keys().next(), by_day.keys().next_back()) else {
        return Ok(Vec::new());
    };

    let series = first
        .iter_days()
        .take_while(|day| *day <= last)
        .map(|day| by_day.remove(&day).unwrap_or_else(|| DailyOrders::empty(day)))
        .collect();

    Ok(series)
}

/// Units sold and line item value per product category
pub fn orders_by_category(frame: &DataFrame) -> crate::Result<Vec<CategoryPerformance>> {
    let grouped = group_by_key(
        frame,
        CATEGORY,
        [
            col(QUANTITY).cast(DataType::Float64).sum().alias("quantity"),
            col(TOTAL_PRICE).cast(DataType::Float64).sum().alias("value"),
        ],
    )?;

    let categories = string_values(&grouped, CATEGORY)?;
    let quantities = count_values(&grouped, "quantity")?;
    let values = float_values(&grouped, "value")?;

    let mut rows: Vec<CategoryPerformance> = categories
        .into_iter()
        .zip(quantities)
        .zip(values)
        .filter_map(|((category, quantity), value)| {
            Some(CategoryPerformance {
                category: category?,
                quantity,
                value: value.unwrap_or_default(),
            })
        })
        .collect();
    rows.sort_by(|a, b| a.category.cmp(&b.category));

    Ok(rows)
}

pub fn top_categories_by_quantity(
    rows: &[CategoryPerformance],
    n: usize,
) -> Vec<CategoryPerformance> {
    ranked(rows, n, |a, b| {
        b.quantity
            .cmp(&a.quantity)
            .then_with(|| a.category.cmp(&b.category))
    })
}

pub fn top_categories_by_value(
    rows: &[CategoryPerformance],
    n: usize,
) -> Vec<CategoryPerformance> {
    ranked(rows, n, |a, b| {
        b.value
            .total_cmp(&a.value)
            .then_with(|| a.category.cmp(&b.category))
    })
}

/// Orders, value and mean review score per seller, highest value first
///
/// Scores are `None` throughout when the frame has no `review_score` column.
pub fn sellers_performance(frame: &DataFrame) -> crate::Result<Vec<SellerPerformance>> {
    let has_scores = frame.column(REVIEW_SCORE).is_ok();

    let mut aggs = vec![
        col(ORDER_ID).drop_nulls().n_unique().alias("order_count"),
        col(TOTAL_PRICE).cast(DataType::Float64).sum().alias("total_value"),
    ];
    if has_scores {
        aggs.push(col(REVIEW_SCORE).cast(DataType::Float64).mean().alias("average_score"));
    }
    let grouped = group_by_key(frame, SELLER_ID, aggs)?;

    let sellers = string_values(&grouped, SELLER_ID)?;
    let counts = count_values(&grouped, "order_count")?;
    let totals = float_values(&grouped, "total_value")?;
    let scores = if has_scores {
        float_values(&grouped, "average_score")?
    } else {
        vec![None; grouped.height()]
    };

    let mut rows: Vec<SellerPerformance> = sellers
        .into_iter()
        .enumerate()
        .filter_map(|(i, seller)| {
            Some(SellerPerformance {
                seller_id: seller?,
                order_count: counts[i],
                total_value: totals[i].unwrap_or_default(),
                average_score: scores[i],
            })
        })
        .collect();
    rows.sort_by(|a, b| {
        b.total_value
            .total_cmp(&a.total_value)
            .then_with(|| a.seller_id.cmp(&b.seller_id))
    });

    Ok(rows)
}

/// Distinct customers per city, largest first
pub fn customers_by_city(frame: &DataFrame) -> crate::Result<Vec<CustomerCount>> {
    customers_by(frame, CUSTOMER_CITY)
}

/// Distinct customers per state, largest first
pub fn customers_by_state(frame: &DataFrame) -> crate::Result<Vec<CustomerCount>> {
    customers_by(frame, CUSTOMER_STATE)
}

fn customers_by(frame: &DataFrame, key: &str) -> crate::Result<Vec<CustomerCount>> {
    let grouped = group_by_key(
        frame,
        key,
        [col(CUSTOMER_ID).drop_nulls().n_unique().alias("customer_count")],
    )?;

    let names = string_values(&grouped, key)?;
    let counts = count_values(&grouped, "customer_count")?;

    let mut rows: Vec<CustomerCount> = names
        .into_iter()
        .zip(counts)
        .filter_map(|(name, customer_count)| {
            Some(CustomerCount {
                name: name?,
                customer_count,
            })
        })
        .collect();
    rows.sort_by(|a, b| {
        b.customer_count
            .cmp(&a.customer_count)
            .then_with(|| a.name.cmp(&b.name))
    });

    Ok(rows)
}

/// Mean review score over rows that have one, `0.0` when none do
pub fn average_review_score(frame: &DataFrame) -> crate::Result<f64> {
    let scores = float_values(frame, REVIEW_SCORE)?;
    Ok(mean_or_zero(scores.into_iter().flatten()))
}

fn group_by_key<E>(frame: &DataFrame, key: &str, aggs: E) -> crate::Result<DataFrame>
where
    E: AsRef<[Expr]>,
{
    let grouped = frame
        .clone()
        .lazy()
        .filter(col(key).is_not_null())
        .group_by([col(key)])
        .agg(aggs)
        .collect()?;
    Ok(grouped)
}

fn ranked<T, F>(rows: &[T], n: usize, cmp: F) -> Vec<T>
where
    T: Clone,
    F: FnMut(&T, &T) -> Ordering,
{
    let mut sorted = rows.to_vec();
    sorted.sort_by(cmp);
    sorted.truncate(n);
    sorted
}
