//! Time-bucketed aggregation.
//!
//! One engine serves every chart: records are grouped by a calendar bucket
//! (day, ISO week, month), each bucket is reduced to a number (count, sum,
//! average). The per-domain views (productivity per day, mood per day,
//! spending per category, income/expense per month) are thin wrappers that
//! pick the date, the value and the reducer.
//!
//! Records without a usable date or with a non-finite value are left out of
//! every bucket rather than failing the aggregation.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use crate::types::{Category, Transaction};

/// Calendar interval used to group records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketUnit {
    Day,
    /// ISO week, starting Monday
    Week,
    Month,
}

impl BucketUnit {
    /// First day of the bucket containing `date`.
    pub fn bucket_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            BucketUnit::Day => date,
            BucketUnit::Week => {
                date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
            }
            BucketUnit::Month => date.with_day(1).unwrap_or(date),
        }
    }

    /// Stable label for a bucket: `2024-06-15`, `2024-W24`, `2024-06`.
    pub fn label(&self, start: NaiveDate) -> String {
        match self {
            BucketUnit::Day => start.format("%Y-%m-%d").to_string(),
            BucketUnit::Week => {
                let week = start.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            BucketUnit::Month => start.format("%Y-%m").to_string(),
        }
    }
}

/// How a bucket's values collapse into one number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Reducer {
    Count,
    Sum,
    Average,
}

/// Running accumulator for one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Accumulator {
    pub count: usize,
    pub sum: f64,
}

impl Accumulator {
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
    }

    /// Reduced value; `None` for an empty bucket.
    pub fn reduce(&self, reducer: Reducer) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(match reducer {
            Reducer::Count => self.count as f64,
            Reducer::Sum => self.sum,
            Reducer::Average => self.sum / self.count as f64,
        })
    }
}

/// One point of a time series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    /// First day of the bucket
    pub date: NaiveDate,
    pub label: String,
    pub value: f64,
    /// Number of records that fed this point (0 when `value` is the empty default)
    pub samples: usize,
}

/// Group `items` by an arbitrary key, accumulating `value_of` per key.
///
/// Items for which `key_of` returns `None` or whose value is not finite are skipped.
pub fn group_by<T, K, KF, VF>(items: &[T], key_of: KF, value_of: VF) -> BTreeMap<K, Accumulator>
where
    K: Ord,
    KF: Fn(&T) -> Option<K>,
    VF: Fn(&T) -> f64,
{
    let mut groups: BTreeMap<K, Accumulator> = BTreeMap::new();
    for item in items {
        let Some(key) = key_of(item) else {
            continue;
        };
        let value = value_of(item);
        if !value.is_finite() {
            continue;
        }
        groups.entry(key).or_default().push(value);
    }
    groups
}

/// Aggregate into calendar buckets, chronological, non-empty buckets only.
pub fn aggregate<T, DF, VF>(
    items: &[T],
    unit: BucketUnit,
    date_of: DF,
    value_of: VF,
    reducer: Reducer,
) -> Vec<SeriesPoint>
where
    DF: Fn(&T) -> Option<NaiveDate>,
    VF: Fn(&T) -> f64,
{
    group_by(items, |item| date_of(item).map(|d| unit.bucket_start(d)), value_of)
        .into_iter()
        .filter_map(|(start, acc)| {
            acc.reduce(reducer).map(|value| SeriesPoint {
                date: start,
                label: unit.label(start),
                value,
                samples: acc.count,
            })
        })
        .collect()
}

/// One point per day for the `days` days ending at `today`, oldest first.
///
/// Days without records get `empty_value` (e.g. 0 for counts, the neutral
/// mood for mood averages).
pub fn rolling_series<T, DF, VF>(
    items: &[T],
    today: NaiveDate,
    days: u32,
    date_of: DF,
    value_of: VF,
    reducer: Reducer,
    empty_value: f64,
) -> Vec<SeriesPoint>
where
    DF: Fn(&T) -> Option<NaiveDate>,
    VF: Fn(&T) -> f64,
{
    if days == 0 {
        return Vec::new();
    }
    let first = today - Duration::days(i64::from(days) - 1);
    let groups = group_by(
        items,
        |item| date_of(item).filter(|d| *d >= first && *d <= today),
        value_of,
    );

    (0..days)
        .map(|offset| {
            let date = first + Duration::days(i64::from(offset));
            let acc = groups.get(&date).copied().unwrap_or_default();
            SeriesPoint {
                date,
                label: BucketUnit::Day.label(date),
                value: acc.reduce(reducer).unwrap_or(empty_value),
                samples: acc.count,
            }
        })
        .collect()
}

// ============================================
// Expense views
// ============================================

/// One expense category's share of total spending.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySlice {
    pub category: Category,
    pub amount: f64,
    /// Share of all expenses, 0–100, unrounded
    pub percentage: f64,
    pub transactions: usize,
}

impl CategorySlice {
    /// Percentage rounded for display.
    pub fn rounded_percentage(&self) -> u32 {
        self.percentage.round().clamp(0.0, 100.0) as u32
    }
}

/// Spending per expense category, largest first.
///
/// Income is excluded, zero-amount categories are dropped, and every
/// percentage is 0 when nothing was spent.
pub fn category_breakdown(transactions: &[Transaction]) -> Vec<CategorySlice> {
    let groups = group_by(
        transactions,
        |tx| (!tx.is_income()).then_some(tx.category),
        |tx| tx.amount,
    );
    let total: f64 = groups.values().map(|acc| acc.sum).sum();

    let mut slices: Vec<CategorySlice> = groups
        .into_iter()
        .filter(|(_, acc)| acc.sum > 0.0)
        .map(|(category, acc)| CategorySlice {
            category,
            amount: acc.sum,
            percentage: if total > 0.0 {
                acc.sum / total * 100.0
            } else {
                0.0
            },
            transactions: acc.count,
        })
        .collect();

    slices.sort_by(|a, b| {
        b.amount
            .total_cmp(&a.amount)
            .then_with(|| a.category.cmp(&b.category))
    });
    slices
}

/// Income and expense totals for one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTotals {
    /// `YYYY-MM`
    pub month: String,
    pub income: f64,
    pub expense: f64,
}

impl MonthlyTotals {
    pub fn net(&self) -> f64 {
        self.income - self.expense
    }
}

/// Income vs. expense per month, chronological, most recent `months` kept.
pub fn monthly_trend(transactions: &[Transaction], months: usize) -> Vec<MonthlyTotals> {
    let month_of = |tx: &Transaction| Some(BucketUnit::Month.bucket_start(tx.date));
    let income = group_by(
        transactions,
        |tx| month_of(tx).filter(|_| tx.is_income()),
        |tx| tx.amount,
    );
    let expense = group_by(
        transactions,
        |tx| month_of(tx).filter(|_| !tx.is_income()),
        |tx| tx.amount,
    );

    let mut all_months: Vec<NaiveDate> = income.keys().chain(expense.keys()).copied().collect();
    all_months.sort();
    all_months.dedup();

    let skip = all_months.len().saturating_sub(months);
    all_months
        .into_iter()
        .skip(skip)
        .map(|start| MonthlyTotals {
            month: BucketUnit::Month.label(start),
            income: income.get(&start).map_or(0.0, |acc| acc.sum),
            expense: expense.get(&start).map_or(0.0, |acc| acc.sum),
        })
        .collect()
}
