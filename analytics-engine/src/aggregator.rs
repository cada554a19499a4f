//! Windowed aggregation over a transaction set
//!
//! Produces count / total / mean / sample standard deviation / velocity and
//! growth figures for a resolved [`TimeRange`]. Amounts in different
//! currencies are never converted: they are bucketed per currency and the
//! headline statistics are computed over the dominant currency only, with
//! `mixed_currency` raised so the caller knows other buckets exist.

use crate::window::TimeRange;
use crate::{Direction, Error, Result, Transaction};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

const MONTH_DAYS: u32 = 30;

/// Count, total, mean and sample standard deviation of a set of amounts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleStats {
    /// Number of observations
    pub count: usize,
    /// Sum of observations
    pub total: Decimal,
    /// Arithmetic mean, zero when empty
    pub mean: Decimal,
    /// Sample standard deviation (n - 1 divisor), zero when count < 2
    pub std_dev: Decimal,
}

impl SampleStats {
    /// Compute over any amount iterator
    pub fn from_amounts<I>(amounts: I) -> Self
    where
        I: IntoIterator<Item = Decimal>,
    {
        let values: Vec<Decimal> = amounts.into_iter().collect();
        let count = values.len();
        let total: Decimal = values.iter().copied().sum();

        if count == 0 {
            return Self {
                count,
                total,
                mean: Decimal::ZERO,
                std_dev: Decimal::ZERO,
            };
        }

        let mean = total / Decimal::from(count);
        let std_dev = if count < 2 {
            Decimal::ZERO
        } else {
            let squared: Decimal = values
                .iter()
                .map(|v| {
                    let d = *v - mean;
                    d * d
                })
                .sum();
            let variance = squared / Decimal::from(count - 1);
            variance.sqrt().unwrap_or(Decimal::ZERO)
        };

        Self {
            count,
            total,
            mean,
            std_dev,
        }
    }
}

/// Per-currency bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyBucket {
    /// Transactions in this currency
    pub count: usize,
    /// Sum in this currency
    pub total_amount: Decimal,
}

/// Growth between the two halves of the window, in percent
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GrowthRate {
    /// Percent change in transaction count, undefined when the first half is empty
    pub count_change_pct: Option<f64>,
    /// Percent change in amount, undefined when the first half sums to zero
    pub amount_change_pct: Option<f64>,
}

/// Statistics block for one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowStatistics {
    /// Resolved window start
    pub window_start: chrono::DateTime<chrono::Utc>,
    /// Resolved window end
    pub window_end: chrono::DateTime<chrono::Utc>,
    /// Transactions in the dominant currency
    pub count: usize,
    /// Sum in the dominant currency
    pub total_amount: Decimal,
    /// Mean amount
    pub mean: Decimal,
    /// Sample standard deviation
    pub std_dev: Decimal,
    /// Transactions per day of window
    pub velocity_per_day: f64,
    /// First half vs second half growth
    pub growth_rate: GrowthRate,
    /// Dominant currency, none for an empty set
    pub currency: Option<String>,
    /// More than one currency present
    pub mixed_currency: bool,
    /// All currency buckets
    pub currency_breakdown: BTreeMap<String, CurrencyBucket>,
    /// Fewer than two observations: std_dev reported as zero
    pub insufficient_data: bool,
}

/// Growth of one period relative to the previous one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodGrowth {
    /// Period start
    pub period_start: chrono::DateTime<chrono::Utc>,
    /// Period end
    pub period_end: chrono::DateTime<chrono::Utc>,
    /// Transactions in period
    pub count: usize,
    /// Amount in period
    pub total_amount: Decimal,
    /// Percent change in count vs previous period
    pub count_change_pct: Option<f64>,
    /// Percent change in amount vs previous period
    pub amount_change_pct: Option<f64>,
}

/// Debit or credit statistic set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionMetrics {
    /// Mean amount
    pub average: Decimal,
    /// Sample standard deviation
    pub std_dev: Decimal,
    /// Transactions per day
    pub velocity_per_day: f64,
}

/// Growth figures of the transaction-metrics view, as fractions (0.15 = +15%)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsGrowth {
    /// Amount change between the last two 30-day periods
    pub month_over_month: Option<f64>,
    /// Count change between window halves
    pub transaction_volume: Option<f64>,
}

/// Debit/credit separated metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionMetrics {
    /// Number of debits
    pub total_debits: usize,
    /// Number of credits
    pub total_credits: usize,
    /// Debit statistics
    pub debit_metrics: DirectionMetrics,
    /// Credit statistics
    pub credit_metrics: DirectionMetrics,
    /// Growth figures
    pub growth_rate: MetricsGrowth,
    /// Dominant currency
    pub currency: Option<String>,
    /// More than one currency present
    pub mixed_currency: bool,
}

/// Windowed aggregator
#[derive(Debug, Clone, Default)]
pub struct WindowedAggregator;

impl WindowedAggregator {
    /// Create new aggregator
    pub fn new() -> Self {
        Self
    }

    /// Summary statistics for the window
    pub fn summarize(&self, transactions: &[Transaction], range: &TimeRange) -> WindowStatistics {
        let (currency, breakdown) = currency_buckets(transactions);
        let scoped = in_currency(transactions, currency.as_deref());
        let stats = SampleStats::from_amounts(scoped.iter().map(|tx| tx.amount));

        debug!(
            count = stats.count,
            currencies = breakdown.len(),
            "Summarized transaction window"
        );

        WindowStatistics {
            window_start: range.start,
            window_end: range.end,
            count: stats.count,
            total_amount: stats.total,
            mean: stats.mean,
            std_dev: stats.std_dev,
            velocity_per_day: velocity(stats.count, range),
            growth_rate: half_growth(&scoped, range),
            mixed_currency: breakdown.len() > 1,
            currency,
            currency_breakdown: breakdown,
            insufficient_data: stats.count < 2,
        }
    }

    /// Period-over-period growth across consecutive equal-length periods
    pub fn growth_by_period(
        &self,
        transactions: &[Transaction],
        range: &TimeRange,
        period_days: u32,
    ) -> Result<Vec<PeriodGrowth>> {
        let periods = range.periods(period_days)?;
        if periods.len() < 2 {
            return Err(Error::InsufficientData(format!(
                "window of {:.1} days holds fewer than two {}-day periods",
                range.length_days(),
                period_days
            )));
        }

        let (currency, _) = currency_buckets(transactions);
        let scoped = in_currency(transactions, currency.as_deref());
        let last = periods.len() - 1;

        let mut result: Vec<PeriodGrowth> = Vec::with_capacity(periods.len());
        for (i, period) in periods.iter().enumerate() {
            let members: Vec<&Transaction> = scoped
                .iter()
                .copied()
                .filter(|tx| in_period(tx, period, i == last))
                .collect();
            let count = members.len();
            let total_amount: Decimal = members.iter().map(|tx| tx.amount).sum();

            let (count_change_pct, amount_change_pct) = match result.last() {
                Some(prev) => (
                    pct_change(prev.count as f64, count as f64),
                    pct_change(to_f64(prev.total_amount), to_f64(total_amount)),
                ),
                None => (None, None),
            };

            result.push(PeriodGrowth {
                period_start: period.start,
                period_end: period.end,
                count,
                total_amount,
                count_change_pct,
                amount_change_pct,
            });
        }

        Ok(result)
    }

    /// Debit and credit transactions as independent statistic sets
    pub fn transaction_metrics(
        &self,
        transactions: &[Transaction],
        range: &TimeRange,
    ) -> TransactionMetrics {
        let (currency, breakdown) = currency_buckets(transactions);
        let scoped = in_currency(transactions, currency.as_deref());

        let (debits, credits): (Vec<&Transaction>, Vec<&Transaction>) = scoped
            .iter()
            .copied()
            .partition(|tx| tx.direction() == Direction::Debit);

        let month_over_month = self
            .growth_by_period(transactions, range, MONTH_DAYS)
            .ok()
            .and_then(|series| series.last().and_then(|p| p.amount_change_pct))
            .map(|pct| pct / 100.0);

        let transaction_volume = half_growth(&scoped, range)
            .count_change_pct
            .map(|pct| pct / 100.0);

        TransactionMetrics {
            total_debits: debits.len(),
            total_credits: credits.len(),
            debit_metrics: direction_metrics(&debits, range),
            credit_metrics: direction_metrics(&credits, range),
            growth_rate: MetricsGrowth {
                month_over_month,
                transaction_volume,
            },
            currency,
            mixed_currency: breakdown.len() > 1,
        }
    }
}

/// Per-currency buckets and the dominant currency.
///
/// Dominance is decided by count, then total, then currency code.
pub(crate) fn currency_buckets(
    transactions: &[Transaction],
) -> (Option<String>, BTreeMap<String, CurrencyBucket>) {
    let mut buckets: BTreeMap<String, CurrencyBucket> = BTreeMap::new();
    for tx in transactions {
        let bucket = buckets.entry(tx.currency.clone()).or_insert(CurrencyBucket {
            count: 0,
            total_amount: Decimal::ZERO,
        });
        bucket.count += 1;
        bucket.total_amount += tx.amount;
    }

    // BTreeMap iterates codes ascending, so max_by keeps the last of equals;
    // iterate reversed to keep the alphabetically first on a full tie.
    let dominant = buckets
        .iter()
        .rev()
        .max_by(|(_, a), (_, b)| {
            a.count
                .cmp(&b.count)
                .then_with(|| a.total_amount.cmp(&b.total_amount))
        })
        .map(|(code, _)| code.clone());

    (dominant, buckets)
}

pub(crate) fn in_currency<'a>(
    transactions: &'a [Transaction],
    currency: Option<&str>,
) -> Vec<&'a Transaction> {
    match currency {
        Some(code) => transactions.iter().filter(|tx| tx.currency == code).collect(),
        None => Vec::new(),
    }
}

pub(crate) fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

fn velocity(count: usize, range: &TimeRange) -> f64 {
    let days = range.length_days();
    if days <= 0.0 {
        return 0.0;
    }
    count as f64 / days
}

fn in_period(tx: &Transaction, period: &TimeRange, inclusive_end: bool) -> bool {
    tx.timestamp >= period.start
        && (tx.timestamp < period.end || (inclusive_end && tx.timestamp == period.end))
}

fn pct_change(before: f64, after: f64) -> Option<f64> {
    if before == 0.0 {
        return None;
    }
    Some((after - before) / before * 100.0)
}

fn half_growth(transactions: &[&Transaction], range: &TimeRange) -> GrowthRate {
    let mid = range.midpoint();
    let first = TimeRange {
        start: range.start,
        end: mid,
    };
    let second = TimeRange {
        start: mid,
        end: range.end,
    };

    let (mut first_count, mut second_count) = (0usize, 0usize);
    let (mut first_amount, mut second_amount) = (Decimal::ZERO, Decimal::ZERO);
    for tx in transactions {
        if in_period(tx, &first, false) {
            first_count += 1;
            first_amount += tx.amount;
        } else if in_period(tx, &second, true) {
            second_count += 1;
            second_amount += tx.amount;
        }
    }

    GrowthRate {
        count_change_pct: pct_change(first_count as f64, second_count as f64),
        amount_change_pct: pct_change(to_f64(first_amount), to_f64(second_amount)),
    }
}

fn direction_metrics(transactions: &[&Transaction], range: &TimeRange) -> DirectionMetrics {
    let stats = SampleStats::from_amounts(transactions.iter().map(|tx| tx.amount));
    DirectionMetrics {
        average: stats.mean,
        std_dev: stats.std_dev,
        velocity_per_day: velocity(stats.count, range),
    }
}
