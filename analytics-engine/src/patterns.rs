//! Behavioural pattern recognition: channels, statuses, timing, recurrence

use crate::aggregator::{currency_buckets, in_currency, to_f64};
use crate::{Channel, Transaction};
use chrono::{Datelike, Timelike, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

const SECONDS_PER_DAY: f64 = 86_400.0;
const WEEK_DAYS: f64 = 7.0;
const MONTH_DAYS: f64 = 30.0;

const WEEK: [DayOfWeek; 7] = [
    DayOfWeek::Monday,
    DayOfWeek::Tuesday,
    DayOfWeek::Wednesday,
    DayOfWeek::Thursday,
    DayOfWeek::Friday,
    DayOfWeek::Saturday,
    DayOfWeek::Sunday,
];

/// Recurrence detection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Allowed deviation from a 7-day gap
    pub weekly_tolerance_days: f64,

    /// Allowed deviation from a 30-day gap
    pub monthly_tolerance_days: f64,

    /// Minimum transactions before a pair counts as recurring
    pub min_occurrences: usize,

    /// Relative width of an amount band (0.10 = amounts within ~10%)
    pub amount_band_ratio: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            weekly_tolerance_days: 2.0,
            monthly_tolerance_days: 5.0,
            min_occurrences: 3,
            amount_band_ratio: 0.10,
        }
    }
}

/// Day of week, Monday first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DayOfWeek {
    /// Monday
    Monday,
    /// Tuesday
    Tuesday,
    /// Wednesday
    Wednesday,
    /// Thursday
    Thursday,
    /// Friday
    Friday,
    /// Saturday
    Saturday,
    /// Sunday
    Sunday,
}

impl From<Weekday> for DayOfWeek {
    fn from(day: Weekday) -> Self {
        match day {
            Weekday::Mon => DayOfWeek::Monday,
            Weekday::Tue => DayOfWeek::Tuesday,
            Weekday::Wed => DayOfWeek::Wednesday,
            Weekday::Thu => DayOfWeek::Thursday,
            Weekday::Fri => DayOfWeek::Friday,
            Weekday::Sat => DayOfWeek::Saturday,
            Weekday::Sun => DayOfWeek::Sunday,
        }
    }
}

/// Count and value per channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSummary {
    /// Channel
    pub channel: Channel,
    /// Transactions
    pub count: usize,
    /// Summed amount
    pub total_value: Decimal,
}

/// Busiest day and hour (UTC)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeakActivity {
    /// Day of week with most transactions
    pub day_of_week: DayOfWeek,
    /// Hour of day with most transactions
    pub hour_of_day: u32,
}

/// Number of recurring counterparty/amount-band pairs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecurringPatterns {
    /// Pairs recurring roughly weekly
    pub weekly_transfers: usize,
    /// Pairs recurring roughly monthly
    pub monthly_payments: usize,
}

/// Pattern analysis result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternReport {
    /// Channels by descending total value, dominant currency only
    pub top_channels: Vec<ChannelSummary>,
    /// Count per status label
    pub status_distribution: BTreeMap<String, usize>,
    /// Peak activity, none for an empty set
    pub peak_activity: Option<PeakActivity>,
    /// Recurring pairs
    pub recurring_patterns: RecurringPatterns,
    /// Mean gap between consecutive transactions, e.g. "3.5 days"
    pub avg_time_between_transactions: Option<String>,
    /// Same mean gap as a number of days
    pub avg_days_between_transactions: Option<f64>,
    /// Currency of the channel values
    pub currency: Option<String>,
    /// Other currencies were present and left out of the channel values
    pub mixed_currency: bool,
}

/// Pattern recognizer
#[derive(Debug, Clone, Default)]
pub struct PatternRecognizer {
    config: PatternConfig,
}

impl PatternRecognizer {
    /// Create new recognizer
    pub fn new(config: PatternConfig) -> Self {
        Self { config }
    }

    /// Analyse a transaction set
    pub fn analyze(&self, transactions: &[Transaction]) -> PatternReport {
        let (currency, buckets) = currency_buckets(transactions);
        let scoped = in_currency(transactions, currency.as_deref());
        let avg_days = average_gap_days(transactions);

        PatternReport {
            top_channels: channel_distribution(&scoped),
            status_distribution: status_distribution(transactions),
            peak_activity: peak_activity(transactions),
            recurring_patterns: self.recurring_patterns(transactions),
            avg_time_between_transactions: avg_days.map(|d| format!("{:.1} days", d)),
            avg_days_between_transactions: avg_days,
            currency,
            mixed_currency: buckets.len() > 1,
        }
    }

    /// Counterparty + amount-band pairs recurring at weekly or monthly gaps
    pub fn recurring_patterns(&self, transactions: &[Transaction]) -> RecurringPatterns {
        let mut patterns = RecurringPatterns::default();
        if transactions.len() < 2 {
            return patterns;
        }

        let mut groups: HashMap<(&str, i64), Vec<chrono::DateTime<chrono::Utc>>> = HashMap::new();
        for tx in transactions {
            if let Some(counterparty) = tx.counterparty_id.as_deref() {
                groups
                    .entry((counterparty, self.amount_band(tx.amount)))
                    .or_default()
                    .push(tx.timestamp);
            }
        }

        for timestamps in groups.values_mut() {
            if timestamps.len() < self.config.min_occurrences.max(2) {
                continue;
            }
            timestamps.sort();
            let gaps: Vec<f64> = timestamps
                .windows(2)
                .map(|w| (w[1] - w[0]).num_seconds() as f64 / SECONDS_PER_DAY)
                .collect();

            if gaps
                .iter()
                .all(|g| (g - WEEK_DAYS).abs() <= self.config.weekly_tolerance_days)
            {
                patterns.weekly_transfers += 1;
            } else if gaps
                .iter()
                .all(|g| (g - MONTH_DAYS).abs() <= self.config.monthly_tolerance_days)
            {
                patterns.monthly_payments += 1;
            }
        }

        patterns
    }

    /// Logarithmic amount bucket
    fn amount_band(&self, amount: Decimal) -> i64 {
        let value = to_f64(amount);
        if value <= 0.0 {
            return i64::MIN;
        }
        (value.ln() / (1.0 + self.config.amount_band_ratio).ln()).floor() as i64
    }
}

fn channel_distribution(transactions: &[&Transaction]) -> Vec<ChannelSummary> {
    let mut by_channel: BTreeMap<Channel, ChannelSummary> = BTreeMap::new();
    for tx in transactions {
        let entry = by_channel.entry(tx.channel).or_insert(ChannelSummary {
            channel: tx.channel,
            count: 0,
            total_value: Decimal::ZERO,
        });
        entry.count += 1;
        entry.total_value += tx.amount;
    }

    let mut channels: Vec<ChannelSummary> = by_channel.into_values().collect();
    // Stable sort keeps channel order for equal totals
    channels.sort_by(|a, b| b.total_value.cmp(&a.total_value));
    channels
}

fn status_distribution(transactions: &[Transaction]) -> BTreeMap<String, usize> {
    let mut distribution = BTreeMap::new();
    for tx in transactions {
        *distribution.entry(tx.status.label().to_string()).or_insert(0) += 1;
    }
    distribution
}

fn peak_activity(transactions: &[Transaction]) -> Option<PeakActivity> {
    if transactions.is_empty() {
        return None;
    }

    let mut days = [0usize; 7];
    let mut hours = [0usize; 24];
    for tx in transactions {
        days[tx.timestamp.weekday().num_days_from_monday() as usize] += 1;
        hours[tx.timestamp.hour() as usize] += 1;
    }

    Some(PeakActivity {
        day_of_week: WEEK[first_max(&days)],
        hour_of_day: first_max(&hours) as u32,
    })
}

fn first_max(counts: &[usize]) -> usize {
    let mut best = 0;
    for (i, count) in counts.iter().enumerate() {
        if *count > counts[best] {
            best = i;
        }
    }
    best
}

fn average_gap_days(transactions: &[Transaction]) -> Option<f64> {
    if transactions.len() < 2 {
        return None;
    }
    let mut timestamps: Vec<_> = transactions.iter().map(|tx| tx.timestamp).collect();
    timestamps.sort();
    let total: f64 = timestamps
        .windows(2)
        .map(|w| (w[1] - w[0]).num_seconds() as f64 / SECONDS_PER_DAY)
        .sum();
    Some(total / (timestamps.len() - 1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TransactionStatus, TransactionType};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn tx(id: &str, at: DateTime<Utc>, amount: Decimal, channel: Channel, counterparty: &str) -> Transaction {
        Transaction {
            transaction_id: id.to_string(),
            customer_id: "CUS001".to_string(),
            account_id: None,
            transaction_type: TransactionType::WireTransfer,
            amount,
            currency: "USD".to_string(),
            timestamp: at,
            status: TransactionStatus::Completed,
            channel,
            counterparty_id: Some(counterparty.to_string()),
            fee: Decimal::ZERO,
        }
    }

    // 2024-01-03 is a Wednesday
    fn wednesday_2pm() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 3, 14, 0, 0).unwrap()
    }

    #[test]
    fn test_weekly_recurrence_over_four_weeks() {
        let txs: Vec<Transaction> = (0..4)
            .map(|week| {
                tx(
                    &format!("T{}", week),
                    wednesday_2pm() + Duration::weeks(week),
                    dec!(2500),
                    Channel::Ach,
                    "CPT-RENT",
                )
            })
            .collect();

        let report = PatternRecognizer::default().analyze(&txs);
        assert_eq!(report.recurring_patterns.weekly_transfers, 1);
        assert_eq!(report.recurring_patterns.monthly_payments, 0);
        assert_eq!(
            report.peak_activity,
            Some(PeakActivity {
                day_of_week: DayOfWeek::Wednesday,
                hour_of_day: 14
            })
        );
        assert_eq!(report.avg_time_between_transactions.as_deref(), Some("7.0 days"));
    }

    #[test]
    fn test_monthly_recurrence_with_tolerance() {
        let start = wednesday_2pm();
        let txs = vec![
            tx("T1", start, dec!(1200), Channel::Ach, "CPT-LOAN"),
            tx("T2", start + Duration::days(31), dec!(1210), Channel::Ach, "CPT-LOAN"),
            tx("T3", start + Duration::days(59), dec!(1195), Channel::Ach, "CPT-LOAN"),
        ];
        let report = PatternRecognizer::default().analyze(&txs);
        assert_eq!(report.recurring_patterns.monthly_payments, 1);
        assert_eq!(report.recurring_patterns.weekly_transfers, 0);
    }

    #[test]
    fn test_irregular_gaps_do_not_recur() {
        let start = wednesday_2pm();
        let txs = vec![
            tx("T1", start, dec!(500), Channel::Wire, "CPT-X"),
            tx("T2", start + Duration::days(7), dec!(500), Channel::Wire, "CPT-X"),
            tx("T3", start + Duration::days(20), dec!(500), Channel::Wire, "CPT-X"),
        ];
        let patterns = PatternRecognizer::default().recurring_patterns(&txs);
        assert_eq!(patterns, RecurringPatterns::default());
    }

    #[test]
    fn test_channel_ordering_and_status_counts() {
        let at = wednesday_2pm();
        let mut failed = tx("T3", at, dec!(50), Channel::Wire, "C");
        failed.status = TransactionStatus::Failed {
            reason: "INVALID_ACCOUNT".to_string(),
        };
        let txs = vec![
            tx("T1", at, dec!(100), Channel::Wire, "A"),
            tx("T2", at, dec!(900), Channel::Ach, "B"),
            failed,
        ];
        let report = PatternRecognizer::default().analyze(&txs);
        assert_eq!(report.top_channels[0].channel, Channel::Ach);
        assert_eq!(report.top_channels[1].channel, Channel::Wire);
        assert_eq!(report.top_channels[1].count, 2);
        assert_eq!(report.status_distribution["COMPLETED"], 2);
        assert_eq!(report.status_distribution["FAILED"], 1);
    }

    #[test]
    fn test_channel_values_stay_in_dominant_currency() {
        let at = wednesday_2pm();
        let mut yen = tx("T3", at, dec!(1000000), Channel::Wire, "C");
        yen.currency = "JPY".to_string();
        let txs = vec![
            tx("T1", at, dec!(100), Channel::Wire, "A"),
            tx("T2", at, dec!(300), Channel::Ach, "B"),
            yen,
        ];
        let report = PatternRecognizer::default().analyze(&txs);
        assert_eq!(report.currency.as_deref(), Some("USD"));
        assert!(report.mixed_currency);
        assert_eq!(report.top_channels[0].channel, Channel::Ach);
        assert_eq!(report.top_channels[1].channel, Channel::Wire);
        assert_eq!(report.top_channels[1].count, 1);
        assert_eq!(report.top_channels[1].total_value, dec!(100));
        // Statuses still count every transaction
        assert_eq!(report.status_distribution["COMPLETED"], 3);
    }

    #[test]
    fn test_peak_ties_break_to_earliest() {
        let monday = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let txs = vec![
            tx("T1", monday + Duration::days(2) + Duration::hours(1), dec!(1), Channel::Wire, "A"),
            tx("T2", monday, dec!(1), Channel::Wire, "A"),
        ];
        let peak = PatternRecognizer::default().analyze(&txs).peak_activity.unwrap();
        assert_eq!(peak.day_of_week, DayOfWeek::Monday);
        assert_eq!(peak.hour_of_day, 9);
    }

    #[test]
    fn test_single_transaction_has_no_intervals() {
        let txs = vec![tx("T1", wednesday_2pm(), dec!(10), Channel::Cash, "A")];
        let report = PatternRecognizer::default().analyze(&txs);
        assert_eq!(report.recurring_patterns, RecurringPatterns::default());
        assert_eq!(report.avg_time_between_transactions, None);
        assert!(report.peak_activity.is_some());
    }
}
