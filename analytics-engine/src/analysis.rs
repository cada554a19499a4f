//! Investigator summaries: high-risk flows, geography, fees, failures

use crate::aggregator::{currency_buckets, in_currency, SampleStats};
use crate::{Channel, Direction, Transaction, TransactionType};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Count / total / mean / std-dev block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueStats {
    /// Number of transactions
    pub count: usize,
    /// Sum of amounts
    pub total_value: Decimal,
    /// Mean amount
    pub average: Decimal,
    /// Sample standard deviation
    pub std_dev: Decimal,
}

impl From<SampleStats> for ValueStats {
    fn from(stats: SampleStats) -> Self {
        Self {
            count: stats.count,
            total_value: stats.total,
            average: stats.mean,
            std_dev: stats.std_dev,
        }
    }
}

/// Counterparties considered high risk, by reason
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HighRiskCounterparties {
    /// Located in a high-risk country
    pub geography: HashSet<String>,
    /// High-risk business type (money services, gambling, ...)
    pub institutions: HashSet<String>,
}

/// High-risk activity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HighRiskMetrics {
    /// Any transaction with a counterparty in a high-risk country
    pub high_risk_geography_transactions: ValueStats,
    /// Transfers with a high-risk institution
    pub high_risk_institution_transfers: ValueStats,
    /// Currency the figures are in
    pub currency: Option<String>,
    /// Other currencies were present and left out
    pub mixed_currency: bool,
}

/// High-risk figures over the dominant currency
pub fn high_risk_metrics(transactions: &[Transaction], high_risk: &HighRiskCounterparties) -> HighRiskMetrics {
    let (currency, buckets) = currency_buckets(transactions);
    let scoped = in_currency(transactions, currency.as_deref());

    let geography = SampleStats::from_amounts(
        scoped
            .iter()
            .filter(|tx| involves(&high_risk.geography, tx))
            .map(|tx| tx.amount),
    );
    let institutions = SampleStats::from_amounts(
        scoped
            .iter()
            .filter(|tx| tx.transaction_type.is_transfer())
            .filter(|tx| involves(&high_risk.institutions, tx))
            .map(|tx| tx.amount),
    );

    HighRiskMetrics {
        high_risk_geography_transactions: geography.into(),
        high_risk_institution_transfers: institutions.into(),
        currency,
        mixed_currency: buckets.len() > 1,
    }
}

fn involves(counterparties: &HashSet<String>, tx: &Transaction) -> bool {
    tx.counterparty_id
        .as_ref()
        .map_or(false, |id| counterparties.contains(id))
}

/// Count and value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CountValue {
    /// Number of transactions
    pub count: usize,
    /// Sum of amounts
    pub total_value: Decimal,
}

impl CountValue {
    fn add(&mut self, amount: Decimal) {
        self.count += 1;
        self.total_value += amount;
    }
}

/// Domestic versus cross-border split
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeographicDistribution {
    /// Counterparty in the customer's country, or no counterparty
    pub domestic: CountValue,
    /// Counterparty abroad or an international wire
    pub international: CountValue,
}

/// Fees charged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeeSummary {
    /// Sum of fees
    pub total: Decimal,
    /// Mean fee per transaction
    pub average: Decimal,
    /// Sum of fees per channel
    pub by_type: BTreeMap<Channel, Decimal>,
}

/// Failed transactions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailedSummary {
    /// Number failed
    pub count: usize,
    /// Sum of failed amounts
    pub total_value: Decimal,
    /// Count per failure reason
    pub reasons: BTreeMap<String, usize>,
}

/// Entry of the largest-transactions list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighestTransaction {
    /// Transaction ID
    pub id: String,
    /// Amount
    pub amount: Decimal,
    /// Currency
    pub currency: String,
    /// Booking time
    pub date: DateTime<Utc>,
    /// Debit or credit
    pub direction: Direction,
}

/// Detailed transaction analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionAnalysis {
    /// Domestic / international split
    pub geographic_distribution: GeographicDistribution,
    /// Fees
    pub fees: FeeSummary,
    /// Failures
    pub failed_transactions: FailedSummary,
    /// Largest transactions, biggest first
    pub highest_transactions: Vec<HighestTransaction>,
    /// Currency the figures are in
    pub currency: Option<String>,
    /// Other currencies were present and left out
    pub mixed_currency: bool,
}

/// Build the detailed analysis over the dominant currency.
///
/// `counterparty_countries` maps counterparty IDs to their country; a
/// counterparty missing from it counts as domestic unless the transaction is
/// an international wire.
pub fn transaction_analysis(
    transactions: &[Transaction],
    customer_country: &str,
    counterparty_countries: &HashMap<String, String>,
    top_n: usize,
) -> TransactionAnalysis {
    let (currency, buckets) = currency_buckets(transactions);
    let scoped = in_currency(transactions, currency.as_deref());
    let mut analysis = TransactionAnalysis {
        mixed_currency: buckets.len() > 1,
        currency,
        ..TransactionAnalysis::default()
    };

    for tx in &scoped {
        let abroad = tx.transaction_type == TransactionType::InternationalWire
            || tx
                .counterparty_id
                .as_ref()
                .and_then(|id| counterparty_countries.get(id))
                .map_or(false, |country| !country.eq_ignore_ascii_case(customer_country));
        if abroad {
            analysis.geographic_distribution.international.add(tx.amount);
        } else {
            analysis.geographic_distribution.domestic.add(tx.amount);
        }

        analysis.fees.total += tx.fee;
        *analysis.fees.by_type.entry(tx.channel).or_insert(Decimal::ZERO) += tx.fee;

        if let Some(reason) = tx.status.failure_reason() {
            analysis.failed_transactions.count += 1;
            analysis.failed_transactions.total_value += tx.amount;
            *analysis
                .failed_transactions
                .reasons
                .entry(reason.to_string())
                .or_insert(0) += 1;
        }
    }

    if !scoped.is_empty() {
        analysis.fees.average = (analysis.fees.total / Decimal::from(scoped.len())).round_dp(2);
    }

    let mut largest = scoped;
    largest.sort_by(|a, b| b.amount.cmp(&a.amount).then_with(|| a.timestamp.cmp(&b.timestamp)));
    analysis.highest_transactions = largest
        .into_iter()
        .take(top_n)
        .map(|tx| HighestTransaction {
            id: tx.transaction_id.clone(),
            amount: tx.amount,
            currency: tx.currency.clone(),
            date: tx.timestamp,
            direction: tx.direction(),
        })
        .collect();

    analysis
}
