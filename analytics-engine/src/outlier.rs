//! Outlier detection against a selectable baseline population

use crate::aggregator::{to_f64, SampleStats};
use crate::store::{EntityRef, TransactionFilter};
use crate::window::TimeRange;
use crate::{Error, Result, Transaction};
use chrono::{Duration, Months, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Default |z| above which a transaction is an outlier
pub const DEFAULT_Z_THRESHOLD: f64 = 3.0;

const TRAILING_MONTHS: u32 = 6;

/// Comparison population
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Baseline {
    /// Same customer, trailing six months up to the target
    #[serde(rename = "customer_6month")]
    Customer6Month,
    /// Same customer, same calendar day
    #[serde(rename = "customer_daily")]
    CustomerDaily,
    /// Every customer's transfers on the same calendar day
    #[serde(rename = "same_day_transfers")]
    SameDayTransfers,
}

impl Baseline {
    /// Wire identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Baseline::Customer6Month => "customer_6month",
            Baseline::CustomerDaily => "customer_daily",
            Baseline::SameDayTransfers => "same_day_transfers",
        }
    }

    /// The one population this baseline needs for `target`
    pub fn population_query(&self, target: &Transaction) -> Result<PopulationQuery> {
        match self {
            Baseline::Customer6Month => {
                let start = target
                    .timestamp
                    .checked_sub_months(Months::new(TRAILING_MONTHS))
                    .ok_or_else(|| {
                        Error::InvalidWindow(format!(
                            "six months before {} is out of range",
                            target.timestamp
                        ))
                    })?;
                Ok(PopulationQuery {
                    entity: EntityRef::Customer(target.customer_id.clone()),
                    range: TimeRange::new(start, target.timestamp)?,
                    filter: TransactionFilter::all(),
                })
            }
            Baseline::CustomerDaily => Ok(PopulationQuery {
                entity: EntityRef::Customer(target.customer_id.clone()),
                range: calendar_day(target)?,
                filter: TransactionFilter::all(),
            }),
            Baseline::SameDayTransfers => Ok(PopulationQuery {
                entity: EntityRef::AllCustomers,
                range: calendar_day(target)?,
                filter: TransactionFilter::transfers(),
            }),
        }
    }
}

impl fmt::Display for Baseline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Baseline {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "customer_6month" => Ok(Baseline::Customer6Month),
            "customer_daily" => Ok(Baseline::CustomerDaily),
            "same_day_transfers" => Ok(Baseline::SameDayTransfers),
            other => Err(Error::UnknownBaseline(other.to_string())),
        }
    }
}

/// Fetch request describing a baseline population
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulationQuery {
    /// Whose transactions
    pub entity: EntityRef,
    /// Time bounds
    pub range: TimeRange,
    /// Type narrowing
    pub filter: TransactionFilter,
}

/// `statistics` block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierStatistics {
    /// Population mean
    pub mean: Decimal,
    /// Population sample standard deviation
    pub std_dev: Decimal,
    /// Z-score, undefined without variance
    pub z_score: Option<f64>,
}

/// `comparison_metrics` block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonMetrics {
    /// Population mean
    pub average_amount: Decimal,
    /// Population sample standard deviation
    pub standard_deviation: Decimal,
    /// Z-score, undefined without variance
    pub z_score: Option<f64>,
}

/// Outlier verdict for one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierAnalysis {
    /// Analysed transaction
    pub transaction_id: String,
    /// Baseline used
    pub analysis_type: Baseline,
    /// |z| above threshold
    pub is_outlier: bool,
    /// Z-score, undefined without variance
    pub z_score: Option<f64>,
    /// Share of the population at or below the target amount, in percent
    pub percentile: Option<f64>,
    /// Threshold applied
    pub threshold: f64,
    /// Population statistics
    pub statistics: OutlierStatistics,
    /// Same figures under their legacy names
    pub comparison_metrics: ComparisonMetrics,
    /// Population size after excluding the target
    pub similar_transactions_count: usize,
    /// Human-readable contributing factors
    pub factors: Vec<String>,
    /// Population too small or without variance
    pub insufficient_data: bool,
}

/// Outlier detector
#[derive(Debug, Clone)]
pub struct OutlierDetector {
    z_threshold: f64,
}

impl Default for OutlierDetector {
    fn default() -> Self {
        Self::new(DEFAULT_Z_THRESHOLD)
    }
}

impl OutlierDetector {
    /// Create new detector
    pub fn new(z_threshold: f64) -> Self {
        Self { z_threshold }
    }

    /// Score `target` against `population`.
    ///
    /// The target itself and transactions in other currencies are dropped
    /// from the population before any statistic is computed.
    pub fn analyze(
        &self,
        target: &Transaction,
        baseline: Baseline,
        population: &[Transaction],
    ) -> OutlierAnalysis {
        let comparable: Vec<Decimal> = population
            .iter()
            .filter(|tx| tx.transaction_id != target.transaction_id)
            .filter(|tx| tx.currency == target.currency)
            .map(|tx| tx.amount)
            .collect();

        let stats = SampleStats::from_amounts(comparable.iter().copied());

        let z_score = if stats.count < 2 || stats.std_dev.is_zero() {
            None
        } else {
            let z = to_f64((target.amount - stats.mean) / stats.std_dev);
            z.is_finite().then_some(z)
        };

        let percentile = if comparable.is_empty() {
            None
        } else {
            let at_or_below = comparable.iter().filter(|a| **a <= target.amount).count();
            Some(at_or_below as f64 / comparable.len() as f64 * 100.0)
        };

        let is_outlier = z_score.map_or(false, |z| z.abs() > self.z_threshold);

        let mut factors = Vec::new();
        if let Some(z) = z_score.filter(|_| is_outlier) {
            if z > 0.0 {
                factors.push("Amount significantly higher than average".to_string());
            } else {
                factors.push("Amount significantly lower than average".to_string());
            }
            match baseline {
                Baseline::CustomerDaily => {
                    factors.push("Unusual amount for the customer's activity that day".to_string())
                }
                Baseline::SameDayTransfers => {
                    factors.push("Unusual amount among same-day transfers".to_string())
                }
                Baseline::Customer6Month => {}
            }
        }

        debug!(
            transaction_id = %target.transaction_id,
            baseline = %baseline,
            population = stats.count,
            z_score = ?z_score,
            is_outlier,
            "Outlier analysis complete"
        );

        OutlierAnalysis {
            transaction_id: target.transaction_id.clone(),
            analysis_type: baseline,
            is_outlier,
            z_score,
            percentile,
            threshold: self.z_threshold,
            statistics: OutlierStatistics {
                mean: stats.mean,
                std_dev: stats.std_dev,
                z_score,
            },
            comparison_metrics: ComparisonMetrics {
                average_amount: stats.mean,
                standard_deviation: stats.std_dev,
                z_score,
            },
            similar_transactions_count: stats.count,
            factors,
            insufficient_data: z_score.is_none(),
        }
    }
}

fn calendar_day(target: &Transaction) -> Result<TimeRange> {
    let start = target
        .timestamp
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_utc();
    let end = start + Duration::days(1) - Duration::milliseconds(1);
    TimeRange::new(start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Channel, TransactionStatus, TransactionType};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn tx(id: &str, amount: Decimal) -> Transaction {
        Transaction {
            transaction_id: id.to_string(),
            customer_id: "CUS001".to_string(),
            account_id: None,
            transaction_type: TransactionType::WireTransfer,
            amount,
            currency: "USD".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 14, 15, 30, 0).unwrap(),
            status: TransactionStatus::Completed,
            channel: Channel::Wire,
            counterparty_id: None,
            fee: Decimal::ZERO,
        }
    }

    #[test]
    fn test_target_excluded_from_its_own_population() {
        let population = vec![tx("T1", dec!(100)), tx("T2", dec!(200)), tx("T3", dec!(10000))];
        let analysis = OutlierDetector::default().analyze(&population[2], Baseline::Customer6Month, &population);

        assert_eq!(analysis.similar_transactions_count, 2);
        assert_eq!(analysis.statistics.mean, dec!(150));
        let sd = to_f64(analysis.statistics.std_dev);
        assert!((sd - 70.71).abs() < 0.01);
        let z = analysis.z_score.unwrap();
        assert!((z - 139.3).abs() < 0.1);
        assert!(analysis.is_outlier);
        assert_eq!(analysis.percentile, Some(100.0));
        assert_eq!(analysis.factors[0], "Amount significantly higher than average");
    }

    #[test]
    fn test_zero_variance_has_no_z_score() {
        let population = vec![tx("T1", dec!(500)), tx("T2", dec!(500)), tx("T3", dec!(90000))];
        let analysis = OutlierDetector::default().analyze(&population[2], Baseline::CustomerDaily, &population);
        assert_eq!(analysis.z_score, None);
        assert!(!analysis.is_outlier);
        assert!(analysis.insufficient_data);
    }

    #[test]
    fn test_empty_population() {
        let target = tx("T1", dec!(500));
        let analysis = OutlierDetector::default().analyze(&target, Baseline::SameDayTransfers, &[]);
        assert_eq!(analysis.similar_transactions_count, 0);
        assert_eq!(analysis.percentile, None);
        assert!(!analysis.is_outlier);
    }

    #[test]
    fn test_threshold_is_configurable() {
        let population = vec![tx("T1", dec!(100)), tx("T2", dec!(200)), tx("T3", dec!(300))];
        let strict = OutlierDetector::new(0.5).analyze(&population[2], Baseline::Customer6Month, &population);
        // z = (300 - 150) / 70.71 = 2.12
        assert!(strict.is_outlier);
        let default = OutlierDetector::default().analyze(&population[2], Baseline::Customer6Month, &population);
        assert!(!default.is_outlier);
    }

    #[test]
    fn test_baseline_parsing() {
        assert_eq!("customer_6month".parse::<Baseline>().unwrap(), Baseline::Customer6Month);
        assert_eq!(
            "peer_group".parse::<Baseline>(),
            Err(Error::UnknownBaseline("peer_group".to_string()))
        );
    }

    #[test]
    fn test_population_queries() {
        let target = tx("T1", dec!(500));

        let six = Baseline::Customer6Month.population_query(&target).unwrap();
        assert_eq!(six.entity, EntityRef::Customer("CUS001".to_string()));
        assert_eq!(six.range.start, Utc.with_ymd_and_hms(2023, 11, 14, 15, 30, 0).unwrap());
        assert_eq!(six.range.end, target.timestamp);

        let same_day = Baseline::SameDayTransfers.population_query(&target).unwrap();
        assert_eq!(same_day.entity, EntityRef::AllCustomers);
        assert_eq!(same_day.range.start, Utc.with_ymd_and_hms(2024, 5, 14, 0, 0, 0).unwrap());
        assert!(same_day.range.contains(Utc.with_ymd_and_hms(2024, 5, 14, 23, 59, 59).unwrap()));
        assert!(!same_day.filter.transaction_types.is_empty());
    }
}
