//! Rule-based alert scenarios
//!
//! Each detector scans a customer's time-ordered transactions and reports
//! hits. Failed transactions never trigger a scenario.

use crate::aggregator::to_f64;
use crate::{Direction, Error, Result, Transaction, TransactionType};
use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Scenario parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Cash reporting threshold
    pub reporting_threshold: Decimal,
    /// Lower edge of the structuring band as a fraction of the threshold
    pub structuring_band_ratio: Decimal,
    /// Window for structuring deposits
    pub structuring_window_days: i64,
    /// Deposits needed for structuring
    pub structuring_min_count: usize,
    /// Credit-to-debit window for rapid movement
    pub rapid_movement_hours: i64,
    /// Debit as a fraction of the preceding credit
    pub rapid_movement_ratio: Decimal,
    /// Smallest amount considered for round-number detection
    pub round_number_min_amount: Decimal,
    /// Window for round-number amounts
    pub round_number_window_days: i64,
    /// Round amounts needed inside the window
    pub round_number_min_count: usize,
    /// Outbound transfer amount that triggers a high-risk flow check
    pub high_risk_flow_threshold: Decimal,
    /// Length of the latest period and of each baseline period
    pub unusual_period_days: i64,
    /// Baseline periods preceding the latest one
    pub unusual_baseline_periods: usize,
    /// Latest-period count or value over the baseline average that fires
    pub unusual_multiplier: f64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            reporting_threshold: Decimal::from(10_000),
            structuring_band_ratio: Decimal::new(9, 1),
            structuring_window_days: 7,
            structuring_min_count: 3,
            rapid_movement_hours: 48,
            rapid_movement_ratio: Decimal::new(9, 1),
            round_number_min_amount: Decimal::from(5_000),
            round_number_window_days: 30,
            round_number_min_count: 3,
            high_risk_flow_threshold: Decimal::from(10_000),
            unusual_period_days: 30,
            unusual_baseline_periods: 3,
            unusual_multiplier: 3.0,
        }
    }
}

impl ScenarioConfig {
    /// Reject windows chrono cannot represent and thresholds that disable a detector
    pub fn validate(&self) -> Result<()> {
        self.windows().map(|_| ())
    }

    fn windows(&self) -> Result<Windows> {
        let structuring = span("structuring_window_days", self.structuring_window_days, Duration::try_days)?;
        let rapid_movement = span("rapid_movement_hours", self.rapid_movement_hours, Duration::try_hours)?;
        let round_numbers = span("round_number_window_days", self.round_number_window_days, Duration::try_days)?;
        let unusual_period = span("unusual_period_days", self.unusual_period_days, Duration::try_days)?;

        if self.unusual_baseline_periods == 0 || self.unusual_baseline_periods > MAX_BASELINE_PERIODS {
            return Err(Error::InvalidConfig(format!(
                "unusual_baseline_periods must be in 1..={}, got {}",
                MAX_BASELINE_PERIODS, self.unusual_baseline_periods
            )));
        }
        // At most MAX_BASELINE_PERIODS + 1, fits in i32
        if unusual_period
            .checked_mul(self.unusual_baseline_periods as i32 + 1)
            .is_none()
        {
            return Err(Error::InvalidConfig(format!(
                "{} periods of {} days are out of range",
                self.unusual_baseline_periods, self.unusual_period_days
            )));
        }
        if !(self.unusual_multiplier.is_finite() && self.unusual_multiplier > 1.0) {
            return Err(Error::InvalidConfig(format!(
                "unusual_multiplier must be greater than 1, got {}",
                self.unusual_multiplier
            )));
        }

        for (name, value) in [
            ("reporting_threshold", self.reporting_threshold),
            ("round_number_min_amount", self.round_number_min_amount),
            ("high_risk_flow_threshold", self.high_risk_flow_threshold),
        ] {
            if value <= Decimal::ZERO {
                return Err(Error::InvalidConfig(format!("{} must be positive, got {}", name, value)));
            }
        }
        for (name, value) in [
            ("structuring_band_ratio", self.structuring_band_ratio),
            ("rapid_movement_ratio", self.rapid_movement_ratio),
        ] {
            if value <= Decimal::ZERO || value > Decimal::ONE {
                return Err(Error::InvalidConfig(format!("{} must be in (0,1], got {}", name, value)));
            }
        }
        if self.structuring_min_count == 0 || self.round_number_min_count == 0 {
            return Err(Error::InvalidConfig(
                "scenario minimum counts must be positive".to_string(),
            ));
        }

        Ok(Windows {
            structuring,
            rapid_movement,
            round_numbers,
            unusual_period,
        })
    }
}

const MAX_BASELINE_PERIODS: usize = 24;

fn span(name: &str, value: i64, build: fn(i64) -> Option<Duration>) -> Result<Duration> {
    match build(value) {
        Some(window) if value > 0 => Ok(window),
        _ => Err(Error::InvalidConfig(format!(
            "{} must be positive and representable, got {}",
            name, value
        ))),
    }
}

#[derive(Debug, Clone, Copy)]
struct Windows {
    structuring: Duration,
    rapid_movement: Duration,
    round_numbers: Duration,
    unusual_period: Duration,
}

/// Scenario type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioKind {
    /// Cash deposits kept just under the reporting threshold
    Structuring,
    /// Funds leave shortly after they arrive
    RapidMovement,
    /// Repeated large round amounts
    RoundNumbers,
    /// Large transfer to a high-risk jurisdiction
    HighRiskFlow,
    /// Latest period far above the customer's own baseline
    UnusualPattern,
}

impl ScenarioKind {
    /// Upper-case label
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioKind::Structuring => "STRUCTURING",
            ScenarioKind::RapidMovement => "RAPID_MOVEMENT",
            ScenarioKind::RoundNumbers => "ROUND_NUMBERS",
            ScenarioKind::HighRiskFlow => "HIGH_RISK_FLOW",
            ScenarioKind::UnusualPattern => "UNUSUAL_PATTERN",
        }
    }
}

/// One scenario hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioHit {
    /// Scenario
    pub scenario: ScenarioKind,
    /// Triggering transactions, oldest first
    pub transaction_ids: Vec<String>,
    /// Sum of the triggering amounts
    pub total_amount: Decimal,
    /// Currency of the triggering amounts
    pub currency: String,
    /// Severity in [0,1]
    pub severity: f64,
    /// Investigator-facing description
    pub description: String,
}

/// Scenario detector
#[derive(Debug, Clone)]
pub struct ScenarioDetector {
    config: ScenarioConfig,
    windows: Windows,
}

impl ScenarioDetector {
    /// Create new detector, rejecting an invalid configuration
    pub fn new(config: ScenarioConfig) -> Result<Self> {
        let windows = config.windows()?;
        Ok(Self { config, windows })
    }

    /// Run every scenario.
    ///
    /// `high_risk_counterparties` holds the counterparties located in a
    /// high-risk country.
    pub fn detect(
        &self,
        transactions: &[Transaction],
        high_risk_counterparties: &HashSet<String>,
    ) -> Vec<ScenarioHit> {
        let mut settled: Vec<&Transaction> =
            transactions.iter().filter(|tx| !tx.is_failed()).collect();
        settled.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        let mut hits = Vec::new();
        for group in by_currency(&settled).values() {
            hits.extend(self.structuring(group));
            hits.extend(self.rapid_movement(group));
            hits.extend(self.round_numbers(group));
            hits.extend(self.unusual_pattern(group));
        }
        hits.extend(self.high_risk_flow(&settled, high_risk_counterparties));

        debug!(
            transactions = transactions.len(),
            hits = hits.len(),
            "Scenario detection complete"
        );
        hits
    }

    fn structuring(&self, transactions: &[&Transaction]) -> Vec<ScenarioHit> {
        let threshold = self.config.reporting_threshold;
        let floor = threshold * self.config.structuring_band_ratio;
        let deposits: Vec<&Transaction> = transactions
            .iter()
            .copied()
            .filter(|tx| tx.transaction_type == TransactionType::CashDeposit)
            .filter(|tx| tx.amount >= floor && tx.amount < threshold)
            .collect();

        clusters(
            &deposits,
            self.windows.structuring,
            self.config.structuring_min_count,
        )
        .into_iter()
        .map(|cluster| {
            let extra = (cluster.len() - self.config.structuring_min_count) as f64;
            hit(
                ScenarioKind::Structuring,
                &cluster,
                (0.6 + 0.1 * extra).min(1.0),
                format!(
                    "{} cash deposits just below the {} reporting threshold within {} days",
                    cluster.len(),
                    threshold,
                    self.config.structuring_window_days
                ),
            )
        })
        .collect()
    }

    fn rapid_movement(&self, transactions: &[&Transaction]) -> Vec<ScenarioHit> {
        let window = self.windows.rapid_movement;
        let mut used: HashSet<&str> = HashSet::new();
        let mut hits = Vec::new();

        for (i, credit) in transactions.iter().enumerate() {
            if credit.direction() != Direction::Credit {
                continue;
            }
            let minimum = credit.amount * self.config.rapid_movement_ratio;
            let debit = transactions[i + 1..]
                .iter()
                .take_while(|tx| tx.timestamp - credit.timestamp <= window)
                .find(|tx| {
                    tx.direction() == Direction::Debit
                        && tx.amount >= minimum
                        && !used.contains(tx.transaction_id.as_str())
                });

            if let Some(debit) = debit {
                used.insert(debit.transaction_id.as_str());
                let elapsed = (debit.timestamp - credit.timestamp).num_seconds() as f64;
                let span = window.num_seconds().max(1) as f64;
                hits.push(hit(
                    ScenarioKind::RapidMovement,
                    &[*credit, *debit],
                    (0.5 + 0.5 * (1.0 - elapsed / span)).clamp(0.5, 1.0),
                    format!(
                        "{} {} moved out {:.1} hours after it arrived",
                        debit.amount,
                        debit.currency,
                        elapsed / 3600.0
                    ),
                ));
            }
        }
        hits
    }

    fn round_numbers(&self, transactions: &[&Transaction]) -> Vec<ScenarioHit> {
        let thousand = Decimal::from(1_000);
        let round: Vec<&Transaction> = transactions
            .iter()
            .copied()
            .filter(|tx| tx.amount >= self.config.round_number_min_amount)
            .filter(|tx| (tx.amount % thousand).is_zero())
            .collect();

        clusters(
            &round,
            self.windows.round_numbers,
            self.config.round_number_min_count,
        )
        .into_iter()
        .map(|cluster| {
            let extra = (cluster.len() - self.config.round_number_min_count) as f64;
            hit(
                ScenarioKind::RoundNumbers,
                &cluster,
                (0.4 + 0.1 * extra).min(1.0),
                format!(
                    "{} round-thousand amounts within {} days",
                    cluster.len(),
                    self.config.round_number_window_days
                ),
            )
        })
        .collect()
    }

    /// Latest period against the average of the periods before it. Needs at
    /// least one whole baseline period with activity.
    fn unusual_pattern(&self, transactions: &[&Transaction]) -> Option<ScenarioHit> {
        let (first, last) = (transactions.first()?, transactions.last()?);
        let period = self.windows.unusual_period;
        let recent_start = last.timestamp.checked_sub_signed(period)?;

        let covered = (recent_start - first.timestamp).num_seconds() / period.num_seconds();
        let periods = usize::try_from(covered)
            .ok()?
            .min(self.config.unusual_baseline_periods);
        if periods == 0 {
            return None;
        }
        let baseline_start = recent_start.checked_sub_signed(period.checked_mul(periods as i32)?)?;

        let (recent, baseline): (Vec<&Transaction>, Vec<&Transaction>) = transactions
            .iter()
            .copied()
            .filter(|tx| tx.timestamp > baseline_start)
            .partition(|tx| tx.timestamp > recent_start);
        if baseline.is_empty() || recent.is_empty() {
            return None;
        }

        let per_period = periods as f64;
        let count_ratio = recent.len() as f64 / (baseline.len() as f64 / per_period);
        let baseline_value: Decimal = baseline.iter().map(|tx| tx.amount).sum();
        let recent_value: Decimal = recent.iter().map(|tx| tx.amount).sum();
        let value_ratio = if baseline_value.is_zero() {
            0.0
        } else {
            to_f64(recent_value / baseline_value) * per_period
        };

        let ratio = count_ratio.max(value_ratio);
        let multiplier = self.config.unusual_multiplier;
        if ratio < multiplier {
            return None;
        }

        Some(hit(
            ScenarioKind::UnusualPattern,
            &recent,
            (0.5 + 0.1 * (ratio / multiplier - 1.0)).clamp(0.5, 1.0),
            format!(
                "Latest {} days at {:.1}x the average of the previous {} periods",
                self.config.unusual_period_days, ratio, periods
            ),
        ))
    }

    fn high_risk_flow(
        &self,
        transactions: &[&Transaction],
        high_risk_counterparties: &HashSet<String>,
    ) -> Vec<ScenarioHit> {
        let threshold = self.config.high_risk_flow_threshold;
        transactions
            .iter()
            .filter(|tx| tx.transaction_type.is_transfer() && tx.direction() == Direction::Debit)
            .filter(|tx| tx.amount >= threshold)
            .filter(|tx| {
                tx.counterparty_id
                    .as_ref()
                    .map_or(false, |id| high_risk_counterparties.contains(id))
            })
            .map(|tx| {
                let multiple = if threshold.is_zero() {
                    1.0
                } else {
                    to_f64(tx.amount / threshold)
                };
                hit(
                    ScenarioKind::HighRiskFlow,
                    &[*tx],
                    (0.7 + 0.3 * ((multiple - 1.0) / 4.0)).clamp(0.7, 1.0),
                    format!(
                        "{} {} sent to high-risk jurisdiction counterparty {}",
                        tx.amount,
                        tx.currency,
                        tx.counterparty_id.as_deref().unwrap_or_default()
                    ),
                )
            })
            .collect()
    }
}

fn by_currency<'a>(transactions: &[&'a Transaction]) -> BTreeMap<&'a str, Vec<&'a Transaction>> {
    let mut groups: BTreeMap<&str, Vec<&Transaction>> = BTreeMap::new();
    for tx in transactions {
        groups.entry(tx.currency.as_str()).or_default().push(*tx);
    }
    groups
}

/// Non-overlapping runs of at least `min_count` transactions that all fall
/// within `window` of the run's first transaction.
fn clusters<'a>(
    transactions: &[&'a Transaction],
    window: Duration,
    min_count: usize,
) -> Vec<Vec<&'a Transaction>> {
    let mut found = Vec::new();
    let mut start = 0;
    while start < transactions.len() {
        let anchor = transactions[start].timestamp;
        let run: Vec<&Transaction> = transactions[start..]
            .iter()
            .copied()
            .take_while(|tx| tx.timestamp - anchor <= window)
            .collect();

        if run.len() >= min_count.max(1) {
            start += run.len();
            found.push(run);
        } else {
            start += 1;
        }
    }
    found
}

fn hit(
    scenario: ScenarioKind,
    transactions: &[&Transaction],
    severity: f64,
    description: String,
) -> ScenarioHit {
    ScenarioHit {
        scenario,
        transaction_ids: transactions
            .iter()
            .map(|tx| tx.transaction_id.clone())
            .collect(),
        total_amount: transactions.iter().map(|tx| tx.amount).sum(),
        currency: transactions
            .first()
            .map(|tx| tx.currency.clone())
            .unwrap_or_default(),
        severity,
        description,
    }
}
