//! Multi-factor risk scoring
//!
//! Two steps: a weighted composite of factor values mapped onto a level,
//! then regulatory overrides that can only raise that level.

use crate::aggregator::WindowStatistics;
use crate::outlier::OutlierAnalysis;
use crate::patterns::PatternReport;
use crate::scenarios::ScenarioHit;
use crate::{Error, Result, RiskLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Risk factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorKind {
    /// Customer or counterparty jurisdiction
    CountryRisk,
    /// Industry
    BusinessTypeRisk,
    /// Behaviour derived from outliers, patterns and scenarios
    TransactionPatternRisk,
    /// Negative news coverage
    AdverseMedia,
    /// Politically exposed person
    Pep,
    /// Risk carried in through subsidiaries and counterparties
    NetworkRisk,
}

/// Weighted factor value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    /// Factor
    pub name: FactorKind,
    /// Weight
    pub weight: f64,
    /// Value in [0,1]
    pub value: f64,
}

/// Factor weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskWeights {
    /// Country risk
    pub country: f64,
    /// Business type risk
    pub business_type: f64,
    /// Transaction pattern risk
    pub transaction_pattern: f64,
    /// Adverse media
    pub adverse_media: f64,
    /// PEP status
    pub pep: f64,
    /// Network risk
    pub network: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            country: 0.25,
            business_type: 0.10,
            transaction_pattern: 0.30,
            adverse_media: 0.15,
            pep: 0.10,
            network: 0.10,
        }
    }
}

impl RiskWeights {
    /// Weight of a factor
    pub fn weight_of(&self, kind: FactorKind) -> f64 {
        match kind {
            FactorKind::CountryRisk => self.country,
            FactorKind::BusinessTypeRisk => self.business_type,
            FactorKind::TransactionPatternRisk => self.transaction_pattern,
            FactorKind::AdverseMedia => self.adverse_media,
            FactorKind::Pep => self.pep,
            FactorKind::NetworkRisk => self.network,
        }
    }

    /// Check the weights are non-negative and sum to 1.0
    pub fn validate(&self) -> Result<()> {
        validate_weights(
            [
                self.country,
                self.business_type,
                self.transaction_pattern,
                self.adverse_media,
                self.pep,
                self.network,
            ]
            .into_iter(),
        )
    }
}

/// Level boundaries: LOW below `low`, MEDIUM below `medium`, HIGH otherwise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskThresholds {
    /// LOW / MEDIUM boundary
    pub low: f64,
    /// MEDIUM / HIGH boundary
    pub medium: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            low: 0.34,
            medium: 0.67,
        }
    }
}

impl RiskThresholds {
    /// Check `0 < low < medium <= 1`
    pub fn validate(&self) -> Result<()> {
        if !(self.low > 0.0 && self.low < self.medium && self.medium <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "risk thresholds must satisfy 0 < low < medium <= 1, got low={} medium={}",
                self.low, self.medium
            )));
        }
        Ok(())
    }
}

/// Raw factor values in [0,1]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactorValues {
    /// Country risk
    pub country: f64,
    /// Business type risk
    pub business_type: f64,
    /// Transaction pattern risk
    pub transaction_pattern: f64,
    /// Adverse media score
    pub adverse_media: f64,
    /// 1.0 for a PEP
    pub pep: f64,
    /// Network risk
    pub network: f64,
}

impl FactorValues {
    /// Pair the values with `weights`
    pub fn weighted(&self, weights: &RiskWeights) -> Vec<RiskFactor> {
        [
            (FactorKind::CountryRisk, self.country),
            (FactorKind::BusinessTypeRisk, self.business_type),
            (FactorKind::TransactionPatternRisk, self.transaction_pattern),
            (FactorKind::AdverseMedia, self.adverse_media),
            (FactorKind::Pep, self.pep),
            (FactorKind::NetworkRisk, self.network),
        ]
        .into_iter()
        .map(|(name, value)| RiskFactor {
            name,
            weight: weights.weight_of(name),
            value,
        })
        .collect()
    }
}

/// Indicators that trigger level overrides
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskIndicators {
    /// Politically exposed person
    pub is_pep: bool,
    /// Sanctions list hit
    pub sanctioned: bool,
}

/// Override rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverrideRule {
    /// PEP is at least MEDIUM
    PepFloor,
    /// Sanctions hit is HIGH
    SanctionsFloor,
}

/// Applied override
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskOverride {
    /// Rule
    pub rule: OverrideRule,
    /// Level before the rule
    pub from: RiskLevel,
    /// Level after the rule
    pub to: RiskLevel,
}

/// Factor line of an assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorContribution {
    /// Factor
    pub factor: FactorKind,
    /// Weight
    pub weight: f64,
    /// Clamped value
    pub value: f64,
    /// weight × value
    pub contribution: f64,
}

/// Risk assessment of one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Customer or counterparty ID
    pub entity_id: String,
    /// Composite score in [0,1]
    pub risk_score: f64,
    /// 1 = LOW, 2 = MEDIUM, 3 = HIGH
    pub numeric_level: u8,
    /// Final level after overrides
    pub risk_level: RiskLevel,
    /// Per-factor breakdown
    pub factors: Vec<FactorContribution>,
    /// Overrides that changed the level
    pub overrides: Vec<RiskOverride>,
    /// Assessment time
    pub assessed_at: DateTime<Utc>,
}

/// Risk scorer
#[derive(Debug, Clone)]
pub struct RiskScorer {
    weights: RiskWeights,
    thresholds: RiskThresholds,
}

impl RiskScorer {
    /// Create new scorer, rejecting invalid weights or thresholds
    pub fn new(weights: RiskWeights, thresholds: RiskThresholds) -> Result<Self> {
        weights.validate()?;
        thresholds.validate()?;
        Ok(Self {
            weights,
            thresholds,
        })
    }

    /// Weighted composite in [0,1]
    pub fn composite(&self, factors: &[RiskFactor]) -> Result<f64> {
        validate_weights(factors.iter().map(|f| f.weight))?;
        let score: f64 = factors
            .iter()
            .map(|f| f.weight * clamp_unit(f.value))
            .sum();
        Ok(clamp_unit(score))
    }

    /// Level for a composite score
    pub fn level_for(&self, score: f64) -> RiskLevel {
        if score < self.thresholds.low {
            RiskLevel::Low
        } else if score < self.thresholds.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }

    /// Raise `level` to the floors the indicators demand
    pub fn apply_overrides(
        &self,
        level: RiskLevel,
        indicators: &RiskIndicators,
    ) -> (RiskLevel, Vec<RiskOverride>) {
        let mut current = level;
        let mut applied = Vec::new();

        let rules = [
            (indicators.is_pep, OverrideRule::PepFloor, RiskLevel::Medium),
            (indicators.sanctioned, OverrideRule::SanctionsFloor, RiskLevel::High),
        ];
        for (triggered, rule, floor) in rules {
            if triggered && current < floor {
                applied.push(RiskOverride {
                    rule,
                    from: current,
                    to: floor,
                });
                current = floor;
            }
        }

        (current, applied)
    }

    /// Full assessment from raw factor values
    pub fn assess(
        &self,
        entity_id: &str,
        values: &FactorValues,
        indicators: &RiskIndicators,
    ) -> Result<RiskAssessment> {
        let factors = values.weighted(&self.weights);
        let risk_score = self.composite(&factors)?;
        let (risk_level, overrides) = self.apply_overrides(self.level_for(risk_score), indicators);

        debug!(
            entity_id,
            risk_score,
            risk_level = %risk_level,
            overrides = overrides.len(),
            "Risk assessed"
        );

        Ok(RiskAssessment {
            entity_id: entity_id.to_string(),
            risk_score,
            numeric_level: numeric_level(risk_level),
            risk_level,
            factors: factors
                .iter()
                .map(|f| FactorContribution {
                    factor: f.name,
                    weight: f.weight,
                    value: clamp_unit(f.value),
                    contribution: f.weight * clamp_unit(f.value),
                })
                .collect(),
            overrides,
            assessed_at: Utc::now(),
        })
    }
}

/// Transaction-pattern factor from detector outputs.
///
/// The strongest signal wins: outlier strength (|z| at twice the threshold
/// saturates), half the failed-transaction ratio, or the most severe
/// scenario hit.
pub fn transaction_pattern_risk(
    outliers: &[OutlierAnalysis],
    patterns: &PatternReport,
    scenario_hits: &[ScenarioHit],
    stats: &WindowStatistics,
) -> f64 {
    let outlier_component = outliers
        .iter()
        .filter(|o| o.is_outlier)
        .filter_map(|o| o.z_score.map(|z| (z.abs() / (2.0 * o.threshold)).min(1.0)))
        .fold(0.0, f64::max);

    let total: usize = patterns.status_distribution.values().sum();
    let failed = patterns
        .status_distribution
        .get("FAILED")
        .copied()
        .unwrap_or(0);
    let failed_component = if total == 0 || stats.count == 0 {
        0.0
    } else {
        0.5 * failed as f64 / total as f64
    };

    let scenario_component = scenario_hits
        .iter()
        .map(|h| h.severity)
        .fold(0.0, f64::max);

    clamp_unit(outlier_component.max(failed_component).max(scenario_component))
}

fn numeric_level(level: RiskLevel) -> u8 {
    match level {
        RiskLevel::Low => 1,
        RiskLevel::Medium => 2,
        RiskLevel::High => 3,
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn validate_weights(weights: impl Iterator<Item = f64>) -> Result<()> {
    let mut sum = 0.0;
    for weight in weights {
        if !weight.is_finite() || weight < 0.0 {
            return Err(Error::InvalidWeights(format!(
                "weight {} is negative or not finite",
                weight
            )));
        }
        sum += weight;
    }
    if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(Error::InvalidWeights(format!(
            "weights sum to {:.6}, expected 1.0",
            sum
        )));
    }
    Ok(())
}
