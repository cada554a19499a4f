//! Configuration for the analytics engine

use crate::graph::GraphConfig;
use crate::outlier::DEFAULT_Z_THRESHOLD;
use crate::patterns::PatternConfig;
use crate::scenarios::ScenarioConfig;
use crate::scoring::{RiskThresholds, RiskWeights};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Outlier detection
    pub outlier: OutlierConfig,

    /// Pattern recognition
    pub patterns: PatternConfig,

    /// Risk scoring
    pub risk: RiskConfig,

    /// Relationship graph
    pub graph: GraphConfig,

    /// Alert scenarios
    pub scenarios: ScenarioConfig,

    /// Engine façade
    pub engine: EngineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "analytics-engine".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            outlier: OutlierConfig::default(),
            patterns: PatternConfig::default(),
            risk: RiskConfig::default(),
            graph: GraphConfig::default(),
            scenarios: ScenarioConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

/// Outlier detection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierConfig {
    /// |z| above which a transaction is an outlier
    pub z_threshold: f64,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            z_threshold: DEFAULT_Z_THRESHOLD,
        }
    }
}

/// Risk scoring configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Customer factor weights
    pub weights: RiskWeights,

    /// Counterparty factor weights
    pub counterparty_weights: RiskWeights,

    /// Level boundaries
    pub thresholds: RiskThresholds,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            weights: RiskWeights::default(),
            // No ownership data for counterparties, so no network weight
            counterparty_weights: RiskWeights {
                country: 0.35,
                business_type: 0.20,
                transaction_pattern: 0.15,
                adverse_media: 0.15,
                pep: 0.15,
                network: 0.0,
            },
            thresholds: RiskThresholds::default(),
        }
    }
}

/// Engine façade configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Largest transactions re-analysed as outlier candidates per profile
    pub max_outlier_candidates: usize,

    /// Profile lookback (months)
    pub profile_lookback_months: u32,

    /// Entries in the highest-transactions list
    pub highest_transactions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_outlier_candidates: 5,
            profile_lookback_months: 6,
            highest_transactions: 5,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::InvalidConfig(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(name) = std::env::var("ANALYTICS_SERVICE_NAME") {
            config.service_name = name;
        }

        if let Some(z) = env_parse("ANALYTICS_Z_THRESHOLD")? {
            config.outlier.z_threshold = z;
        }

        if let Some(depth) = env_parse("ANALYTICS_MAX_SUBSIDIARY_DEPTH")? {
            config.graph.max_depth = depth;
        }

        if let Some(fail) = env_parse("ANALYTICS_FAIL_ON_CYCLE")? {
            config.graph.fail_on_cycle = fail;
        }

        if let Some(candidates) = env_parse("ANALYTICS_MAX_OUTLIER_CANDIDATES")? {
            config.engine.max_outlier_candidates = candidates;
        }

        if let Some(months) = env_parse("ANALYTICS_LOOKBACK_MONTHS")? {
            config.engine.profile_lookback_months = months;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings no component can run with
    pub fn validate(&self) -> Result<()> {
        if !(self.outlier.z_threshold.is_finite() && self.outlier.z_threshold > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "z_threshold must be positive, got {}",
                self.outlier.z_threshold
            )));
        }

        let patterns = &self.patterns;
        let non_negative = |value: f64| value.is_finite() && value >= 0.0;
        if !non_negative(patterns.weekly_tolerance_days)
            || !non_negative(patterns.monthly_tolerance_days)
            || !(patterns.amount_band_ratio.is_finite() && patterns.amount_band_ratio > 0.0)
            || patterns.min_occurrences < 2
        {
            return Err(Error::InvalidConfig(
                "pattern tolerances must be non-negative, band ratio positive, min_occurrences >= 2"
                    .to_string(),
            ));
        }

        self.scenarios.validate()?;

        self.risk.weights.validate()?;
        self.risk.counterparty_weights.validate()?;
        self.risk.thresholds.validate()?;

        let graph = &self.graph;
        if graph.default_depth == 0 || graph.default_depth > graph.max_depth {
            return Err(Error::InvalidConfig(format!(
                "graph depths must satisfy 0 < default_depth <= max_depth, got {} / {}",
                graph.default_depth, graph.max_depth
            )));
        }
        if !(graph.propagation_decay.is_finite() && (0.0..=1.0).contains(&graph.propagation_decay)) {
            return Err(Error::InvalidConfig(format!(
                "propagation_decay must be in [0,1], got {}",
                graph.propagation_decay
            )));
        }

        if self.engine.profile_lookback_months == 0 {
            return Err(Error::InvalidConfig(
                "profile_lookback_months must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::InvalidConfig(format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "analytics-engine");
        assert_eq!(config.outlier.z_threshold, 3.0);
        assert_eq!(config.graph.max_depth, 5);
        assert!(!config.graph.fail_on_cycle);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [outlier]
            z_threshold = 2.5

            [graph]
            fail_on_cycle = true
            "#,
        )
        .unwrap();

        assert_eq!(config.outlier.z_threshold, 2.5);
        assert!(config.graph.fail_on_cycle);
        assert_eq!(config.patterns.min_occurrences, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let mut config = Config::default();
        config.risk.weights.pep = 0.5;
        assert!(matches!(config.validate(), Err(Error::InvalidWeights(_))));
    }

    #[test]
    fn test_invalid_graph_rejected() {
        let mut config = Config::default();
        config.graph.default_depth = 9;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_scenario_windows_validated() {
        let mut config = Config::default();
        config.scenarios.structuring_window_days = i64::MAX;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let mut config = Config::default();
        config.scenarios.round_number_window_days = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let mut config = Config::default();
        config.scenarios.rapid_movement_ratio = rust_decimal::Decimal::ZERO;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_nan_pattern_settings_rejected() {
        let setters: [fn(&mut Config); 3] = [
            |c| c.patterns.weekly_tolerance_days = f64::NAN,
            |c| c.patterns.monthly_tolerance_days = f64::NAN,
            |c| c.patterns.amount_band_ratio = f64::NAN,
        ];
        for set in setters {
            let mut config = Config::default();
            set(&mut config);
            assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        }
    }
}
