//! Risk-reference collaborator
//!
//! Country risk, business-type risk and PEP / sanctions / adverse-media
//! screening. The scorer consumes these as plain factor values; it never
//! looks anything up itself.

use crate::{Counterparty, Customer, Result, RiskLevel};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Country risk assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryRisk {
    /// ISO country code
    pub country_code: String,
    /// Rating
    pub risk_rating: RiskLevel,
    /// Rating as a factor value in [0,1]
    pub score: f64,
    /// Reasons behind the rating
    pub risk_factors: Vec<String>,
}

/// Entity submitted for screening
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningSubject {
    /// Customer or counterparty ID
    pub entity_id: String,
    /// Name
    pub name: String,
    /// Country
    pub country: String,
    /// Known public position
    pub pep_position: Option<String>,
}

impl From<&Customer> for ScreeningSubject {
    fn from(customer: &Customer) -> Self {
        Self {
            entity_id: customer.customer_id.clone(),
            name: customer.name.clone(),
            country: customer.country.clone(),
            pep_position: None,
        }
    }
}

impl From<&Counterparty> for ScreeningSubject {
    fn from(counterparty: &Counterparty) -> Self {
        Self {
            entity_id: counterparty.counterparty_id.clone(),
            name: counterparty.name.clone(),
            country: counterparty.country.clone(),
            pep_position: counterparty.pep_position.clone(),
        }
    }
}

/// Screening outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningResult {
    /// Screened entity
    pub entity_id: String,
    /// Politically exposed person
    pub is_pep: bool,
    /// Position held, when PEP
    pub pep_position: Option<String>,
    /// Listed on a sanctions list
    pub sanctioned: bool,
    /// Adverse-media score in [0,1]
    pub adverse_media_score: f64,
}

/// Risk-reference collaborator
#[async_trait]
pub trait RiskReference: Send + Sync {
    /// Risk of a country
    async fn country_risk(&self, country_code: &str) -> Result<CountryRisk>;

    /// Risk of a business type in [0,1]; unknown types count as medium
    async fn business_type_risk(&self, business_type: Option<&str>) -> Result<f64>;

    /// PEP, sanctions and adverse-media screening
    async fn screen(&self, subject: &ScreeningSubject) -> Result<ScreeningResult>;
}

/// Factor value of a rating
pub fn level_score(level: RiskLevel) -> f64 {
    match level {
        RiskLevel::Low => 0.2,
        RiskLevel::Medium => 0.6,
        RiskLevel::High => 0.9,
    }
}

/// Table-driven reference data
#[derive(Debug, Clone)]
pub struct StaticRiskReference {
    countries: HashMap<String, RiskLevel>,
    business_types: HashMap<String, RiskLevel>,
    sanctioned: HashSet<String>,
    adverse_media: HashMap<String, f64>,
    pep_positions: HashMap<String, String>,
}

impl Default for StaticRiskReference {
    fn default() -> Self {
        let countries = [
            ("US", RiskLevel::Low),
            ("UK", RiskLevel::Low),
            ("GB", RiskLevel::Low),
            ("CA", RiskLevel::Low),
            ("DE", RiskLevel::Low),
            ("FR", RiskLevel::Low),
            ("SG", RiskLevel::Medium),
            ("AE", RiskLevel::Medium),
            ("RU", RiskLevel::High),
            ("IR", RiskLevel::High),
            ("KP", RiskLevel::High),
        ];
        let business_types = [
            ("money services", RiskLevel::High),
            ("gambling", RiskLevel::High),
            ("precious metals", RiskLevel::High),
            ("cryptocurrency exchange", RiskLevel::High),
            ("real estate", RiskLevel::Medium),
            ("financial services", RiskLevel::Medium),
            ("construction", RiskLevel::Medium),
            ("energy", RiskLevel::Medium),
            ("technology", RiskLevel::Low),
            ("manufacturing", RiskLevel::Low),
            ("healthcare", RiskLevel::Low),
            ("retail", RiskLevel::Low),
            ("transportation", RiskLevel::Low),
            ("education", RiskLevel::Low),
        ];

        Self {
            countries: countries
                .iter()
                .map(|(code, level)| (code.to_string(), *level))
                .collect(),
            business_types: business_types
                .iter()
                .map(|(kind, level)| (kind.to_string(), *level))
                .collect(),
            sanctioned: HashSet::new(),
            adverse_media: HashMap::new(),
            pep_positions: HashMap::new(),
        }
    }
}

impl StaticRiskReference {
    /// Default tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Override a country rating
    pub fn with_country(mut self, country_code: &str, level: RiskLevel) -> Self {
        self.countries.insert(country_code.to_uppercase(), level);
        self
    }

    /// Mark an entity as sanctioned
    pub fn with_sanctioned(mut self, entity_id: &str) -> Self {
        self.sanctioned.insert(entity_id.to_string());
        self
    }

    /// Record an adverse-media score (clamped to [0,1])
    pub fn with_adverse_media(mut self, entity_id: &str, score: f64) -> Self {
        self.adverse_media
            .insert(entity_id.to_string(), score.clamp(0.0, 1.0));
        self
    }

    /// Record a PEP screening hit
    pub fn with_pep(mut self, entity_id: &str, position: &str) -> Self {
        self.pep_positions
            .insert(entity_id.to_string(), position.to_string());
        self
    }

    /// Rating of a country; unlisted countries are HIGH
    pub fn country_level(&self, country_code: &str) -> RiskLevel {
        self.countries
            .get(&country_code.to_uppercase())
            .copied()
            .unwrap_or(RiskLevel::High)
    }

    /// Rating of a business type; unknown or missing types are MEDIUM
    pub fn business_level(&self, business_type: Option<&str>) -> RiskLevel {
        business_type
            .and_then(|kind| self.business_types.get(&kind.trim().to_lowercase()))
            .copied()
            .unwrap_or(RiskLevel::Medium)
    }
}

#[async_trait]
impl RiskReference for StaticRiskReference {
    async fn country_risk(&self, country_code: &str) -> Result<CountryRisk> {
        let level = self.country_level(country_code);
        let risk_factors = match level {
            RiskLevel::High => vec![
                "AML Framework".to_string(),
                "Economic Sanctions".to_string(),
            ],
            RiskLevel::Medium => vec!["Regulatory Environment".to_string()],
            RiskLevel::Low => Vec::new(),
        };
        Ok(CountryRisk {
            country_code: country_code.to_uppercase(),
            risk_rating: level,
            score: level_score(level),
            risk_factors,
        })
    }

    async fn business_type_risk(&self, business_type: Option<&str>) -> Result<f64> {
        Ok(level_score(self.business_level(business_type)))
    }

    async fn screen(&self, subject: &ScreeningSubject) -> Result<ScreeningResult> {
        let pep_position = subject
            .pep_position
            .clone()
            .or_else(|| self.pep_positions.get(&subject.entity_id).cloned());

        Ok(ScreeningResult {
            entity_id: subject.entity_id.clone(),
            is_pep: pep_position.is_some(),
            pep_position,
            sanctioned: self.sanctioned.contains(&subject.entity_id),
            adverse_media_score: self
                .adverse_media
                .get(&subject.entity_id)
                .copied()
                .unwrap_or(0.0),
        })
    }
}
