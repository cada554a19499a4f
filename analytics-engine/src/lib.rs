//! AML Transaction Analytics & Risk-Scoring Engine
//!
//! On-demand analytics over a customer's transaction history, counterparty
//! network and risk indicators.
//!
//! # Architecture
//!
//! - **Stateless components**: aggregation, outlier detection, pattern
//!   recognition, scenarios and scoring are pure functions of their inputs
//! - **Collaborators**: storage and reference data sit behind the async
//!   [`DataAccess`] and [`RiskReference`] traits
//! - **Engine façade**: [`AnalyticsEngine`] fetches concurrently, joins, then
//!   scores
//!
//! # Invariants
//!
//! - Money is `Decimal`; currencies are bucketed, never converted
//! - Composite risk scores stay in [0,1] and overrides only raise a level
//! - Ownership traversal always terminates, loops are reported

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod error;
pub mod types;
pub mod window;
pub mod aggregator;
pub mod outlier;
pub mod patterns;
pub mod scenarios;
pub mod analysis;
pub mod scoring;
pub mod graph;
pub mod reference;
pub mod store;
pub mod config;
pub mod metrics;
pub mod engine;

// Re-exports
pub use error::{Error, ErrorKind, Result};
pub use types::*;
pub use window::{TimeRange, Window};
pub use aggregator::{WindowStatistics, WindowedAggregator};
pub use outlier::{Baseline, OutlierAnalysis, OutlierDetector};
pub use patterns::{PatternRecognizer, PatternReport};
pub use scoring::{RiskAssessment, RiskScorer};
pub use graph::{OwnershipGraph, SubsidiaryTree};
pub use reference::{RiskReference, StaticRiskReference};
pub use store::{DataAccess, InMemoryStore};
pub use config::Config;
pub use metrics::Metrics;
pub use engine::{AnalyticsEngine, CustomerRiskProfile};
