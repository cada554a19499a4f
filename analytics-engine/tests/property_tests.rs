//! Property-based tests for analytics invariants
//!
//! These tests use proptest to verify:
//! - Mean × count equals the window total
//! - Zero variance never yields a z-score or an outlier
//! - Composite scores stay in [0,1]; bad weight sets are rejected
//! - PEP status never scores below MEDIUM
//! - Ownership traversal terminates on arbitrary graphs

use analytics_engine::aggregator::SampleStats;
use analytics_engine::graph::OwnershipGraph;
use analytics_engine::scoring::{FactorValues, RiskIndicators, RiskThresholds, RiskWeights};
use analytics_engine::{
    Baseline, Channel, Error, OutlierDetector, RiskLevel, RiskScorer, SubsidiaryRelation, Transaction,
    TransactionStatus, TransactionType,
};
use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::HashSet;

/// Strategy for generating valid amounts (positive decimals)
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy for factor values, including out-of-range inputs
fn factor_strategy() -> impl Strategy<Value = FactorValues> {
    (
        -1.0f64..2.0,
        -1.0f64..2.0,
        -1.0f64..2.0,
        -1.0f64..2.0,
        -1.0f64..2.0,
        -1.0f64..2.0,
    )
        .prop_map(
            |(country, business_type, transaction_pattern, adverse_media, pep, network)| FactorValues {
                country,
                business_type,
                transaction_pattern,
                adverse_media,
                pep,
                network,
            },
        )
}

fn transaction(id: usize, amount: Decimal) -> Transaction {
    Transaction {
        transaction_id: format!("TXN{:04}", id),
        customer_id: "CUS001".to_string(),
        account_id: None,
        transaction_type: TransactionType::WireTransfer,
        amount,
        currency: "USD".to_string(),
        timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(id as i64),
        status: TransactionStatus::Completed,
        channel: Channel::Wire,
        counterparty_id: None,
        fee: Decimal::ZERO,
    }
}

fn scorer() -> RiskScorer {
    RiskScorer::new(RiskWeights::default(), RiskThresholds::default()).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: mean × count reproduces the total
    #[test]
    fn prop_mean_times_count_is_total(amounts in prop::collection::vec(amount_strategy(), 1..50)) {
        let stats = SampleStats::from_amounts(amounts.iter().copied());
        let total: Decimal = amounts.iter().copied().sum();

        prop_assert_eq!(stats.count, amounts.len());
        prop_assert_eq!(stats.total, total);
        let drift = (stats.mean * Decimal::from(stats.count) - total).abs();
        prop_assert!(drift < Decimal::new(1, 6), "drift {}", drift);
        prop_assert!(stats.std_dev >= Decimal::ZERO);
    }

    /// Property: identical population amounts never produce a z-score
    #[test]
    fn prop_zero_variance_is_never_an_outlier(
        amount in amount_strategy(),
        target_amount in amount_strategy(),
        size in 2usize..30,
    ) {
        let mut population: Vec<Transaction> = (0..size).map(|i| transaction(i, amount)).collect();
        let target = transaction(size, target_amount);
        population.push(target.clone());

        let analysis = OutlierDetector::default().analyze(&target, Baseline::Customer6Month, &population);
        prop_assert_eq!(analysis.z_score, None);
        prop_assert!(!analysis.is_outlier);
        prop_assert_eq!(analysis.similar_transactions_count, size);
    }

    /// Property: z-score sign follows the target's side of the mean
    #[test]
    fn prop_z_score_sign(amounts in prop::collection::vec(amount_strategy(), 3..30), target_amount in amount_strategy()) {
        let population: Vec<Transaction> = amounts.iter().enumerate().map(|(i, a)| transaction(i, *a)).collect();
        let target = transaction(amounts.len(), target_amount);

        let analysis = OutlierDetector::default().analyze(&target, Baseline::Customer6Month, &population);
        if let Some(z) = analysis.z_score {
            let mean = analysis.statistics.mean;
            if target_amount > mean {
                prop_assert!(z > 0.0);
            } else if target_amount < mean {
                prop_assert!(z < 0.0);
            }
            prop_assert_eq!(analysis.is_outlier, z.abs() > 3.0);
        }
    }

    /// Property: composite score stays in [0,1] with valid weights
    #[test]
    fn prop_composite_in_unit_interval(values in factor_strategy()) {
        let scorer = scorer();
        let score = scorer.composite(&values.weighted(&RiskWeights::default())).unwrap();
        prop_assert!((0.0..=1.0).contains(&score));
    }

    /// Property: weights that do not sum to 1.0 are rejected
    #[test]
    fn prop_invalid_weights_rejected(weights in prop::collection::vec(0.0f64..1.0, 6)) {
        let sum: f64 = weights.iter().sum();
        prop_assume!((sum - 1.0).abs() > 1e-3);

        let weights = RiskWeights {
            country: weights[0],
            business_type: weights[1],
            transaction_pattern: weights[2],
            adverse_media: weights[3],
            pep: weights[4],
            network: weights[5],
        };
        let result = RiskScorer::new(weights, RiskThresholds::default());
        prop_assert!(matches!(result, Err(Error::InvalidWeights(_))));
    }

    /// Property: a PEP is never below MEDIUM, a sanctions hit is always HIGH
    #[test]
    fn prop_overrides_set_floors(values in factor_strategy(), sanctioned in any::<bool>()) {
        let indicators = RiskIndicators { is_pep: true, sanctioned };
        let assessment = scorer().assess("CUS001", &values, &indicators).unwrap();

        prop_assert!(assessment.risk_level >= RiskLevel::Medium);
        if sanctioned {
            prop_assert_eq!(assessment.risk_level, RiskLevel::High);
        }
        prop_assert!((0.0..=1.0).contains(&assessment.risk_score));
    }

    /// Property: traversal of any ownership graph terminates with each
    /// subsidiary listed once and well-formed cycle markers
    #[test]
    fn prop_ownership_traversal_terminates(
        edges in prop::collection::vec((0usize..6, 0usize..6, 1u32..=100), 0..30),
        depth in 1usize..8,
    ) {
        let relations: Vec<SubsidiaryRelation> = edges
            .iter()
            .map(|(parent, child, pct)| SubsidiaryRelation {
                parent_id: format!("E{}", parent),
                subsidiary_id: format!("E{}", child),
                name: format!("Entity {}", child),
                country: "US".to_string(),
                ownership_percentage: Decimal::from(*pct),
            })
            .collect();

        let tree = OwnershipGraph::from_edges(relations).subsidiary_tree("E0", depth);

        let ids: HashSet<&str> = tree.nodes.iter().map(|n| n.subsidiary_id.as_str()).collect();
        prop_assert_eq!(ids.len(), tree.nodes.len());
        prop_assert!(tree.nodes.len() <= 5);
        prop_assert!(!ids.contains("E0"));
        for node in &tree.nodes {
            prop_assert!(node.depth >= 1 && node.depth <= depth);
            prop_assert!(node.effective_ownership <= Decimal::ONE);
        }
        for cycle in &tree.cycles {
            prop_assert!(cycle.path.len() >= 2);
            prop_assert_eq!(cycle.path.first(), cycle.path.last());
        }
    }
}
