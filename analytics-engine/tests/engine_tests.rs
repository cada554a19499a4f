//! End-to-end engine behaviour over an in-memory dataset

use analytics_engine::engine::CounterpartyRiskFilter;
use analytics_engine::scoring::OverrideRule;
use analytics_engine::store::{Dataset, EntityRef, TransactionFilter};
use analytics_engine::{
    AnalyticsEngine, Baseline, Channel, Config, Counterparty, Customer, DataAccess, Error, InMemoryStore,
    Result, RiskLevel, StaticRiskReference, SubsidiaryRelation, TimeRange, Transaction, TransactionStatus,
    TransactionType, Window,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type Engine = AnalyticsEngine<InMemoryStore, StaticRiskReference>;

fn at(month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, month, day, 10, 0, 0).unwrap()
}

fn customer(id: &str) -> Customer {
    Customer {
        customer_id: id.to_string(),
        name: "Northwind Imports".to_string(),
        risk_rating: RiskLevel::Low,
        country: "US".to_string(),
        business_type: Some("Retail".to_string()),
        created_at: Utc.with_ymd_and_hms(2019, 5, 1, 0, 0, 0).unwrap(),
        accounts: vec!["ACC-1".to_string()],
    }
}

fn counterparty(id: &str, country: &str, business_type: &str, pep_position: Option<&str>) -> Counterparty {
    Counterparty {
        counterparty_id: id.to_string(),
        name: format!("Counterparty {}", id),
        country: country.to_string(),
        business_type: Some(business_type.to_string()),
        pep_position: pep_position.map(str::to_string),
        transaction_ids: Vec::new(),
    }
}

fn tx(id: &str, amount: Decimal, timestamp: DateTime<Utc>, counterparty: Option<&str>) -> Transaction {
    Transaction {
        transaction_id: id.to_string(),
        customer_id: "CUS001".to_string(),
        account_id: Some("ACC-1".to_string()),
        transaction_type: TransactionType::WireTransfer,
        amount,
        currency: "USD".to_string(),
        timestamp,
        status: TransactionStatus::Completed,
        channel: Channel::Wire,
        counterparty_id: counterparty.map(str::to_string),
        fee: dec!(15),
    }
}

fn edge(parent: &str, child: &str, pct: Decimal) -> SubsidiaryRelation {
    SubsidiaryRelation {
        parent_id: parent.to_string(),
        subsidiary_id: child.to_string(),
        name: format!("{} Holdings", child),
        country: "US".to_string(),
        ownership_percentage: pct,
    }
}

fn engine_with(dataset: Dataset, reference: StaticRiskReference, config: Config) -> Engine {
    AnalyticsEngine::new(
        Arc::new(InMemoryStore::from_dataset(dataset)),
        Arc::new(reference),
        config,
    )
    .unwrap()
}

fn engine(dataset: Dataset) -> Engine {
    engine_with(dataset, StaticRiskReference::new(), Config::default())
}

fn june() -> Window {
    Window::range(at(6, 1), at(6, 30)).unwrap()
}

#[tokio::test]
async fn test_large_transfer_is_an_outlier() {
    let engine = engine(Dataset {
        customers: vec![customer("CUS001")],
        transactions: vec![
            tx("T1", dec!(100), at(3, 1), None),
            tx("T2", dec!(200), at(4, 1), None),
            tx("T3", dec!(10000), at(5, 1), None),
        ],
        ..Dataset::default()
    });

    let analysis = engine
        .outlier_analysis("T3", Baseline::Customer6Month)
        .await
        .unwrap();

    assert_eq!(analysis.similar_transactions_count, 2);
    assert_eq!(analysis.statistics.mean, dec!(150));
    assert_eq!(analysis.statistics.std_dev.round_dp(2), dec!(70.71));
    let z = analysis.z_score.unwrap();
    assert!((z - 139.3).abs() < 0.1, "z = {}", z);
    assert!(analysis.is_outlier);
    assert_eq!(analysis.percentile, Some(100.0));
    assert_eq!(engine.metrics().outliers_total.get(), 1);
}

#[tokio::test]
async fn test_single_prior_transaction_has_no_z_score() {
    let engine = engine(Dataset {
        transactions: vec![
            tx("T1", dec!(100), at(3, 1), None),
            tx("T2", dec!(9000), at(4, 1), None),
        ],
        ..Dataset::default()
    });

    let analysis = engine
        .outlier_analysis("T2", Baseline::Customer6Month)
        .await
        .unwrap();
    assert_eq!(analysis.z_score, None);
    assert!(!analysis.is_outlier);
    assert!(analysis.insufficient_data);
}

#[tokio::test]
async fn test_empty_window_reports_zeros() {
    let engine = engine(Dataset {
        customers: vec![customer("CUS001")],
        ..Dataset::default()
    });

    let stats = engine
        .transaction_statistics("CUS001", &Window::months(6).unwrap())
        .await
        .unwrap();
    assert_eq!(stats.count, 0);
    assert_eq!(stats.total_amount, Decimal::ZERO);
    assert_eq!(stats.mean, Decimal::ZERO);
    assert_eq!(stats.std_dev, Decimal::ZERO);
    assert_eq!(stats.velocity_per_day, 0.0);
    assert_eq!(stats.growth_rate.count_change_pct, None);
}

#[tokio::test]
async fn test_weekly_transfers_are_recurring() {
    let engine = engine(Dataset {
        transactions: vec![
            tx("T1", dec!(1200), at(6, 3), Some("CPT-LANDLORD")),
            tx("T2", dec!(1210), at(6, 10), Some("CPT-LANDLORD")),
            tx("T3", dec!(1195), at(6, 17), Some("CPT-LANDLORD")),
            tx("T4", dec!(1205), at(6, 24), Some("CPT-LANDLORD")),
        ],
        ..Dataset::default()
    });

    let report = engine.transaction_patterns("CUS001", &june()).await.unwrap();
    assert_eq!(report.recurring_patterns.weekly_transfers, 1);
    assert_eq!(report.recurring_patterns.monthly_payments, 0);
    assert_eq!(report.status_distribution.get("COMPLETED"), Some(&4));
    assert_eq!(report.avg_days_between_transactions, Some(7.0));
}

#[tokio::test]
async fn test_growth_needs_two_periods() {
    let engine = engine(Dataset::default());
    let window = Window::range(at(6, 1), at(6, 20)).unwrap();

    let err = engine
        .growth_by_period("CUS001", &window, 15)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InsufficientData(_)));
}

#[tokio::test]
async fn test_ownership_loop_is_reported() {
    let dataset = Dataset {
        customers: vec![customer("CUS001")],
        subsidiaries: vec![
            edge("CUS001", "SUB-A", dec!(80)),
            edge("SUB-A", "SUB-B", dec!(50)),
            edge("SUB-B", "SUB-A", dec!(10)),
        ],
        ..Dataset::default()
    };

    let tree = engine(dataset.clone())
        .subsidiaries("CUS001", None)
        .await
        .unwrap();
    assert_eq!(tree.nodes.len(), 2);
    assert_eq!(tree.cycles.len(), 1);
    assert_eq!(tree.cycles[0].path, vec!["SUB-A", "SUB-B", "SUB-A"]);
    assert_eq!(tree.nodes[1].effective_ownership, dec!(0.4));

    let mut config = Config::default();
    config.graph.fail_on_cycle = true;
    let strict = engine_with(dataset, StaticRiskReference::new(), config);
    let err = strict.subsidiaries("CUS001", None).await.unwrap_err();
    assert!(matches!(err, Error::CycleDetected { ref path } if path.len() == 3));
    assert_eq!(strict.metrics().cycles_detected.get(), 1);
}

#[tokio::test]
async fn test_subsidiary_depth_is_capped() {
    let engine = engine(Dataset {
        subsidiaries: vec![
            edge("CUS001", "L1", dec!(100)),
            edge("L1", "L2", dec!(100)),
            edge("L2", "L3", dec!(100)),
        ],
        ..Dataset::default()
    });

    let tree = engine.subsidiaries("CUS001", Some(2)).await.unwrap();
    assert_eq!(tree.nodes.len(), 2);
    assert!(tree.depth_limited);

    let full = engine.subsidiaries("CUS001", Some(50)).await.unwrap();
    assert_eq!(full.nodes.len(), 3);
    assert!(!full.depth_limited);
}

#[tokio::test]
async fn test_pep_customer_is_at_least_medium() {
    let as_of = at(7, 1);
    let reference = StaticRiskReference::new().with_pep("CUS001", "Minister of Trade");
    let engine = engine_with(
        Dataset {
            customers: vec![customer("CUS001")],
            transactions: vec![
                tx("T1", dec!(1000), at(2, 12), None),
                tx("T2", dec!(1050), at(3, 12), None),
                tx("T3", dec!(1100), at(4, 12), None),
                tx("T4", dec!(1020), at(5, 12), None),
            ],
            ..Dataset::default()
        },
        reference,
        Config::default(),
    );

    let profile = engine
        .customer_risk_profile_as_of("CUS001", as_of)
        .await
        .unwrap();

    assert!(profile.screening.is_pep);
    assert_eq!(profile.window.end, as_of);
    assert_eq!(profile.statistics.count, 4);
    assert!(profile.assessment.risk_level >= RiskLevel::Medium);
    assert!(profile
        .assessment
        .overrides
        .iter()
        .any(|o| o.rule == OverrideRule::PepFloor && o.to == RiskLevel::Medium));
    assert!(profile.scenario_hits.is_empty());
    assert!(profile.outliers.iter().all(|o| !o.is_outlier));
}

#[tokio::test]
async fn test_sanctioned_customer_is_high() {
    let reference = StaticRiskReference::new().with_sanctioned("CUS001");
    let engine = engine_with(
        Dataset {
            customers: vec![customer("CUS001")],
            ..Dataset::default()
        },
        reference,
        Config::default(),
    );

    let profile = engine
        .customer_risk_profile_as_of("CUS001", at(7, 1))
        .await
        .unwrap();
    assert_eq!(profile.assessment.risk_level, RiskLevel::High);
    assert!((0.0..=1.0).contains(&profile.assessment.risk_score));
}

#[tokio::test]
async fn test_unknown_customer_profile_is_not_found() {
    let engine = engine(Dataset::default());
    let err = engine
        .customer_risk_profile_as_of("NOPE", at(7, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_counterparty_risk_filter() {
    let engine = engine(Dataset {
        customers: vec![customer("CUS001")],
        counterparties: vec![
            counterparty("CPT-SAFE", "US", "Technology", None),
            counterparty("CPT-PEP", "RU", "Money Services", Some("Deputy Governor")),
        ],
        transactions: vec![
            tx("T1", dec!(2500), at(6, 4), Some("CPT-SAFE")),
            tx("T2", dec!(4000), at(6, 11), Some("CPT-PEP")),
            tx("T3", dec!(750), at(6, 18), Some("CPT-UNKNOWN")),
        ],
        ..Dataset::default()
    });

    let all = engine
        .counterparties_risk_assessment("CUS001", &june(), &CounterpartyRiskFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let safe = all
        .iter()
        .find(|r| r.counterparty.counterparty_id == "CPT-SAFE")
        .unwrap();
    assert_eq!(safe.assessment.risk_level, RiskLevel::Low);

    let filter = CounterpartyRiskFilter {
        min_level: Some(RiskLevel::Medium),
        pep_only: false,
    };
    let elevated = engine
        .counterparties_risk_assessment("CUS001", &june(), &filter)
        .await
        .unwrap();
    assert_eq!(elevated.len(), 1);
    assert_eq!(elevated[0].counterparty.counterparty_id, "CPT-PEP");
    assert!(elevated[0].screening.is_pep);

    let peps = engine
        .pep_counterparties("CUS001", &june())
        .await
        .unwrap();
    assert_eq!(peps.len(), 1);
    assert_eq!(peps[0].pep_position.as_deref(), Some("Deputy Governor"));
}

#[tokio::test]
async fn test_structuring_scenario_fires() {
    let start = at(6, 3);
    let engine = engine(Dataset {
        transactions: (0..4)
            .map(|i| {
                let mut t = tx(&format!("S{}", i), dec!(9500), start + Duration::days(i), None);
                t.transaction_type = TransactionType::CashDeposit;
                t.channel = Channel::Cash;
                t
            })
            .collect(),
        ..Dataset::default()
    });

    let hits = engine.alert_scenarios("CUS001", &june()).await.unwrap();
    let structuring: Vec<_> = hits
        .iter()
        .filter(|h| h.scenario.as_str() == "STRUCTURING")
        .collect();
    assert_eq!(structuring.len(), 1);
    assert_eq!(structuring[0].transaction_ids.len(), 4);
    assert_eq!(structuring[0].total_amount, dec!(38000));
}

/// Store whose transaction queries are down; point lookups still work
struct UnavailableStore {
    inner: InMemoryStore,
    queries: AtomicUsize,
}

#[async_trait]
impl DataAccess for UnavailableStore {
    async fn fetch_transactions(
        &self,
        _entity: &EntityRef,
        _range: &TimeRange,
        _filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Err(Error::UpstreamUnavailable("transaction store timed out".to_string()))
    }

    async fn fetch_transaction(&self, transaction_id: &str) -> Result<Transaction> {
        self.inner.fetch_transaction(transaction_id).await
    }

    async fn fetch_customer(&self, customer_id: &str) -> Result<Customer> {
        self.inner.fetch_customer(customer_id).await
    }

    async fn fetch_counterparty(&self, counterparty_id: &str) -> Result<Counterparty> {
        self.inner.fetch_counterparty(counterparty_id).await
    }

    async fn fetch_subsidiaries(&self, customer_id: &str) -> Result<Vec<SubsidiaryRelation>> {
        self.inner.fetch_subsidiaries(customer_id).await
    }
}

#[tokio::test]
async fn test_upstream_failure_surfaces_without_retry() {
    let store = Arc::new(UnavailableStore {
        inner: InMemoryStore::from_dataset(Dataset {
            customers: vec![customer("CUS001")],
            transactions: vec![tx("T1", dec!(5000), at(5, 1), None)],
            ..Dataset::default()
        }),
        queries: AtomicUsize::new(0),
    });
    let engine = AnalyticsEngine::new(store.clone(), Arc::new(StaticRiskReference::new()), Config::default()).unwrap();

    let err = engine
        .outlier_analysis("T1", Baseline::Customer6Month)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UpstreamUnavailable(_)));
    assert_eq!(store.queries.load(Ordering::SeqCst), 1);
    assert_eq!(
        engine
            .metrics()
            .failures_total
            .with_label_values(&["outlier_analysis", "upstream_unavailable"])
            .get(),
        1
    );

    let err = engine
        .customer_risk_profile_as_of("CUS001", at(7, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UpstreamUnavailable(_)));
    assert_eq!(store.queries.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_same_day_transfers_baseline() {
    let day = |hour: u32| Utc.with_ymd_and_hms(2024, 5, 14, hour, 0, 0).unwrap();
    let transfer = |id: &str, customer: &str, amount: Decimal, timestamp: DateTime<Utc>| {
        let mut t = tx(id, amount, timestamp, None);
        t.customer_id = customer.to_string();
        t
    };
    let mut cash = transfer("C1", "CUS002", dec!(500000), day(11));
    cash.transaction_type = TransactionType::CashDeposit;
    cash.channel = Channel::Cash;
    let mut ach = transfer("A1", "CUS003", dec!(1050), day(15));
    ach.transaction_type = TransactionType::AchCredit;
    ach.channel = Channel::Ach;

    let engine = engine(Dataset {
        transactions: vec![
            transfer("TARGET", "CUS001", dec!(50000), day(16)),
            transfer("W1", "CUS002", dec!(1000), day(9)),
            transfer("W2", "CUS003", dec!(1100), day(10)),
            transfer("W3", "CUS004", dec!(900), day(12)),
            ach,
            // Not a transfer
            cash,
            // Previous day
            transfer("W0", "CUS002", dec!(999999), Utc.with_ymd_and_hms(2024, 5, 13, 23, 0, 0).unwrap()),
        ],
        ..Dataset::default()
    });

    let analysis = engine
        .outlier_analysis("TARGET", Baseline::SameDayTransfers)
        .await
        .unwrap();
    assert_eq!(analysis.similar_transactions_count, 4);
    assert_eq!(analysis.statistics.mean, dec!(1012.5));
    assert!(analysis.is_outlier);
    assert!(analysis
        .factors
        .iter()
        .any(|f| f == "Unusual amount among same-day transfers"));
}
