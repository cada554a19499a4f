//! Analytics engine façade
//!
//! Wires the data-access and risk-reference collaborators to the stateless
//! components. Every public operation resolves its window against the current
//! instant, fetches only what it needs (independent fetches run concurrently)
//! and records request, failure and latency metrics. Nothing is retried; a
//! collaborator failure surfaces unchanged.

use crate::aggregator::{PeriodGrowth, TransactionMetrics, WindowStatistics, WindowedAggregator};
use crate::analysis::{self, HighRiskCounterparties, HighRiskMetrics, TransactionAnalysis};
use crate::config::Config;
use crate::graph::{self, CounterpartySummary, CycleMarker, NetworkRisk, OwnershipGraph, RelatedCustomer, SubsidiaryTree};
use crate::metrics::Metrics;
use crate::outlier::{Baseline, OutlierAnalysis, OutlierDetector};
use crate::patterns::{PatternRecognizer, PatternReport};
use crate::reference::{level_score, CountryRisk, RiskReference, ScreeningResult, ScreeningSubject};
use crate::scenarios::{ScenarioDetector, ScenarioHit};
use crate::scoring::{self, FactorValues, RiskAssessment, RiskIndicators, RiskScorer};
use crate::store::{DataAccess, EntityRef, TransactionFilter};
use crate::window::{TimeRange, Window};
use crate::{Counterparty, Error, Result, RiskLevel, SubsidiaryRelation, Transaction};
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Narrowing applied to counterparty risk assessments
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterpartyRiskFilter {
    /// Keep assessments at or above this level
    #[serde(default)]
    pub min_level: Option<RiskLevel>,

    /// Keep politically exposed counterparties only
    #[serde(default)]
    pub pep_only: bool,
}

impl CounterpartyRiskFilter {
    /// Does the assessment pass the filter
    pub fn matches(&self, risk: &CounterpartyRisk) -> bool {
        let level_ok = self
            .min_level
            .map_or(true, |min| risk.assessment.risk_level >= min);
        let pep_ok = !self.pep_only || risk.screening.is_pep;
        level_ok && pep_ok
    }
}

/// Risk assessment of one counterparty
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterpartyRisk {
    /// Relationship with the customer
    pub counterparty: CounterpartySummary,
    /// Jurisdiction risk
    pub country_risk: CountryRisk,
    /// Screening outcome
    pub screening: ScreeningResult,
    /// Weighted assessment
    pub assessment: RiskAssessment,
}

/// Full customer risk profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRiskProfile {
    /// Customer ID
    pub customer_id: String,
    /// Customer name
    pub name: String,
    /// Rating currently on file
    pub current_risk_rating: RiskLevel,
    /// Analysed range
    pub window: TimeRange,
    /// Composite assessment
    pub assessment: RiskAssessment,
    /// Window statistics
    pub statistics: WindowStatistics,
    /// Behavioural patterns
    pub patterns: PatternReport,
    /// Outlier analyses of the largest transactions
    pub outliers: Vec<OutlierAnalysis>,
    /// Scenario hits
    pub scenario_hits: Vec<ScenarioHit>,
    /// Customer jurisdiction risk
    pub country_risk: CountryRisk,
    /// Customer screening outcome
    pub screening: ScreeningResult,
    /// Risk carried in from subsidiaries
    pub network: NetworkRisk,
    /// Value-weighted counterparty risk
    pub counterparty_exposure: f64,
    /// Ownership loops found below the customer
    pub ownership_cycles: Vec<CycleMarker>,
}

/// Counterparty risk inputs gathered once per request
struct CounterpartyRatings {
    high_risk: HighRiskCounterparties,
    scores: HashMap<String, f64>,
}

/// Analytics engine
pub struct AnalyticsEngine<S, R> {
    store: Arc<S>,
    reference: Arc<R>,
    config: Config,
    metrics: Metrics,
    aggregator: WindowedAggregator,
    outliers: OutlierDetector,
    patterns: PatternRecognizer,
    scenarios: ScenarioDetector,
    scorer: RiskScorer,
    counterparty_scorer: RiskScorer,
}

impl<S, R> AnalyticsEngine<S, R>
where
    S: DataAccess,
    R: RiskReference,
{
    /// Create new engine, rejecting an invalid configuration
    pub fn new(store: Arc<S>, reference: Arc<R>, config: Config) -> Result<Self> {
        config.validate()?;

        let metrics = Metrics::new()
            .map_err(|e| Error::InvalidConfig(format!("Failed to create metrics: {}", e)))?;
        let scorer = RiskScorer::new(config.risk.weights.clone(), config.risk.thresholds.clone())?;
        let counterparty_scorer = RiskScorer::new(
            config.risk.counterparty_weights.clone(),
            config.risk.thresholds.clone(),
        )?;

        info!(
            service = %config.service_name,
            version = %config.service_version,
            z_threshold = config.outlier.z_threshold,
            "Analytics engine ready"
        );

        Ok(Self {
            store,
            reference,
            aggregator: WindowedAggregator::new(),
            outliers: OutlierDetector::new(config.outlier.z_threshold),
            patterns: PatternRecognizer::new(config.patterns.clone()),
            scenarios: ScenarioDetector::new(config.scenarios.clone())?,
            scorer,
            counterparty_scorer,
            metrics,
            config,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Engine metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Window statistics for a customer
    #[instrument(skip(self))]
    pub async fn transaction_statistics(&self, customer_id: &str, window: &Window) -> Result<WindowStatistics> {
        self.observe("transaction_statistics", async {
            let range = window.resolve(Utc::now())?;
            let transactions = self.customer_transactions(customer_id, &range).await?;
            Ok(self.aggregator.summarize(&transactions, &range))
        })
        .await
    }

    /// Debit / credit metrics for a customer
    #[instrument(skip(self))]
    pub async fn transaction_metrics(&self, customer_id: &str, window: &Window) -> Result<TransactionMetrics> {
        self.observe("transaction_metrics", async {
            let range = window.resolve(Utc::now())?;
            let transactions = self.customer_transactions(customer_id, &range).await?;
            Ok(self.aggregator.transaction_metrics(&transactions, &range))
        })
        .await
    }

    /// Period-over-period growth series for a customer
    #[instrument(skip(self))]
    pub async fn growth_by_period(
        &self,
        customer_id: &str,
        window: &Window,
        period_days: u32,
    ) -> Result<Vec<PeriodGrowth>> {
        self.observe("growth_by_period", async {
            let range = window.resolve(Utc::now())?;
            let transactions = self.customer_transactions(customer_id, &range).await?;
            self.aggregator
                .growth_by_period(&transactions, &range, period_days)
        })
        .await
    }

    /// Outlier analysis of one transaction against a baseline
    #[instrument(skip(self))]
    pub async fn outlier_analysis(&self, transaction_id: &str, baseline: Baseline) -> Result<OutlierAnalysis> {
        self.observe("outlier_analysis", async {
            let target = self.store.fetch_transaction(transaction_id).await?;
            let analysis = self.analyze_outlier(&target, baseline).await?;
            if analysis.is_outlier {
                self.metrics.record_outliers(1);
            }
            Ok(analysis)
        })
        .await
    }

    /// Channel, status, timing and recurrence patterns for a customer
    #[instrument(skip(self))]
    pub async fn transaction_patterns(&self, customer_id: &str, window: &Window) -> Result<PatternReport> {
        self.observe("transaction_patterns", async {
            let range = window.resolve(Utc::now())?;
            let transactions = self.customer_transactions(customer_id, &range).await?;
            Ok(self.patterns.analyze(&transactions))
        })
        .await
    }

    /// Geography, fee, failure and largest-transaction analysis
    #[instrument(skip(self))]
    pub async fn transaction_analysis(&self, customer_id: &str, window: &Window) -> Result<TransactionAnalysis> {
        self.observe("transaction_analysis", async {
            let range = window.resolve(Utc::now())?;
            let (customer, transactions) = tokio::try_join!(
                self.store.fetch_customer(customer_id),
                self.customer_transactions(customer_id, &range),
            )?;
            let records = self.counterparty_records(&transactions).await?;
            let countries: HashMap<String, String> = records
                .iter()
                .map(|(id, record)| (id.clone(), record.country.clone()))
                .collect();

            Ok(analysis::transaction_analysis(
                &transactions,
                &customer.country,
                &countries,
                self.config.engine.highest_transactions,
            ))
        })
        .await
    }

    /// Activity with high-risk jurisdictions and institutions
    #[instrument(skip(self))]
    pub async fn high_risk_metrics(&self, customer_id: &str, window: &Window) -> Result<HighRiskMetrics> {
        self.observe("high_risk_metrics", async {
            let range = window.resolve(Utc::now())?;
            let transactions = self.customer_transactions(customer_id, &range).await?;
            let records = self.counterparty_records(&transactions).await?;
            let ratings = self.rate_counterparties(&records).await?;
            Ok(analysis::high_risk_metrics(&transactions, &ratings.high_risk))
        })
        .await
    }

    /// Alert scenario hits for a customer
    #[instrument(skip(self))]
    pub async fn alert_scenarios(&self, customer_id: &str, window: &Window) -> Result<Vec<ScenarioHit>> {
        self.observe("alert_scenarios", async {
            let range = window.resolve(Utc::now())?;
            let transactions = self.customer_transactions(customer_id, &range).await?;
            let records = self.counterparty_records(&transactions).await?;
            let ratings = self.rate_counterparties(&records).await?;
            Ok(self
                .scenarios
                .detect(&transactions, &ratings.high_risk.geography))
        })
        .await
    }

    /// Counterparties of a customer
    #[instrument(skip(self))]
    pub async fn counterparties(&self, customer_id: &str, window: &Window) -> Result<Vec<CounterpartySummary>> {
        self.observe("counterparties", async {
            let range = window.resolve(Utc::now())?;
            let transactions = self.customer_transactions(customer_id, &range).await?;
            let records = self.counterparty_records(&transactions).await?;
            Ok(graph::counterparties_of_customer(&transactions, &records))
        })
        .await
    }

    /// Politically exposed counterparties of a customer
    #[instrument(skip(self))]
    pub async fn pep_counterparties(&self, customer_id: &str, window: &Window) -> Result<Vec<CounterpartySummary>> {
        self.observe("pep_counterparties", async {
            let range = window.resolve(Utc::now())?;
            let transactions = self.customer_transactions(customer_id, &range).await?;
            let records = self.counterparty_records(&transactions).await?;
            Ok(graph::counterparties_of_customer(&transactions, &records)
                .into_iter()
                .filter(|summary| summary.is_pep)
                .collect())
        })
        .await
    }

    /// Customers that transacted with a counterparty
    #[instrument(skip(self))]
    pub async fn related_customers(&self, counterparty_id: &str, window: &Window) -> Result<Vec<RelatedCustomer>> {
        self.observe("related_customers", async {
            let range = window.resolve(Utc::now())?;
            let transactions = self
                .store
                .fetch_transactions(
                    &EntityRef::Counterparty(counterparty_id.to_string()),
                    &range,
                    &TransactionFilter::all(),
                )
                .await?;
            Ok(graph::related_customers(counterparty_id, &transactions))
        })
        .await
    }

    /// Subsidiary tree of a customer.
    ///
    /// `depth` defaults to the configured default and is capped at the
    /// configured maximum.
    #[instrument(skip(self))]
    pub async fn subsidiaries(&self, customer_id: &str, depth: Option<usize>) -> Result<SubsidiaryTree> {
        self.observe("subsidiaries", async {
            let depth = depth
                .unwrap_or(self.config.graph.default_depth)
                .min(self.config.graph.max_depth);
            let ownership = self.ownership_graph(customer_id, depth).await?;
            let tree = ownership.subsidiary_tree(customer_id, depth);
            self.metrics.record_cycles(tree.cycles.len());
            tree.check_cycles(self.config.graph.fail_on_cycle)
        })
        .await
    }

    /// Jurisdiction risk lookup
    #[instrument(skip(self))]
    pub async fn country_risk(&self, country_code: &str) -> Result<CountryRisk> {
        self.observe("country_risk", self.reference.country_risk(country_code))
            .await
    }

    /// Risk assessment of every counterparty of a customer
    #[instrument(skip(self))]
    pub async fn counterparties_risk_assessment(
        &self,
        customer_id: &str,
        window: &Window,
        filter: &CounterpartyRiskFilter,
    ) -> Result<Vec<CounterpartyRisk>> {
        self.observe("counterparties_risk_assessment", async {
            let range = window.resolve(Utc::now())?;
            let transactions = self.customer_transactions(customer_id, &range).await?;
            let records = self.counterparty_records(&transactions).await?;
            let ratings = self.rate_counterparties(&records).await?;
            let hits = self
                .scenarios
                .detect(&transactions, &ratings.high_risk.geography);

            let summaries = graph::counterparties_of_customer(&transactions, &records);
            let assessed = try_join_all(summaries.into_iter().filter_map(|summary| {
                let record = records.get(&summary.counterparty_id)?;
                Some(self.assess_counterparty(summary, record, &transactions, &hits))
            }))
            .await?;

            Ok(assessed
                .into_iter()
                .filter(|risk| filter.matches(risk))
                .collect())
        })
        .await
    }

    /// Full risk profile over the configured lookback ending now
    pub async fn customer_risk_profile(&self, customer_id: &str) -> Result<CustomerRiskProfile> {
        self.customer_risk_profile_as_of(customer_id, Utc::now())
            .await
    }

    /// Full risk profile over the configured lookback ending at `as_of`
    #[instrument(skip(self))]
    pub async fn customer_risk_profile_as_of(
        &self,
        customer_id: &str,
        as_of: DateTime<Utc>,
    ) -> Result<CustomerRiskProfile> {
        self.observe("customer_risk_profile", async {
            let customer = self.store.fetch_customer(customer_id).await?;
            let range = Window::months(self.config.engine.profile_lookback_months)?.resolve(as_of)?;
            let subject = ScreeningSubject::from(&customer);
            let depth = self.config.graph.default_depth;

            let (transactions, country_risk, business_risk, screening, ownership) = tokio::try_join!(
                self.customer_transactions(customer_id, &range),
                self.reference.country_risk(&customer.country),
                self.reference
                    .business_type_risk(customer.business_type.as_deref()),
                self.reference.screen(&subject),
                self.ownership_graph(customer_id, depth),
            )?;

            let tree = ownership.subsidiary_tree(customer_id, depth);
            self.metrics.record_cycles(tree.cycles.len());
            let tree = tree.check_cycles(self.config.graph.fail_on_cycle)?;

            let records = self.counterparty_records(&transactions).await?;
            let (ratings, subsidiary_scores, outliers) = tokio::try_join!(
                self.rate_counterparties(&records),
                self.subsidiary_scores(&tree),
                self.outlier_candidates(&transactions),
            )?;

            let statistics = self.aggregator.summarize(&transactions, &range);
            let patterns = self.patterns.analyze(&transactions);
            let scenario_hits = self
                .scenarios
                .detect(&transactions, &ratings.high_risk.geography);
            let counterparties = graph::counterparties_of_customer(&transactions, &records);
            let network = graph::propagate_risk(
                &tree,
                &subsidiary_scores,
                self.config.graph.propagation_decay,
            );
            let exposure = graph::counterparty_exposure(&counterparties, &ratings.scores);

            let values = FactorValues {
                country: country_risk.score,
                business_type: business_risk,
                transaction_pattern: scoring::transaction_pattern_risk(
                    &outliers,
                    &patterns,
                    &scenario_hits,
                    &statistics,
                ),
                adverse_media: screening.adverse_media_score,
                pep: if screening.is_pep { 1.0 } else { 0.0 },
                network: network.network_risk.max(exposure),
            };
            let indicators = RiskIndicators {
                is_pep: screening.is_pep,
                sanctioned: screening.sanctioned,
            };
            let assessment = self.scorer.assess(customer_id, &values, &indicators)?;

            info!(
                customer_id,
                risk_score = assessment.risk_score,
                risk_level = %assessment.risk_level,
                transactions = transactions.len(),
                scenario_hits = scenario_hits.len(),
                "Customer risk profile built"
            );

            Ok(CustomerRiskProfile {
                customer_id: customer.customer_id,
                name: customer.name,
                current_risk_rating: customer.risk_rating,
                window: range,
                assessment,
                statistics,
                patterns,
                outliers,
                scenario_hits,
                country_risk,
                screening,
                network,
                counterparty_exposure: exposure,
                ownership_cycles: tree.cycles,
            })
        })
        .await
    }

    async fn observe<T, F>(&self, operation: &'static str, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.metrics.record_request(operation);
        let started = Instant::now();
        let result = work.await;
        self.metrics
            .record_duration(operation, started.elapsed().as_secs_f64());
        if let Err(e) = &result {
            self.metrics.record_failure(operation, e.kind());
            warn!(operation, error = %e, "Analytics operation failed");
        }
        result
    }

    async fn customer_transactions(&self, customer_id: &str, range: &TimeRange) -> Result<Vec<Transaction>> {
        self.store
            .fetch_transactions(
                &EntityRef::Customer(customer_id.to_string()),
                range,
                &TransactionFilter::all(),
            )
            .await
    }

    async fn analyze_outlier(&self, target: &Transaction, baseline: Baseline) -> Result<OutlierAnalysis> {
        let query = baseline.population_query(target)?;
        let population = self
            .store
            .fetch_transactions(&query.entity, &query.range, &query.filter)
            .await?;
        Ok(self.outliers.analyze(target, baseline, &population))
    }

    /// Six-month outlier analysis of the largest transactions
    async fn outlier_candidates(&self, transactions: &[Transaction]) -> Result<Vec<OutlierAnalysis>> {
        let mut candidates: Vec<&Transaction> = transactions.iter().collect();
        candidates.sort_by(|a, b| b.amount.cmp(&a.amount));
        candidates.truncate(self.config.engine.max_outlier_candidates);

        let analyses = try_join_all(
            candidates
                .into_iter()
                .map(|tx| self.analyze_outlier(tx, Baseline::Customer6Month)),
        )
        .await?;

        let flagged = analyses.iter().filter(|a| a.is_outlier).count();
        self.metrics.record_outliers(flagged);
        Ok(analyses)
    }

    /// Counterparty records referenced by the transactions; unknown IDs are skipped
    async fn counterparty_records(&self, transactions: &[Transaction]) -> Result<HashMap<String, Counterparty>> {
        let ids: BTreeSet<&str> = transactions
            .iter()
            .filter_map(|tx| tx.counterparty_id.as_deref())
            .collect();

        let fetched = try_join_all(ids.into_iter().map(|id| async move {
            match self.store.fetch_counterparty(id).await {
                Ok(record) => Ok(Some(record)),
                Err(Error::NotFound(_)) => {
                    warn!(counterparty_id = id, "Counterparty record missing");
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        }))
        .await?;

        Ok(fetched
            .into_iter()
            .flatten()
            .map(|record| (record.counterparty_id.clone(), record))
            .collect())
    }

    async fn rate_counterparties(&self, records: &HashMap<String, Counterparty>) -> Result<CounterpartyRatings> {
        let rated = try_join_all(records.values().map(|record| async move {
            let (country, business) = tokio::try_join!(
                self.reference.country_risk(&record.country),
                self.reference
                    .business_type_risk(record.business_type.as_deref()),
            )?;
            Ok::<_, Error>((record.counterparty_id.clone(), country, business))
        }))
        .await?;

        let mut ratings = CounterpartyRatings {
            high_risk: HighRiskCounterparties::default(),
            scores: HashMap::new(),
        };
        for (id, country, business) in rated {
            if country.risk_rating == RiskLevel::High {
                ratings.high_risk.geography.insert(id.clone());
            }
            if business >= level_score(RiskLevel::High) {
                ratings.high_risk.institutions.insert(id.clone());
            }
            ratings.scores.insert(id, country.score.max(business));
        }
        Ok(ratings)
    }

    /// Ownership edges reachable from `root`, one level past `depth` so the
    /// traversal can report that it was cut short.
    async fn ownership_graph(&self, root: &str, depth: usize) -> Result<OwnershipGraph> {
        let mut edges: Vec<SubsidiaryRelation> = Vec::new();
        let mut seen: HashSet<String> = HashSet::from([root.to_string()]);
        let mut frontier = vec![root.to_string()];

        for _ in 0..=depth {
            if frontier.is_empty() {
                break;
            }
            let level = try_join_all(frontier.iter().map(|id| self.store.fetch_subsidiaries(id))).await?;
            frontier = Vec::new();
            for relation in level.into_iter().flatten() {
                if seen.insert(relation.subsidiary_id.clone()) {
                    frontier.push(relation.subsidiary_id.clone());
                }
                edges.push(relation);
            }
        }

        debug!(root, edges = edges.len(), "Ownership edges fetched");
        Ok(OwnershipGraph::from_edges(edges))
    }

    /// Own score of each subsidiary: its jurisdiction, raised to its rating
    /// when it is itself a customer
    async fn subsidiary_scores(&self, tree: &SubsidiaryTree) -> Result<HashMap<String, f64>> {
        let scored = try_join_all(tree.nodes.iter().map(|node| async move {
            let country = self.reference.country_risk(&node.country).await?;
            let rating = match self.store.fetch_customer(&node.subsidiary_id).await {
                Ok(customer) => level_score(customer.risk_rating),
                Err(Error::NotFound(_)) => 0.0,
                Err(e) => return Err(e),
            };
            Ok::<_, Error>((node.subsidiary_id.clone(), country.score.max(rating)))
        }))
        .await?;

        Ok(scored.into_iter().collect())
    }

    async fn assess_counterparty(
        &self,
        summary: CounterpartySummary,
        record: &Counterparty,
        transactions: &[Transaction],
        hits: &[ScenarioHit],
    ) -> Result<CounterpartyRisk> {
        let subject = ScreeningSubject::from(record);
        let (country_risk, business_risk, screening) = tokio::try_join!(
            self.reference.country_risk(&record.country),
            self.reference
                .business_type_risk(record.business_type.as_deref()),
            self.reference.screen(&subject),
        )?;

        let linked: HashSet<&str> = transactions
            .iter()
            .filter(|tx| tx.counterparty_id.as_deref() == Some(record.counterparty_id.as_str()))
            .map(|tx| tx.transaction_id.as_str())
            .collect();
        let pattern = hits
            .iter()
            .filter(|hit| hit.transaction_ids.iter().any(|id| linked.contains(id.as_str())))
            .map(|hit| hit.severity)
            .fold(0.0, f64::max);

        let values = FactorValues {
            country: country_risk.score,
            business_type: business_risk,
            transaction_pattern: pattern,
            adverse_media: screening.adverse_media_score,
            pep: if screening.is_pep { 1.0 } else { 0.0 },
            network: 0.0,
        };
        let indicators = RiskIndicators {
            is_pep: screening.is_pep,
            sanctioned: screening.sanctioned,
        };
        let assessment = self
            .counterparty_scorer
            .assess(&record.counterparty_id, &values, &indicators)?;

        Ok(CounterpartyRisk {
            counterparty: summary,
            country_risk,
            screening,
            assessment,
        })
    }
}
