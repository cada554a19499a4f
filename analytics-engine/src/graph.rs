//! Relationship graph: counterparty links and ownership trees
//!
//! Counterparty relations are an inverted index over a fetched transaction
//! set. Ownership relations are walked depth-first with a visited set and a
//! recursion stack so that loops in the ownership data are reported instead
//! of followed.

use crate::aggregator::to_f64;
use crate::{Counterparty, Error, Result, SubsidiaryRelation, Transaction};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

/// Graph traversal settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Subsidiary depth when the caller gives none
    pub default_depth: usize,
    /// Hard cap on subsidiary depth
    pub max_depth: usize,
    /// Per-level decay applied when propagating risk
    pub propagation_decay: f64,
    /// Turn a detected ownership loop into an error
    pub fail_on_cycle: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            default_depth: 3,
            max_depth: 5,
            propagation_decay: 0.5,
            fail_on_cycle: false,
        }
    }
}

/// Counterparty as seen from one customer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterpartySummary {
    /// Counterparty ID
    pub counterparty_id: String,
    /// Name, when the record is known
    pub name: Option<String>,
    /// Country, when the record is known
    pub country: Option<String>,
    /// Politically exposed person
    pub is_pep: bool,
    /// Position held
    pub pep_position: Option<String>,
    /// Transactions with the customer
    pub transaction_count: usize,
    /// Sum of those transactions
    pub total_value: Decimal,
    /// Oldest transaction
    pub first_transaction_date: DateTime<Utc>,
    /// Newest transaction
    pub last_transaction_date: DateTime<Utc>,
}

/// Customer as seen from one counterparty
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedCustomer {
    /// Customer ID
    pub customer_id: String,
    /// Transactions with the counterparty
    pub transaction_count: usize,
    /// Sum of those transactions
    pub total_value: Decimal,
    /// Oldest transaction
    pub first_transaction_date: DateTime<Utc>,
    /// Newest transaction
    pub last_transaction_date: DateTime<Utc>,
}

struct Link {
    count: usize,
    total: Decimal,
    first: DateTime<Utc>,
    last: DateTime<Utc>,
}

impl Link {
    fn new(tx: &Transaction) -> Self {
        Self {
            count: 0,
            total: Decimal::ZERO,
            first: tx.timestamp,
            last: tx.timestamp,
        }
    }

    fn add(&mut self, tx: &Transaction) {
        self.count += 1;
        self.total += tx.amount;
        self.first = self.first.min(tx.timestamp);
        self.last = self.last.max(tx.timestamp);
    }
}

fn link_index<'a, F>(transactions: &'a [Transaction], key: F) -> BTreeMap<&'a str, Link>
where
    F: Fn(&'a Transaction) -> Option<&'a str>,
{
    let mut index: BTreeMap<&str, Link> = BTreeMap::new();
    for tx in transactions {
        if let Some(id) = key(tx) {
            index.entry(id).or_insert_with(|| Link::new(tx)).add(tx);
        }
    }
    index
}

/// Counterparties of a customer, largest total value first
pub fn counterparties_of_customer(
    transactions: &[Transaction],
    counterparties: &HashMap<String, Counterparty>,
) -> Vec<CounterpartySummary> {
    let index = link_index(transactions, |tx| tx.counterparty_id.as_deref());

    let mut summaries: Vec<CounterpartySummary> = index
        .into_iter()
        .map(|(id, link)| {
            let record = counterparties.get(id);
            CounterpartySummary {
                counterparty_id: id.to_string(),
                name: record.map(|c| c.name.clone()),
                country: record.map(|c| c.country.clone()),
                is_pep: record.map_or(false, Counterparty::is_pep),
                pep_position: record.and_then(|c| c.pep_position.clone()),
                transaction_count: link.count,
                total_value: link.total,
                first_transaction_date: link.first,
                last_transaction_date: link.last,
            }
        })
        .collect();

    summaries.sort_by(|a, b| b.total_value.cmp(&a.total_value));
    summaries
}

/// Customers that transacted with `counterparty_id`, largest total value first
pub fn related_customers(counterparty_id: &str, transactions: &[Transaction]) -> Vec<RelatedCustomer> {
    let index = link_index(transactions, |tx| {
        (tx.counterparty_id.as_deref() == Some(counterparty_id)).then_some(tx.customer_id.as_str())
    });

    let mut related: Vec<RelatedCustomer> = index
        .into_iter()
        .map(|(id, link)| RelatedCustomer {
            customer_id: id.to_string(),
            transaction_count: link.count,
            total_value: link.total,
            first_transaction_date: link.first,
            last_transaction_date: link.last,
        })
        .collect();

    related.sort_by(|a, b| b.total_value.cmp(&a.total_value));
    related
}

/// Subsidiary reached from the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsidiaryNode {
    /// Subsidiary ID
    pub subsidiary_id: String,
    /// Direct parent on the traversal path
    pub parent_id: String,
    /// Name
    pub name: String,
    /// Country
    pub country: String,
    /// Distance from the root, direct subsidiaries are 1
    pub depth: usize,
    /// Direct ownership percentage (0-100)
    pub ownership_percentage: Decimal,
    /// Product of ownership fractions along the path (0-1)
    pub effective_ownership: Decimal,
}

/// Ownership loop found during traversal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleMarker {
    /// Entities on the loop, first entity repeated at the end
    pub path: Vec<String>,
}

impl From<CycleMarker> for Error {
    fn from(marker: CycleMarker) -> Self {
        Error::CycleDetected { path: marker.path }
    }
}

/// Subsidiary hierarchy below one root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsidiaryTree {
    /// Root entity
    pub root: String,
    /// Reached subsidiaries in traversal order
    pub nodes: Vec<SubsidiaryNode>,
    /// Loops found
    pub cycles: Vec<CycleMarker>,
    /// Traversal stopped at the depth limit with edges left to follow
    pub depth_limited: bool,
}

impl SubsidiaryTree {
    /// Fail on the first loop when asked to
    pub fn check_cycles(self, fail_on_cycle: bool) -> Result<Self> {
        if fail_on_cycle {
            if let Some(marker) = self.cycles.first() {
                return Err(marker.clone().into());
            }
        }
        Ok(self)
    }
}

/// Directed ownership graph
#[derive(Debug, Clone, Default)]
pub struct OwnershipGraph {
    edges: HashMap<String, Vec<SubsidiaryRelation>>,
}

impl OwnershipGraph {
    /// Build from ownership edges; duplicate edges are dropped
    pub fn from_edges(relations: impl IntoIterator<Item = SubsidiaryRelation>) -> Self {
        let mut edges: HashMap<String, Vec<SubsidiaryRelation>> = HashMap::new();
        for relation in relations {
            let children = edges.entry(relation.parent_id.clone()).or_default();
            if !children
                .iter()
                .any(|c| c.subsidiary_id == relation.subsidiary_id)
            {
                children.push(relation);
            }
        }
        for children in edges.values_mut() {
            children.sort_by(|a, b| a.subsidiary_id.cmp(&b.subsidiary_id));
        }
        Self { edges }
    }

    /// Walk the subsidiaries of `root` down to `max_depth`.
    ///
    /// Every entity is expanded once. An edge back onto the current path is
    /// recorded as a cycle and not followed.
    pub fn subsidiary_tree(&self, root: &str, max_depth: usize) -> SubsidiaryTree {
        let mut walk = Walk {
            graph: self,
            max_depth,
            visited: HashSet::new(),
            rec_stack: HashSet::new(),
            path: Vec::new(),
            tree: SubsidiaryTree {
                root: root.to_string(),
                nodes: Vec::new(),
                cycles: Vec::new(),
                depth_limited: false,
            },
        };
        walk.visit(root, 0, Decimal::ONE);

        if !walk.tree.cycles.is_empty() {
            warn!(
                root,
                cycles = walk.tree.cycles.len(),
                "Ownership cycle detected"
            );
        }
        debug!(
            root,
            nodes = walk.tree.nodes.len(),
            depth_limited = walk.tree.depth_limited,
            "Subsidiary traversal complete"
        );
        walk.tree
    }
}

struct Walk<'g> {
    graph: &'g OwnershipGraph,
    max_depth: usize,
    visited: HashSet<String>,
    rec_stack: HashSet<String>,
    path: Vec<String>,
    tree: SubsidiaryTree,
}

impl Walk<'_> {
    fn visit(&mut self, entity: &str, depth: usize, effective: Decimal) {
        self.visited.insert(entity.to_string());
        self.rec_stack.insert(entity.to_string());
        self.path.push(entity.to_string());

        let graph = self.graph;
        for edge in graph.edges.get(entity).map(Vec::as_slice).unwrap_or_default() {
            let child = edge.subsidiary_id.as_str();
            if self.rec_stack.contains(child) {
                let start = self.path.iter().position(|p| p == child).unwrap_or(0);
                let mut cycle: Vec<String> = self.path[start..].to_vec();
                cycle.push(child.to_string());
                self.tree.cycles.push(CycleMarker { path: cycle });
                continue;
            }
            if self.visited.contains(child) {
                continue;
            }
            if depth >= self.max_depth {
                self.tree.depth_limited = true;
                continue;
            }

            let share = effective * edge.ownership_percentage / Decimal::ONE_HUNDRED;
            self.tree.nodes.push(SubsidiaryNode {
                subsidiary_id: edge.subsidiary_id.clone(),
                parent_id: edge.parent_id.clone(),
                name: edge.name.clone(),
                country: edge.country.clone(),
                depth: depth + 1,
                ownership_percentage: edge.ownership_percentage,
                effective_ownership: share,
            });
            self.visit(child, depth + 1, share);
        }

        self.path.pop();
        self.rec_stack.remove(entity);
    }
}

/// Risk carried in from one related entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagatedRisk {
    /// Related entity
    pub entity_id: String,
    /// Depth in the tree
    pub depth: usize,
    /// Entity's own score
    pub score: f64,
    /// Score after ownership and depth decay
    pub propagated: f64,
}

/// Network risk derived from related entities
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkRisk {
    /// Per-entity contributions
    pub contributions: Vec<PropagatedRisk>,
    /// Largest contribution, used as the network factor
    pub network_risk: f64,
}

/// Propagate subsidiary scores up to the root.
///
/// Each score is scaled by effective ownership and by `decay` once per level
/// below the direct subsidiaries. Entities without a score contribute
/// nothing.
pub fn propagate_risk(tree: &SubsidiaryTree, scores: &HashMap<String, f64>, decay: f64) -> NetworkRisk {
    let decay = decay.clamp(0.0, 1.0);
    let contributions: Vec<PropagatedRisk> = tree
        .nodes
        .iter()
        .filter_map(|node| {
            let score = scores.get(&node.subsidiary_id)?.clamp(0.0, 1.0);
            let levels = i32::try_from(node.depth.saturating_sub(1)).unwrap_or(i32::MAX);
            Some(PropagatedRisk {
                entity_id: node.subsidiary_id.clone(),
                depth: node.depth,
                score,
                propagated: score * to_f64(node.effective_ownership) * decay.powi(levels),
            })
        })
        .collect();

    let network_risk = contributions
        .iter()
        .map(|c| c.propagated)
        .fold(0.0, f64::max);

    NetworkRisk {
        contributions,
        network_risk,
    }
}

/// Counterparty risk weighted by transaction value
pub fn counterparty_exposure(summaries: &[CounterpartySummary], scores: &HashMap<String, f64>) -> f64 {
    let mut weighted = 0.0;
    let mut total = 0.0;
    for summary in summaries {
        if let Some(score) = scores.get(&summary.counterparty_id) {
            let value = to_f64(summary.total_value);
            weighted += value * score.clamp(0.0, 1.0);
            total += value;
        }
    }
    if total > 0.0 {
        weighted / total
    } else {
        0.0
    }
}
