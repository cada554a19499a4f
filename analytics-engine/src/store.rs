//! Data-access collaborator
//!
//! The engine never talks to storage directly. Everything it reads comes
//! through [`DataAccess`], which must return records already scoped to the
//! requested entity and range. [`InMemoryStore`] backs tests and the
//! `aml-report` binary.

use crate::window::TimeRange;
use crate::{Counterparty, Customer, Error, Result, SubsidiaryRelation, Transaction, TransactionType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Entity whose transactions are requested
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum EntityRef {
    /// One customer
    Customer(String),
    /// One counterparty, across all customers
    Counterparty(String),
    /// Every customer of the bank
    AllCustomers,
}

/// Extra narrowing applied by the data layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionFilter {
    /// Restrict to these types, empty means all
    #[serde(default)]
    pub transaction_types: Vec<TransactionType>,

    /// Restrict to one currency
    #[serde(default)]
    pub currency: Option<String>,
}

impl TransactionFilter {
    /// No narrowing
    pub fn all() -> Self {
        Self::default()
    }

    /// Wire and ACH transfers only
    pub fn transfers() -> Self {
        Self {
            transaction_types: vec![
                TransactionType::WireTransfer,
                TransactionType::IncomingWire,
                TransactionType::InternationalWire,
                TransactionType::AchCredit,
                TransactionType::AchDebit,
            ],
            currency: None,
        }
    }

    /// Does the transaction pass the filter
    pub fn matches(&self, tx: &Transaction) -> bool {
        let type_ok = self.transaction_types.is_empty()
            || self.transaction_types.contains(&tx.transaction_type);
        let currency_ok = self
            .currency
            .as_ref()
            .map_or(true, |code| code == &tx.currency);
        type_ok && currency_ok
    }
}

/// Data-access collaborator
#[async_trait]
pub trait DataAccess: Send + Sync {
    /// Transactions of `entity` inside `range`, ordered by timestamp
    async fn fetch_transactions(
        &self,
        entity: &EntityRef,
        range: &TimeRange,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>>;

    /// Single transaction by ID
    async fn fetch_transaction(&self, transaction_id: &str) -> Result<Transaction>;

    /// Customer by ID
    async fn fetch_customer(&self, customer_id: &str) -> Result<Customer>;

    /// Counterparty by ID
    async fn fetch_counterparty(&self, counterparty_id: &str) -> Result<Counterparty>;

    /// Direct ownership edges out of `customer_id`
    async fn fetch_subsidiaries(&self, customer_id: &str) -> Result<Vec<SubsidiaryRelation>>;
}

/// Serialized dataset accepted by [`InMemoryStore`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    /// Customers
    #[serde(default)]
    pub customers: Vec<Customer>,
    /// Counterparties
    #[serde(default)]
    pub counterparties: Vec<Counterparty>,
    /// Transactions
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    /// Ownership edges
    #[serde(default)]
    pub subsidiaries: Vec<SubsidiaryRelation>,
}

/// In-memory, read-only store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    customers: HashMap<String, Customer>,
    counterparties: HashMap<String, Counterparty>,
    transactions: Vec<Transaction>,
    subsidiaries: HashMap<String, Vec<SubsidiaryRelation>>,
}

impl InMemoryStore {
    /// Index a dataset
    pub fn from_dataset(dataset: Dataset) -> Self {
        let mut transactions = dataset.transactions;
        transactions.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        let mut subsidiaries: HashMap<String, Vec<SubsidiaryRelation>> = HashMap::new();
        for edge in dataset.subsidiaries {
            subsidiaries
                .entry(edge.parent_id.clone())
                .or_insert_with(Vec::new)
                .push(edge);
        }

        Self {
            customers: dataset
                .customers
                .into_iter()
                .map(|c| (c.customer_id.clone(), c))
                .collect(),
            counterparties: dataset
                .counterparties
                .into_iter()
                .map(|c| (c.counterparty_id.clone(), c))
                .collect(),
            transactions,
            subsidiaries,
        }
    }

    /// Parse a JSON dataset
    pub fn from_json(json: &str) -> Result<Self> {
        let dataset: Dataset = serde_json::from_str(json)
            .map_err(|e| Error::InvalidInput(format!("Failed to parse dataset: {}", e)))?;
        Ok(Self::from_dataset(dataset))
    }

    /// Number of stored transactions
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }
}

#[async_trait]
impl DataAccess for InMemoryStore {
    async fn fetch_transactions(
        &self,
        entity: &EntityRef,
        range: &TimeRange,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>> {
        Ok(self
            .transactions
            .iter()
            .filter(|tx| match entity {
                EntityRef::Customer(id) => &tx.customer_id == id,
                EntityRef::Counterparty(id) => tx.counterparty_id.as_ref() == Some(id),
                EntityRef::AllCustomers => true,
            })
            .filter(|tx| range.contains(tx.timestamp) && filter.matches(tx))
            .cloned()
            .collect())
    }

    async fn fetch_transaction(&self, transaction_id: &str) -> Result<Transaction> {
        self.transactions
            .iter()
            .find(|tx| tx.transaction_id == transaction_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("transaction {}", transaction_id)))
    }

    async fn fetch_customer(&self, customer_id: &str) -> Result<Customer> {
        self.customers
            .get(customer_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("customer {}", customer_id)))
    }

    async fn fetch_counterparty(&self, counterparty_id: &str) -> Result<Counterparty> {
        self.counterparties
            .get(counterparty_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("counterparty {}", counterparty_id)))
    }

    async fn fetch_subsidiaries(&self, customer_id: &str) -> Result<Vec<SubsidiaryRelation>> {
        Ok(self.subsidiaries.get(customer_id).cloned().unwrap_or_default())
    }
}
