//! Core domain records consumed by the engine
//!
//! All records are read-only views handed over by the data-access
//! collaborator. Money is always [`Decimal`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Risk level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    /// Low risk
    Low,
    /// Medium risk
    Medium,
    /// High risk
    High,
}

impl RiskLevel {
    /// Upper-case label
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Money direction relative to the customer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// Funds leaving the customer
    Debit,
    /// Funds arriving at the customer
    Credit,
}

/// Transaction type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// Outgoing domestic wire
    WireTransfer,
    /// Incoming wire
    IncomingWire,
    /// Outgoing cross-border wire
    InternationalWire,
    /// ACH credit
    AchCredit,
    /// ACH debit
    AchDebit,
    /// Cash deposit
    CashDeposit,
    /// Cash withdrawal
    CashWithdrawal,
    /// Check deposit
    CheckDeposit,
    /// Card / merchant payment
    MerchantPayment,
    /// Loan repayment
    LoanPayment,
    /// Payroll run
    Payroll,
}

impl TransactionType {
    /// Debit or credit from the customer's point of view
    pub fn direction(&self) -> Direction {
        match self {
            TransactionType::IncomingWire
            | TransactionType::AchCredit
            | TransactionType::CashDeposit
            | TransactionType::CheckDeposit => Direction::Credit,
            TransactionType::WireTransfer
            | TransactionType::InternationalWire
            | TransactionType::AchDebit
            | TransactionType::CashWithdrawal
            | TransactionType::MerchantPayment
            | TransactionType::LoanPayment
            | TransactionType::Payroll => Direction::Debit,
        }
    }

    /// Account-to-account transfer (wire or ACH)
    pub fn is_transfer(&self) -> bool {
        matches!(
            self,
            TransactionType::WireTransfer
                | TransactionType::IncomingWire
                | TransactionType::InternationalWire
                | TransactionType::AchCredit
                | TransactionType::AchDebit
        )
    }
}

/// Transaction status
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Settled
    Completed,
    /// Not yet settled
    Pending,
    /// Rejected, with the reason reported by the processor
    Failed {
        /// Failure reason code (e.g. `INSUFFICIENT_FUNDS`)
        reason: String,
    },
}

impl TransactionStatus {
    /// Upper-case label without the failure reason
    pub fn label(&self) -> &'static str {
        match self {
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Failed { .. } => "FAILED",
        }
    }

    /// Failure reason, if failed
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            TransactionStatus::Failed { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Channel the transaction was initiated through
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    /// Wire network
    Wire,
    /// ACH network
    Ach,
    /// Paper check
    Check,
    /// Cash at counter or ATM
    Cash,
    /// Card network
    Card,
    /// Online banking
    Online,
    /// Branch-initiated
    Branch,
}

/// Immutable transaction record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction ID
    pub transaction_id: String,

    /// Owning customer
    pub customer_id: String,

    /// Account the transaction was booked on
    #[serde(default)]
    pub account_id: Option<String>,

    /// Transaction type
    pub transaction_type: TransactionType,

    /// Amount (always positive, direction comes from the type)
    pub amount: Decimal,

    /// ISO 4217 currency code
    pub currency: String,

    /// Booking timestamp
    pub timestamp: DateTime<Utc>,

    /// Status
    pub status: TransactionStatus,

    /// Initiation channel
    pub channel: Channel,

    /// Counterparty reference
    #[serde(default)]
    pub counterparty_id: Option<String>,

    /// Fee charged
    #[serde(default)]
    pub fee: Decimal,
}

impl Transaction {
    /// Debit or credit
    pub fn direction(&self) -> Direction {
        self.transaction_type.direction()
    }

    /// Failed status
    pub fn is_failed(&self) -> bool {
        matches!(self.status, TransactionStatus::Failed { .. })
    }
}

/// Bank customer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    /// Customer ID
    pub customer_id: String,

    /// Legal name
    pub name: String,

    /// Current risk rating (written back elsewhere, never by the engine)
    pub risk_rating: RiskLevel,

    /// Country of incorporation / residence
    pub country: String,

    /// Business type / industry
    #[serde(default)]
    pub business_type: Option<String>,

    /// Onboarding date
    pub created_at: DateTime<Utc>,

    /// Account references
    #[serde(default)]
    pub accounts: Vec<String>,
}

/// External counterparty
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Counterparty {
    /// Counterparty ID
    pub counterparty_id: String,

    /// Name
    pub name: String,

    /// Country
    pub country: String,

    /// Business type
    #[serde(default)]
    pub business_type: Option<String>,

    /// Public position held, when politically exposed
    #[serde(default)]
    pub pep_position: Option<String>,

    /// Transactions with bank customers
    #[serde(default)]
    pub transaction_ids: Vec<String>,
}

impl Counterparty {
    /// Politically exposed person
    pub fn is_pep(&self) -> bool {
        self.pep_position.is_some()
    }
}

/// Ownership edge parent -> subsidiary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsidiaryRelation {
    /// Owning customer / entity
    pub parent_id: String,

    /// Owned entity
    pub subsidiary_id: String,

    /// Subsidiary name
    pub name: String,

    /// Subsidiary country
    pub country: String,

    /// Ownership percentage (0-100)
    pub ownership_percentage: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directions() {
        assert_eq!(TransactionType::CashDeposit.direction(), Direction::Credit);
        assert_eq!(TransactionType::WireTransfer.direction(), Direction::Debit);
        assert!(TransactionType::AchDebit.is_transfer());
        assert!(!TransactionType::CheckDeposit.is_transfer());
    }

    #[test]
    fn test_risk_level_order() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert_eq!(RiskLevel::High.to_string(), "HIGH");
    }

    #[test]
    fn test_status_serialization() {
        let failed = TransactionStatus::Failed {
            reason: "INSUFFICIENT_FUNDS".to_string(),
        };
        let json = serde_json::to_string(&failed).unwrap();
        assert_eq!(json, r#"{"state":"FAILED","reason":"INSUFFICIENT_FUNDS"}"#);
        assert_eq!(failed.label(), "FAILED");
        assert_eq!(failed.failure_reason(), Some("INSUFFICIENT_FUNDS"));
    }
}
