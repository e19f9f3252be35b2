//! Transaction domain entity.
//! Framework-agnostic representation of a payment operation and its place in a chain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The four payment operations a chain is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Authorize,
    Charge,
    Refund,
    Reversal,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Authorize => "authorize",
            TransactionKind::Charge => "charge",
            TransactionKind::Refund => "refund",
            TransactionKind::Reversal => "reversal",
        }
    }

    /// Kind the parent must have for this kind to act on it. `None` for roots.
    pub fn required_parent(&self) -> Option<TransactionKind> {
        match self {
            TransactionKind::Authorize => None,
            TransactionKind::Charge | TransactionKind::Reversal => Some(TransactionKind::Authorize),
            TransactionKind::Refund => Some(TransactionKind::Charge),
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authorize" => Ok(TransactionKind::Authorize),
            "charge" => Ok(TransactionKind::Charge),
            "refund" => Ok(TransactionKind::Refund),
            "reversal" => Ok(TransactionKind::Reversal),
            other => Err(format!("unknown transaction kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Approved,
    Reversed,
    Refunded,
    Errored,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Approved => "approved",
            TransactionStatus::Reversed => "reversed",
            TransactionStatus::Refunded => "refunded",
            TransactionStatus::Errored => "errored",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(TransactionStatus::Approved),
            "reversed" => Ok(TransactionStatus::Reversed),
            "refunded" => Ok(TransactionStatus::Refunded),
            "errored" => Ok(TransactionStatus::Errored),
            other => Err(format!("unknown transaction status '{}'", other)),
        }
    }
}

/// Caller input for a new transaction. Identity and status are owned by the service.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewTransaction {
    pub kind: TransactionKind,
    pub amount: i64,
    pub customer_email: String,
    #[serde(default)]
    pub customer_phone: String,
    #[serde(default)]
    pub merchant_id: Uuid,
    #[serde(default)]
    pub depends_on: Option<Uuid>,
    #[serde(default)]
    pub status: Option<TransactionStatus>,
}

/// Domain entity representing a persisted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    pub id: Uuid,
    pub kind: TransactionKind,
    pub amount: i64,
    pub customer_email: String,
    pub customer_phone: String,
    pub status: TransactionStatus,
    pub merchant_id: Uuid,
    pub depends_on: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Builds an approved transaction with a fresh id from already validated input.
    pub fn from_input(input: NewTransaction) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind: input.kind,
            amount: input.amount,
            customer_email: input.customer_email,
            customer_phone: input.customer_phone,
            status: TransactionStatus::Approved,
            merchant_id: input.merchant_id,
            depends_on: input.depends_on,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.status == TransactionStatus::Approved
    }

    /// Moves the transaction to `status` and bumps `updated_at`.
    pub fn transition(&mut self, status: TransactionStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}
