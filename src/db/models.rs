use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::{Merchant, MerchantStatus, Transaction, TransactionKind, TransactionStatus};
use crate::ports::{RepositoryError, RepositoryResult};

/// Row shape of `transactions`. Enums are stored as their lowercase names.
#[derive(Debug, FromRow)]
pub struct TransactionRow {
    pub id: Uuid,
    pub kind: String,
    pub amount: i64,
    pub customer_email: String,
    pub customer_phone: String,
    pub status: String,
    pub merchant_id: Uuid,
    pub depends_on: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRow {
    pub fn from_domain(tx: &Transaction) -> Self {
        Self {
            id: tx.id,
            kind: tx.kind.as_str().to_string(),
            amount: tx.amount,
            customer_email: tx.customer_email.clone(),
            customer_phone: tx.customer_phone.clone(),
            status: tx.status.as_str().to_string(),
            merchant_id: tx.merchant_id,
            depends_on: tx.depends_on,
            created_at: tx.created_at,
            updated_at: tx.updated_at,
        }
    }

    pub fn into_domain(self) -> RepositoryResult<Transaction> {
        Ok(Transaction {
            id: self.id,
            kind: self
                .kind
                .parse::<TransactionKind>()
                .map_err(RepositoryError::Corrupt)?,
            amount: self.amount,
            customer_email: self.customer_email,
            customer_phone: self.customer_phone,
            status: self
                .status
                .parse::<TransactionStatus>()
                .map_err(RepositoryError::Corrupt)?,
            merchant_id: self.merchant_id,
            depends_on: self.depends_on,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct MerchantRow {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub email: String,
    pub active: bool,
    pub total_transaction_sum: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MerchantRow {
    pub fn from_domain(m: &Merchant) -> Self {
        Self {
            id: m.id,
            name: m.name.clone(),
            description: m.description.clone(),
            email: m.email.clone(),
            active: m.is_active(),
            total_transaction_sum: m.total_transaction_sum,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }

    pub fn into_domain(self) -> Merchant {
        Merchant {
            id: self.id,
            name: self.name,
            description: self.description,
            email: self.email,
            status: MerchantStatus::from_active(self.active),
            total_transaction_sum: self.total_transaction_sum,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
