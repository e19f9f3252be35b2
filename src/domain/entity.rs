//! Closed set of entities the storage port knows how to persist.

use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use super::{Merchant, Transaction};
use crate::ports::{RepositoryError, RepositoryResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EntityKind {
    Transaction,
    Merchant,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Transaction => f.write_str("transaction"),
            EntityKind::Merchant => f.write_str("merchant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Entity {
    Transaction(Transaction),
    Merchant(Merchant),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Transaction(_) => EntityKind::Transaction,
            Entity::Merchant(_) => EntityKind::Merchant,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Entity::Transaction(tx) => tx.id,
            Entity::Merchant(m) => m.id,
        }
    }

    pub fn into_transaction(self) -> RepositoryResult<Transaction> {
        match self {
            Entity::Transaction(tx) => Ok(tx),
            other => Err(RepositoryError::KindMismatch {
                expected: EntityKind::Transaction,
                found: other.kind(),
            }),
        }
    }

    pub fn into_merchant(self) -> RepositoryResult<Merchant> {
        match self {
            Entity::Merchant(m) => Ok(m),
            other => Err(RepositoryError::KindMismatch {
                expected: EntityKind::Merchant,
                found: other.kind(),
            }),
        }
    }
}

impl From<Transaction> for Entity {
    fn from(tx: Transaction) -> Self {
        Entity::Transaction(tx)
    }
}

impl From<Merchant> for Entity {
    fn from(m: Merchant) -> Self {
        Entity::Merchant(m)
    }
}
