//! Storage ports consumed by the services.
//! Backends live in `crate::adapters`; services only see these traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Entity, EntityKind, Merchant, TransactionKind, TransactionStatus};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: String },

    #[error("unique constraint violated: {0}")]
    Conflict(String),

    #[error("filter {filter} does not apply to {kind}")]
    InvalidFilter { kind: EntityKind, filter: Filter },

    #[error("expected a {expected}, storage returned a {found}")]
    KindMismatch {
        expected: EntityKind,
        found: EntityKind,
    },

    #[error("storage transaction already finished")]
    TransactionFinished,

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl RepositoryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound { .. })
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Constraint names carried by `RepositoryError::Conflict`. Both backends use the Postgres names.
pub const TRANSACTION_PARENT_KEY: &str = "transactions_depends_on_key";
pub const TRANSACTION_MERCHANT_FKEY: &str = "transactions_merchant_id_fkey";
pub const MERCHANT_NAME_KEY: &str = "merchants_name_key";
pub const MERCHANT_EMAIL_KEY: &str = "merchants_email_key";

/// Predicates understood by every backend. Multiple filters are combined with AND.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    DependsOn(Uuid),
    MerchantId(Uuid),
    Kind(TransactionKind),
    Status(TransactionStatus),
    CreatedBefore(DateTime<Utc>),
    Name(String),
    Email(String),
    Active(bool),
}

impl Filter {
    pub fn applies_to(&self, kind: EntityKind) -> bool {
        match self {
            Filter::DependsOn(_)
            | Filter::MerchantId(_)
            | Filter::Kind(_)
            | Filter::Status(_) => kind == EntityKind::Transaction,
            Filter::Name(_) | Filter::Email(_) | Filter::Active(_) => kind == EntityKind::Merchant,
            Filter::CreatedBefore(_) => true,
        }
    }

    /// Rejects the first filter that has no meaning for `kind`.
    pub fn check_all(kind: EntityKind, filters: &[Filter]) -> RepositoryResult<()> {
        match filters.iter().find(|f| !f.applies_to(kind)) {
            Some(filter) => Err(RepositoryError::InvalidFilter {
                kind,
                filter: filter.clone(),
            }),
            None => Ok(()),
        }
    }

    /// In-process evaluation, used by backends without a query language.
    pub fn matches(&self, entity: &Entity) -> bool {
        match (self, entity) {
            (Filter::DependsOn(id), Entity::Transaction(tx)) => tx.depends_on == Some(*id),
            (Filter::MerchantId(id), Entity::Transaction(tx)) => tx.merchant_id == *id,
            (Filter::Kind(kind), Entity::Transaction(tx)) => tx.kind == *kind,
            (Filter::Status(status), Entity::Transaction(tx)) => tx.status == *status,
            (Filter::CreatedBefore(cutoff), Entity::Transaction(tx)) => tx.created_at < *cutoff,
            (Filter::CreatedBefore(cutoff), Entity::Merchant(m)) => m.created_at < *cutoff,
            (Filter::Name(name), Entity::Merchant(m)) => m.name == *name,
            (Filter::Email(email), Entity::Merchant(m)) => m.email == *email,
            (Filter::Active(active), Entity::Merchant(m)) => m.is_active() == *active,
            _ => false,
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::DependsOn(id) => write!(f, "depends_on = {}", id),
            Filter::MerchantId(id) => write!(f, "merchant_id = {}", id),
            Filter::Kind(kind) => write!(f, "kind = {}", kind),
            Filter::Status(status) => write!(f, "status = {}", status),
            Filter::CreatedBefore(cutoff) => write!(f, "created_at < {}", cutoff.to_rfc3339()),
            Filter::Name(name) => write!(f, "name = {}", name),
            Filter::Email(email) => write!(f, "email = {}", email),
            Filter::Active(active) => write!(f, "active = {}", active),
        }
    }
}

/// Persistence capabilities shared by a storage backend and its transaction handles.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Inserts a new entity. Uniqueness violations surface as `RepositoryError::Conflict`.
    async fn create(&self, entity: Entity) -> RepositoryResult<Entity>;

    async fn get(&self, kind: EntityKind, id: Uuid) -> RepositoryResult<Entity>;

    /// First entity matching all filters.
    async fn get_by(&self, kind: EntityKind, filters: &[Filter]) -> RepositoryResult<Entity>;

    /// Updates an existing entity in place.
    async fn save(&self, entity: &Entity) -> RepositoryResult<()>;

    async fn count(&self, kind: EntityKind, filters: &[Filter]) -> RepositoryResult<u64>;

    /// Deletes every matching entity in one statement and returns how many went away.
    async fn delete(&self, kind: EntityKind, filters: &[Filter]) -> RepositoryResult<u64>;

    async fn list(&self, kind: EntityKind, filters: &[Filter]) -> RepositoryResult<Vec<Entity>>;
}

/// A storage handle whose writes become visible together on `commit`.
///
/// Dropping the handle without committing rolls every write back, so an early
/// return through `?` or a panic never leaves a partial write set behind.
#[async_trait]
pub trait StorageTransaction: Storage {
    async fn commit(&self) -> RepositoryResult<()>;

    async fn rollback(&self) -> RepositoryResult<()>;
}

#[async_trait]
pub trait TransactionalStorage: Storage {
    /// Opens a scoped transaction. Reads through it lock what they return
    /// until the transaction finishes.
    async fn transaction(&self) -> RepositoryResult<Box<dyn StorageTransaction>>;
}

/// Narrow read port the payment flow uses to check the merchant up front.
#[async_trait]
pub trait MerchantLookup: Send + Sync {
    async fn find_merchant(&self, id: Uuid) -> RepositoryResult<Merchant>;
}
