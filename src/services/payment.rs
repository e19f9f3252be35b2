//! Payment flow: validation, parent resolution and the atomic per-kind handlers.
//!
//! A child transaction is accepted only against the right kind of parent. If
//! that parent is no longer approved the child is still recorded, with status
//! `errored`, and none of its side effects are applied.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{
    Entity, EntityKind, NewTransaction, Transaction, TransactionKind, TransactionStatus,
};
use crate::error::PaymentError;
use crate::ports::{
    Filter, MerchantLookup, RepositoryError, StorageTransaction, TransactionalStorage,
    TRANSACTION_PARENT_KEY,
};
use crate::validation::{validate_transaction, ValidationError};

pub const ALREADY_FOLLOWED: &str = "parent transaction already followed";

/// Maps a missing row to `NotFound` and anything else to a storage error.
fn lookup_error(
    entity: &'static str,
    operation: &'static str,
    kind: EntityKind,
    id: Uuid,
) -> impl FnOnce(RepositoryError) -> PaymentError {
    move |err| {
        if err.is_not_found() {
            PaymentError::NotFound { entity, id }
        } else {
            PaymentError::storage(operation, kind, id)(err)
        }
    }
}

/// Maps the one-child-per-parent violation to the same conflict the pre-check reports.
fn create_error(id: Uuid) -> impl FnOnce(RepositoryError) -> PaymentError {
    move |err| match err {
        RepositoryError::Conflict(constraint) if constraint == TRANSACTION_PARENT_KEY => {
            PaymentError::Conflict(ALREADY_FOLLOWED.to_string())
        }
        other => PaymentError::storage("create", EntityKind::Transaction, id)(other),
    }
}

pub struct PaymentService {
    storage: Arc<dyn TransactionalStorage>,
    merchants: Arc<dyn MerchantLookup>,
}

impl PaymentService {
    pub fn new(storage: Arc<dyn TransactionalStorage>, merchants: Arc<dyn MerchantLookup>) -> Self {
        Self { storage, merchants }
    }

    /// Validates and records a payment operation together with its side effects.
    pub async fn create(&self, input: NewTransaction) -> Result<Transaction, PaymentError> {
        validate_transaction(&input)?;
        let mut tx = Transaction::from_input(input);

        let merchant = self
            .merchants
            .find_merchant(tx.merchant_id)
            .await
            .map_err(lookup_error("merchant", "get", EntityKind::Merchant, tx.merchant_id))?;
        if !merchant.is_active() {
            return Err(PaymentError::Precondition(format!(
                "merchant inactive: {}",
                merchant.name
            )));
        }

        if let Some(parent_id) = tx.depends_on {
            let parent = self.resolve_parent(tx.kind, parent_id).await?;
            if !parent.is_approved() {
                warn!(
                    transaction_id = %tx.id,
                    kind = %tx.kind,
                    parent_id = %parent.id,
                    parent_status = %parent.status,
                    "Parent transaction is not approved, recording as errored"
                );
                tx.status = TransactionStatus::Errored;
            }
        }

        let id = tx.id;
        let created = match tx.kind {
            TransactionKind::Authorize => self
                .storage
                .create(Entity::from(tx))
                .await
                .map_err(create_error(id))?
                .into_transaction()
                .map_err(PaymentError::storage("create", EntityKind::Transaction, id))?,
            _ => self.apply(tx).await?,
        };

        info!(
            transaction_id = %created.id,
            kind = %created.kind,
            status = %created.status,
            amount = created.amount,
            merchant_id = %created.merchant_id,
            "Transaction recorded"
        );

        Ok(created)
    }

    pub async fn get(&self, id: Uuid) -> Result<Transaction, PaymentError> {
        self.storage
            .get(EntityKind::Transaction, id)
            .await
            .and_then(Entity::into_transaction)
            .map_err(lookup_error("transaction", "get", EntityKind::Transaction, id))
    }

    /// Transactions matching every filter, oldest first.
    pub async fn list(&self, filters: &[Filter]) -> Result<Vec<Transaction>, PaymentError> {
        let entities = self
            .storage
            .list(EntityKind::Transaction, filters)
            .await
            .map_err(|err| match err {
                invalid @ RepositoryError::InvalidFilter { .. } => {
                    PaymentError::from(ValidationError::new("filter", invalid.to_string()))
                }
                other => PaymentError::storage("list", EntityKind::Transaction, "*")(other),
            })?;

        entities
            .into_iter()
            .map(Entity::into_transaction)
            .collect::<Result<Vec<_>, _>>()
            .map_err(PaymentError::storage("list", EntityKind::Transaction, "*"))
    }

    /// Checks that `parent_id` exists, has no child yet and has the kind `kind` requires.
    async fn resolve_parent(
        &self,
        kind: TransactionKind,
        parent_id: Uuid,
    ) -> Result<Transaction, PaymentError> {
        let followers = self
            .storage
            .count(EntityKind::Transaction, &[Filter::DependsOn(parent_id)])
            .await
            .map_err(PaymentError::storage("count", EntityKind::Transaction, parent_id))?;
        if followers > 0 {
            return Err(PaymentError::Conflict(ALREADY_FOLLOWED.to_string()));
        }

        let parent = self
            .storage
            .get(EntityKind::Transaction, parent_id)
            .await
            .and_then(Entity::into_transaction)
            .map_err(lookup_error(
                "parent transaction",
                "get",
                EntityKind::Transaction,
                parent_id,
            ))?;

        if let Some(required) = kind.required_parent() {
            if parent.kind != required {
                return Err(PaymentError::Precondition(format!(
                    "parent transaction should be of type {}",
                    required
                )));
            }
        }

        Ok(parent)
    }

    /// Creates a child transaction and applies its side effects in one storage transaction.
    async fn apply(&self, tx: Transaction) -> Result<Transaction, PaymentError> {
        let id = tx.id;
        let handle = self
            .storage
            .transaction()
            .await
            .map_err(PaymentError::storage("begin", EntityKind::Transaction, id))?;

        let created = handle
            .create(Entity::from(tx))
            .await
            .map_err(create_error(id))?
            .into_transaction()
            .map_err(PaymentError::storage("create", EntityKind::Transaction, id))?;

        if created.is_approved() {
            match (created.kind, created.depends_on) {
                (TransactionKind::Charge, _) => {
                    adjust_merchant_balance(handle.as_ref(), created.merchant_id, created.amount)
                        .await?;
                }
                (TransactionKind::Refund, Some(parent_id)) => {
                    transition_parent(handle.as_ref(), parent_id, TransactionStatus::Refunded)
                        .await?;
                    adjust_merchant_balance(handle.as_ref(), created.merchant_id, -created.amount)
                        .await?;
                }
                (TransactionKind::Reversal, Some(parent_id)) => {
                    transition_parent(handle.as_ref(), parent_id, TransactionStatus::Reversed)
                        .await?;
                }
                _ => {}
            }
        }

        handle
            .commit()
            .await
            .map_err(PaymentError::storage("commit", EntityKind::Transaction, id))?;

        Ok(created)
    }
}

async fn transition_parent(
    handle: &dyn StorageTransaction,
    parent_id: Uuid,
    status: TransactionStatus,
) -> Result<(), PaymentError> {
    let mut parent = handle
        .get(EntityKind::Transaction, parent_id)
        .await
        .and_then(Entity::into_transaction)
        .map_err(lookup_error(
            "parent transaction",
            "get",
            EntityKind::Transaction,
            parent_id,
        ))?;

    parent.transition(status);
    handle
        .save(&Entity::from(parent))
        .await
        .map_err(PaymentError::storage("save", EntityKind::Transaction, parent_id))?;

    debug!(parent_id = %parent_id, status = %status, "Parent transaction updated");
    Ok(())
}

async fn adjust_merchant_balance(
    handle: &dyn StorageTransaction,
    merchant_id: Uuid,
    delta: i64,
) -> Result<(), PaymentError> {
    let mut merchant = handle
        .get(EntityKind::Merchant, merchant_id)
        .await
        .and_then(Entity::into_merchant)
        .map_err(lookup_error("merchant", "get", EntityKind::Merchant, merchant_id))?;

    let total = merchant.adjust_balance(delta).ok_or_else(|| {
        PaymentError::Precondition(format!("balance of merchant {} would overflow", merchant.name))
    })?;

    handle
        .save(&Entity::from(merchant))
        .await
        .map_err(PaymentError::storage("save", EntityKind::Merchant, merchant_id))?;

    debug!(merchant_id = %merchant_id, delta, total, "Merchant balance adjusted");
    Ok(())
}
