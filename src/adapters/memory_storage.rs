//! In-memory storage backend.
//!
//! Holds both entity tables behind one async mutex. A transaction handle takes
//! that mutex for its whole lifetime and works on a staged copy, which is
//! written back on commit and simply dropped otherwise. Uniqueness rules
//! mirror the Postgres schema: one child per parent, unique merchant name and
//! email, and transactions must reference an existing merchant.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use crate::domain::{Entity, EntityKind, Merchant, Transaction};
use crate::ports::{
    Filter, RepositoryError, RepositoryResult, Storage, StorageTransaction, TransactionalStorage,
    MERCHANT_EMAIL_KEY, MERCHANT_NAME_KEY, TRANSACTION_MERCHANT_FKEY, TRANSACTION_PARENT_KEY,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    transactions: HashMap<Uuid, Transaction>,
    merchants: HashMap<Uuid, Merchant>,
}

impl MemoryState {
    fn not_found(kind: EntityKind, id: impl ToString) -> RepositoryError {
        RepositoryError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    fn create(&mut self, entity: Entity) -> RepositoryResult<Entity> {
        match entity {
            Entity::Transaction(tx) => {
                if self.transactions.contains_key(&tx.id) {
                    return Err(RepositoryError::Conflict("transactions_pkey".to_string()));
                }
                if let Some(parent) = tx.depends_on {
                    if self
                        .transactions
                        .values()
                        .any(|existing| existing.depends_on == Some(parent))
                    {
                        return Err(RepositoryError::Conflict(
                            TRANSACTION_PARENT_KEY.to_string(),
                        ));
                    }
                }
                if !self.merchants.contains_key(&tx.merchant_id) {
                    return Err(RepositoryError::Conflict(
                        TRANSACTION_MERCHANT_FKEY.to_string(),
                    ));
                }
                self.transactions.insert(tx.id, tx.clone());
                Ok(Entity::Transaction(tx))
            }
            Entity::Merchant(m) => {
                if self.merchants.contains_key(&m.id) {
                    return Err(RepositoryError::Conflict("merchants_pkey".to_string()));
                }
                if self.merchants.values().any(|existing| existing.name == m.name) {
                    return Err(RepositoryError::Conflict(MERCHANT_NAME_KEY.to_string()));
                }
                if self.merchants.values().any(|existing| existing.email == m.email) {
                    return Err(RepositoryError::Conflict(MERCHANT_EMAIL_KEY.to_string()));
                }
                self.merchants.insert(m.id, m.clone());
                Ok(Entity::Merchant(m))
            }
        }
    }

    fn get(&self, kind: EntityKind, id: Uuid) -> RepositoryResult<Entity> {
        let found = match kind {
            EntityKind::Transaction => self.transactions.get(&id).cloned().map(Entity::from),
            EntityKind::Merchant => self.merchants.get(&id).cloned().map(Entity::from),
        };
        found.ok_or_else(|| Self::not_found(kind, id))
    }

    fn save(&mut self, entity: &Entity) -> RepositoryResult<()> {
        match entity {
            Entity::Transaction(tx) => match self.transactions.get_mut(&tx.id) {
                Some(slot) => *slot = tx.clone(),
                None => return Err(Self::not_found(EntityKind::Transaction, tx.id)),
            },
            Entity::Merchant(m) => match self.merchants.get_mut(&m.id) {
                Some(slot) => *slot = m.clone(),
                None => return Err(Self::not_found(EntityKind::Merchant, m.id)),
            },
        }
        Ok(())
    }

    fn matching(&self, kind: EntityKind, filters: &[Filter]) -> RepositoryResult<Vec<Entity>> {
        Filter::check_all(kind, filters)?;
        let entities: Vec<Entity> = match kind {
            EntityKind::Transaction => self.transactions.values().cloned().map(Entity::from).collect(),
            EntityKind::Merchant => self.merchants.values().cloned().map(Entity::from).collect(),
        };
        let mut matched: Vec<Entity> = entities
            .into_iter()
            .filter(|entity| filters.iter().all(|f| f.matches(entity)))
            .collect();
        matched.sort_by_key(|entity| match entity {
            Entity::Transaction(tx) => (tx.created_at, tx.id),
            Entity::Merchant(m) => (m.created_at, m.id),
        });
        Ok(matched)
    }

    fn delete(&mut self, kind: EntityKind, filters: &[Filter]) -> RepositoryResult<u64> {
        let doomed: Vec<Uuid> = self
            .matching(kind, filters)?
            .iter()
            .map(Entity::id)
            .collect();
        for id in &doomed {
            match kind {
                EntityKind::Transaction => {
                    self.transactions.remove(id);
                }
                EntityKind::Merchant => {
                    if self.transactions.values().any(|tx| tx.merchant_id == *id) {
                        return Err(RepositoryError::Conflict(
                            TRANSACTION_MERCHANT_FKEY.to_string(),
                        ));
                    }
                    self.merchants.remove(id);
                }
            }
        }
        Ok(doomed.len() as u64)
    }
}

/// Process-local storage with the same contract as the Postgres backend.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<MemoryState>>,
    fail_on_save: Arc<RwLock<Option<EntityKind>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `save` of `kind` fail until reset with `None`.
    pub async fn set_fail_on_save(&self, kind: Option<EntityKind>) {
        *self.fail_on_save.write().await = kind;
    }

    async fn check_save(fail_on_save: &RwLock<Option<EntityKind>>, entity: &Entity) -> RepositoryResult<()> {
        if *fail_on_save.read().await == Some(entity.kind()) {
            return Err(RepositoryError::Corrupt(format!(
                "injected save failure for {} {}",
                entity.kind(),
                entity.id()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn create(&self, entity: Entity) -> RepositoryResult<Entity> {
        self.state.lock().await.create(entity)
    }

    async fn get(&self, kind: EntityKind, id: Uuid) -> RepositoryResult<Entity> {
        self.state.lock().await.get(kind, id)
    }

    async fn get_by(&self, kind: EntityKind, filters: &[Filter]) -> RepositoryResult<Entity> {
        first_match(self.state.lock().await.matching(kind, filters)?, kind, filters)
    }

    async fn save(&self, entity: &Entity) -> RepositoryResult<()> {
        Self::check_save(&self.fail_on_save, entity).await?;
        self.state.lock().await.save(entity)
    }

    async fn count(&self, kind: EntityKind, filters: &[Filter]) -> RepositoryResult<u64> {
        Ok(self.state.lock().await.matching(kind, filters)?.len() as u64)
    }

    async fn delete(&self, kind: EntityKind, filters: &[Filter]) -> RepositoryResult<u64> {
        let mut state = self.state.lock().await;
        // Work on a copy so a failing delete removes nothing.
        let mut staged = (*state).clone();
        let deleted = staged.delete(kind, filters)?;
        *state = staged;
        Ok(deleted)
    }

    async fn list(&self, kind: EntityKind, filters: &[Filter]) -> RepositoryResult<Vec<Entity>> {
        self.state.lock().await.matching(kind, filters)
    }
}

#[async_trait]
impl TransactionalStorage for MemoryStorage {
    async fn transaction(&self) -> RepositoryResult<Box<dyn StorageTransaction>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = (*guard).clone();
        Ok(Box::new(MemoryTransaction {
            inner: Mutex::new(Some(Staged { guard, staged })),
            fail_on_save: Arc::clone(&self.fail_on_save),
        }))
    }
}

struct Staged {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

/// Scoped handle over a staged copy of the store.
pub struct MemoryTransaction {
    inner: Mutex<Option<Staged>>,
    fail_on_save: Arc<RwLock<Option<EntityKind>>>,
}

impl MemoryTransaction {
    async fn with_staged<T>(
        &self,
        op: impl FnOnce(&mut MemoryState) -> RepositoryResult<T>,
    ) -> RepositoryResult<T> {
        let mut inner = self.inner.lock().await;
        let staged = inner.as_mut().ok_or(RepositoryError::TransactionFinished)?;
        op(&mut staged.staged)
    }
}

#[async_trait]
impl Storage for MemoryTransaction {
    async fn create(&self, entity: Entity) -> RepositoryResult<Entity> {
        self.with_staged(|state| state.create(entity)).await
    }

    async fn get(&self, kind: EntityKind, id: Uuid) -> RepositoryResult<Entity> {
        self.with_staged(|state| state.get(kind, id)).await
    }

    async fn get_by(&self, kind: EntityKind, filters: &[Filter]) -> RepositoryResult<Entity> {
        let matched = self.with_staged(|state| state.matching(kind, filters)).await?;
        first_match(matched, kind, filters)
    }

    async fn save(&self, entity: &Entity) -> RepositoryResult<()> {
        MemoryStorage::check_save(&self.fail_on_save, entity).await?;
        self.with_staged(|state| state.save(entity)).await
    }

    async fn count(&self, kind: EntityKind, filters: &[Filter]) -> RepositoryResult<u64> {
        let matched = self.with_staged(|state| state.matching(kind, filters)).await?;
        Ok(matched.len() as u64)
    }

    async fn delete(&self, kind: EntityKind, filters: &[Filter]) -> RepositoryResult<u64> {
        self.with_staged(|state| {
            let mut copy = state.clone();
            let deleted = copy.delete(kind, filters)?;
            *state = copy;
            Ok(deleted)
        })
        .await
    }

    async fn list(&self, kind: EntityKind, filters: &[Filter]) -> RepositoryResult<Vec<Entity>> {
        self.with_staged(|state| state.matching(kind, filters)).await
    }
}

#[async_trait]
impl StorageTransaction for MemoryTransaction {
    async fn commit(&self) -> RepositoryResult<()> {
        let Staged { mut guard, staged } = self
            .inner
            .lock()
            .await
            .take()
            .ok_or(RepositoryError::TransactionFinished)?;
        *guard = staged;
        Ok(())
    }

    async fn rollback(&self) -> RepositoryResult<()> {
        self.inner
            .lock()
            .await
            .take()
            .map(|_| ())
            .ok_or(RepositoryError::TransactionFinished)
    }
}

fn first_match(matched: Vec<Entity>, kind: EntityKind, filters: &[Filter]) -> RepositoryResult<Entity> {
    matched.into_iter().next().ok_or_else(|| RepositoryError::NotFound {
        kind,
        id: filters
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" and "),
    })
}
