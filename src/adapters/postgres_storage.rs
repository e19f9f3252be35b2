//! Postgres implementation of the storage ports.

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Postgres};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::models::{MerchantRow, TransactionRow};
use crate::db::queries;
use crate::domain::{Entity, EntityKind};
use crate::ports::{
    Filter, RepositoryError, RepositoryResult, Storage, StorageTransaction, TransactionalStorage,
};

/// Unique and foreign key violations are conflicts named after the constraint.
fn map_db_error(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() || db.is_foreign_key_violation() {
            let constraint = db.constraint().unwrap_or("unknown constraint").to_string();
            return RepositoryError::Conflict(constraint);
        }
    }
    RepositoryError::from(err)
}

async fn create_in(conn: &mut PgConnection, entity: Entity) -> RepositoryResult<Entity> {
    match entity {
        Entity::Transaction(tx) => {
            let row = queries::insert_transaction(conn, &TransactionRow::from_domain(&tx))
                .await
                .map_err(map_db_error)?;
            Ok(Entity::Transaction(row.into_domain()?))
        }
        Entity::Merchant(m) => {
            let row = queries::insert_merchant(conn, &MerchantRow::from_domain(&m))
                .await
                .map_err(map_db_error)?;
            Ok(Entity::Merchant(row.into_domain()))
        }
    }
}

async fn get_in(
    conn: &mut PgConnection,
    kind: EntityKind,
    id: Uuid,
    lock: bool,
) -> RepositoryResult<Entity> {
    let found = match kind {
        EntityKind::Transaction => queries::get_transaction(conn, id, lock)
            .await?
            .map(TransactionRow::into_domain)
            .transpose()?
            .map(Entity::from),
        EntityKind::Merchant => queries::get_merchant(conn, id, lock)
            .await?
            .map(|row| Entity::from(row.into_domain())),
    };

    found.ok_or_else(|| RepositoryError::NotFound {
        kind,
        id: id.to_string(),
    })
}

async fn list_in(
    conn: &mut PgConnection,
    kind: EntityKind,
    filters: &[Filter],
    limit: Option<i64>,
    lock: bool,
) -> RepositoryResult<Vec<Entity>> {
    Filter::check_all(kind, filters)?;
    match kind {
        EntityKind::Transaction => queries::select_transactions(conn, filters, limit, lock)
            .await?
            .into_iter()
            .map(|row| row.into_domain().map(Entity::from))
            .collect(),
        EntityKind::Merchant => Ok(queries::select_merchants(conn, filters, limit, lock)
            .await?
            .into_iter()
            .map(|row| Entity::from(row.into_domain()))
            .collect()),
    }
}

async fn get_by_in(
    conn: &mut PgConnection,
    kind: EntityKind,
    filters: &[Filter],
    lock: bool,
) -> RepositoryResult<Entity> {
    list_in(conn, kind, filters, Some(1), lock)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| RepositoryError::NotFound {
            kind,
            id: filters
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" and "),
        })
}

async fn save_in(conn: &mut PgConnection, entity: &Entity) -> RepositoryResult<()> {
    let updated = match entity {
        Entity::Transaction(tx) => {
            queries::update_transaction(conn, &TransactionRow::from_domain(tx)).await
        }
        Entity::Merchant(m) => queries::update_merchant(conn, &MerchantRow::from_domain(m)).await,
    }
    .map_err(map_db_error)?;

    if updated == 0 {
        return Err(RepositoryError::NotFound {
            kind: entity.kind(),
            id: entity.id().to_string(),
        });
    }
    Ok(())
}

async fn count_in(
    conn: &mut PgConnection,
    kind: EntityKind,
    filters: &[Filter],
) -> RepositoryResult<u64> {
    Filter::check_all(kind, filters)?;
    let count = queries::count(conn, kind, filters).await?;
    Ok(u64::try_from(count).unwrap_or_default())
}

async fn delete_in(
    conn: &mut PgConnection,
    kind: EntityKind,
    filters: &[Filter],
) -> RepositoryResult<u64> {
    Filter::check_all(kind, filters)?;
    queries::delete(conn, kind, filters)
        .await
        .map_err(map_db_error)
}

/// Postgres-backed storage over a connection pool.
#[derive(Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn create(&self, entity: Entity) -> RepositoryResult<Entity> {
        let mut conn = self.pool.acquire().await?;
        create_in(&mut *conn, entity).await
    }

    async fn get(&self, kind: EntityKind, id: Uuid) -> RepositoryResult<Entity> {
        let mut conn = self.pool.acquire().await?;
        get_in(&mut *conn, kind, id, false).await
    }

    async fn get_by(&self, kind: EntityKind, filters: &[Filter]) -> RepositoryResult<Entity> {
        let mut conn = self.pool.acquire().await?;
        get_by_in(&mut *conn, kind, filters, false).await
    }

    async fn save(&self, entity: &Entity) -> RepositoryResult<()> {
        let mut conn = self.pool.acquire().await?;
        save_in(&mut *conn, entity).await
    }

    async fn count(&self, kind: EntityKind, filters: &[Filter]) -> RepositoryResult<u64> {
        let mut conn = self.pool.acquire().await?;
        count_in(&mut *conn, kind, filters).await
    }

    async fn delete(&self, kind: EntityKind, filters: &[Filter]) -> RepositoryResult<u64> {
        let mut conn = self.pool.acquire().await?;
        delete_in(&mut *conn, kind, filters).await
    }

    async fn list(&self, kind: EntityKind, filters: &[Filter]) -> RepositoryResult<Vec<Entity>> {
        let mut conn = self.pool.acquire().await?;
        list_in(&mut *conn, kind, filters, None, false).await
    }
}

#[async_trait]
impl TransactionalStorage for PostgresStorage {
    async fn transaction(&self) -> RepositoryResult<Box<dyn StorageTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransactionStorage {
            inner: Mutex::new(Some(tx)),
        }))
    }
}

/// An open database transaction. sqlx rolls it back when dropped unfinished.
pub struct PgTransactionStorage {
    inner: Mutex<Option<sqlx::Transaction<'static, Postgres>>>,
}

#[async_trait]
impl Storage for PgTransactionStorage {
    async fn create(&self, entity: Entity) -> RepositoryResult<Entity> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or(RepositoryError::TransactionFinished)?;
        create_in(&mut **tx, entity).await
    }

    async fn get(&self, kind: EntityKind, id: Uuid) -> RepositoryResult<Entity> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or(RepositoryError::TransactionFinished)?;
        get_in(&mut **tx, kind, id, true).await
    }

    async fn get_by(&self, kind: EntityKind, filters: &[Filter]) -> RepositoryResult<Entity> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or(RepositoryError::TransactionFinished)?;
        get_by_in(&mut **tx, kind, filters, true).await
    }

    async fn save(&self, entity: &Entity) -> RepositoryResult<()> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or(RepositoryError::TransactionFinished)?;
        save_in(&mut **tx, entity).await
    }

    async fn count(&self, kind: EntityKind, filters: &[Filter]) -> RepositoryResult<u64> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or(RepositoryError::TransactionFinished)?;
        count_in(&mut **tx, kind, filters).await
    }

    async fn delete(&self, kind: EntityKind, filters: &[Filter]) -> RepositoryResult<u64> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or(RepositoryError::TransactionFinished)?;
        delete_in(&mut **tx, kind, filters).await
    }

    async fn list(&self, kind: EntityKind, filters: &[Filter]) -> RepositoryResult<Vec<Entity>> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or(RepositoryError::TransactionFinished)?;
        list_in(&mut **tx, kind, filters, None, true).await
    }
}

#[async_trait]
impl StorageTransaction for PgTransactionStorage {
    async fn commit(&self) -> RepositoryResult<()> {
        let tx = self
            .inner
            .lock()
            .await
            .take()
            .ok_or(RepositoryError::TransactionFinished)?;
        tx.commit().await.map_err(map_db_error)
    }

    async fn rollback(&self) -> RepositoryResult<()> {
        let tx = self
            .inner
            .lock()
            .await
            .take()
            .ok_or(RepositoryError::TransactionFinished)?;
        tx.rollback().await?;
        Ok(())
    }
}
