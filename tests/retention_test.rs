use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use payment_ledger::adapters::MemoryStorage;
use payment_ledger::config::RetentionConfig;
use payment_ledger::domain::{
    Entity, EntityKind, Merchant, NewMerchant, NewTransaction, Transaction, TransactionKind,
};
use payment_ledger::ports::Storage;
use payment_ledger::services::RetentionSweeper;
use uuid::Uuid;

const HOUR: Duration = Duration::from_secs(3600);

async fn seed_merchant(storage: &MemoryStorage, age: chrono::Duration) -> Merchant {
    let mut merchant = Merchant::from_input(NewMerchant {
        name: "shop".to_string(),
        description: String::new(),
        email: "shop@mail.com".to_string(),
        active: true,
    });
    merchant.created_at = Utc::now() - age;
    storage.create(Entity::from(merchant.clone())).await.unwrap();
    merchant
}

async fn seed_transaction(
    storage: &MemoryStorage,
    merchant_id: Uuid,
    depends_on: Option<Uuid>,
    age: chrono::Duration,
) -> Transaction {
    let mut tx = Transaction::from_input(NewTransaction {
        kind: if depends_on.is_some() {
            TransactionKind::Charge
        } else {
            TransactionKind::Authorize
        },
        amount: 10,
        customer_email: "user@customer.com".to_string(),
        customer_phone: String::new(),
        merchant_id,
        depends_on,
        status: None,
    });
    tx.created_at = Utc::now() - age;
    tx.updated_at = tx.created_at;
    storage.create(Entity::from(tx.clone())).await.unwrap();
    tx
}

fn config(keep_for: Duration, interval: Duration) -> RetentionConfig {
    RetentionConfig {
        keep_transactions_for: keep_for,
        interval,
    }
}

#[tokio::test]
async fn test_sweep_removes_only_old_transactions() {
    let storage = Arc::new(MemoryStorage::new());
    let merchant = seed_merchant(&storage, chrono::Duration::days(30)).await;
    let old = seed_transaction(&storage, merchant.id, None, chrono::Duration::hours(2)).await;
    let young = seed_transaction(&storage, merchant.id, None, chrono::Duration::minutes(5)).await;

    let sweeper = RetentionSweeper::new(storage.clone(), &config(HOUR, HOUR));
    let deleted = sweeper.sweep_once().await.unwrap();

    assert_eq!(deleted, 1);
    assert!(storage
        .get(EntityKind::Transaction, old.id)
        .await
        .unwrap_err()
        .is_not_found());
    assert!(storage.get(EntityKind::Transaction, young.id).await.is_ok());
    assert!(storage.get(EntityKind::Merchant, merchant.id).await.is_ok());
}

#[tokio::test]
async fn test_child_survives_deleted_parent() {
    let storage = Arc::new(MemoryStorage::new());
    let merchant = seed_merchant(&storage, chrono::Duration::days(1)).await;
    let parent = seed_transaction(&storage, merchant.id, None, chrono::Duration::hours(3)).await;
    let child = seed_transaction(
        &storage,
        merchant.id,
        Some(parent.id),
        chrono::Duration::minutes(1),
    )
    .await;

    let sweeper = RetentionSweeper::new(storage.clone(), &config(HOUR, HOUR));
    assert_eq!(sweeper.sweep_once().await.unwrap(), 1);

    let survivor = storage
        .get(EntityKind::Transaction, child.id)
        .await
        .unwrap()
        .into_transaction()
        .unwrap();
    assert_eq!(survivor.depends_on, Some(parent.id));
}

#[tokio::test]
async fn test_sweeper_stopped_before_first_tick_deletes_nothing() {
    let storage = Arc::new(MemoryStorage::new());
    let merchant = seed_merchant(&storage, chrono::Duration::days(1)).await;
    seed_transaction(&storage, merchant.id, None, chrono::Duration::days(2)).await;

    let handle = RetentionSweeper::new(storage.clone(), &config(HOUR, HOUR)).spawn();
    handle.shutdown().await.unwrap();

    assert_eq!(
        storage.count(EntityKind::Transaction, &[]).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn test_spawned_sweeper_deletes_after_first_interval() {
    let storage = Arc::new(MemoryStorage::new());
    let merchant = seed_merchant(&storage, chrono::Duration::days(1)).await;
    seed_transaction(&storage, merchant.id, None, chrono::Duration::days(2)).await;

    let handle =
        RetentionSweeper::new(storage.clone(), &config(HOUR, Duration::from_millis(20))).spawn();

    let mut remaining = 1;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        remaining = storage.count(EntityKind::Transaction, &[]).await.unwrap();
        if remaining == 0 {
            break;
        }
    }
    handle.shutdown().await.unwrap();

    assert_eq!(remaining, 0);
    assert_eq!(storage.count(EntityKind::Merchant, &[]).await.unwrap(), 1);
}
