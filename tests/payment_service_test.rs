use std::sync::Arc;

use async_trait::async_trait;
use payment_ledger::adapters::MemoryStorage;
use payment_ledger::domain::{
    Entity, EntityKind, Merchant, NewMerchant, NewTransaction, Transaction, TransactionKind,
    TransactionStatus,
};
use payment_ledger::ports::{
    Filter, RepositoryResult, Storage, StorageTransaction, TransactionalStorage,
};
use payment_ledger::services::{MerchantService, PaymentService};
use payment_ledger::PaymentError;
use uuid::Uuid;

struct Ledger {
    storage: Arc<MemoryStorage>,
    payments: PaymentService,
    merchants: MerchantService,
}

impl Ledger {
    fn new() -> Self {
        let storage = Arc::new(MemoryStorage::new());
        let merchants = MerchantService::new(storage.clone());
        let payments = PaymentService::new(storage.clone(), Arc::new(merchants.clone()));
        Self {
            storage,
            payments,
            merchants,
        }
    }

    async fn merchant(&self, active: bool) -> Merchant {
        self.merchants
            .create(NewMerchant {
                name: format!("merchant-{}", Uuid::new_v4()),
                description: String::new(),
                email: format!("{}@merchant.com", Uuid::new_v4().simple()),
                active,
            })
            .await
            .unwrap()
    }

    async fn balance(&self, merchant_id: Uuid) -> i64 {
        self.merchants
            .get(merchant_id)
            .await
            .unwrap()
            .total_transaction_sum
    }

    async fn status(&self, id: Uuid) -> TransactionStatus {
        self.payments.get(id).await.unwrap().status
    }

    async fn count(&self, filters: &[Filter]) -> u64 {
        self.storage
            .count(EntityKind::Transaction, filters)
            .await
            .unwrap()
    }

    /// Stores a transaction as-is, bypassing the payment flow.
    async fn seed(&self, tx: Transaction) -> Transaction {
        self.storage
            .create(Entity::from(tx))
            .await
            .unwrap()
            .into_transaction()
            .unwrap()
    }
}

fn input(
    kind: TransactionKind,
    amount: i64,
    merchant_id: Uuid,
    depends_on: Option<Uuid>,
) -> NewTransaction {
    NewTransaction {
        kind,
        amount,
        customer_email: "user@customer.com".to_string(),
        customer_phone: "000000000".to_string(),
        merchant_id,
        depends_on,
        status: None,
    }
}

fn authorize(amount: i64, merchant_id: Uuid) -> NewTransaction {
    input(TransactionKind::Authorize, amount, merchant_id, None)
}

fn charge(amount: i64, merchant_id: Uuid, parent: Uuid) -> NewTransaction {
    input(TransactionKind::Charge, amount, merchant_id, Some(parent))
}

fn refund(amount: i64, merchant_id: Uuid, parent: Uuid) -> NewTransaction {
    input(TransactionKind::Refund, amount, merchant_id, Some(parent))
}

fn reversal(merchant_id: Uuid, parent: Uuid) -> NewTransaction {
    input(TransactionKind::Reversal, 0, merchant_id, Some(parent))
}

#[tokio::test]
async fn test_authorize_is_approved_without_parent() {
    let ledger = Ledger::new();
    let m = ledger.merchant(true).await;

    let tx = ledger.payments.create(authorize(10, m.id)).await.unwrap();

    assert_eq!(tx.kind, TransactionKind::Authorize);
    assert_eq!(tx.status, TransactionStatus::Approved);
    assert_eq!(tx.depends_on, None);
    assert!(!tx.id.is_nil());
    assert_eq!(ledger.balance(m.id).await, 0);
}

#[tokio::test]
async fn test_validation_runs_before_any_lookup() {
    let ledger = Ledger::new();

    // Unknown merchant would be a 404 if storage were consulted first.
    let err = ledger
        .payments
        .create(input(TransactionKind::Charge, 10, Uuid::new_v4(), None))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 400);
    assert_eq!(
        err.to_string(),
        "Validation error: charge must depend on a parent transaction"
    );
}

#[tokio::test]
async fn test_unknown_and_inactive_merchants_are_rejected() {
    let ledger = Ledger::new();

    let unknown = Uuid::new_v4();
    let err = ledger.payments.create(authorize(10, unknown)).await.unwrap_err();
    assert!(matches!(err, PaymentError::NotFound { entity: "merchant", id } if id == unknown));

    let inactive = ledger.merchant(false).await;
    let err = ledger
        .payments
        .create(authorize(10, inactive.id))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 412);
    assert!(err.to_string().contains("merchant inactive"));
    assert_eq!(ledger.count(&[]).await, 0);
}

#[tokio::test]
async fn test_charge_adds_to_merchant_balance() {
    let ledger = Ledger::new();
    let m = ledger.merchant(true).await;
    let auth = ledger.payments.create(authorize(10, m.id)).await.unwrap();

    let ch = ledger
        .payments
        .create(charge(10, m.id, auth.id))
        .await
        .unwrap();

    assert_eq!(ch.status, TransactionStatus::Approved);
    assert_eq!(ch.depends_on, Some(auth.id));
    assert_eq!(ledger.balance(m.id).await, 10);
    assert_eq!(ledger.status(auth.id).await, TransactionStatus::Approved);
}

#[tokio::test]
async fn test_second_charge_on_same_authorize_conflicts() {
    let ledger = Ledger::new();
    let m = ledger.merchant(true).await;
    let auth = ledger.payments.create(authorize(10, m.id)).await.unwrap();
    ledger
        .payments
        .create(charge(10, m.id, auth.id))
        .await
        .unwrap();

    let err = ledger
        .payments
        .create(charge(10, m.id, auth.id))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 409);
    assert_eq!(err.to_string(), "Conflict: parent transaction already followed");
    assert_eq!(ledger.balance(m.id).await, 10);
    assert_eq!(ledger.count(&[Filter::DependsOn(auth.id)]).await, 1);
}

#[tokio::test]
async fn test_concurrent_charges_apply_once() {
    let ledger = Ledger::new();
    let m = ledger.merchant(true).await;
    let auth = ledger.payments.create(authorize(25, m.id)).await.unwrap();

    let (first, second) = tokio::join!(
        ledger.payments.create(charge(25, m.id, auth.id)),
        ledger.payments.create(charge(25, m.id, auth.id)),
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(PaymentError::Conflict(_)))));
    assert_eq!(ledger.balance(m.id).await, 25);
}

/// Reports zero children for every parent, so only the store's own
/// one-child-per-parent rule can stop a second child.
struct ChildCountBlind(Arc<MemoryStorage>);

#[async_trait]
impl Storage for ChildCountBlind {
    async fn create(&self, entity: Entity) -> RepositoryResult<Entity> {
        self.0.create(entity).await
    }

    async fn get(&self, kind: EntityKind, id: Uuid) -> RepositoryResult<Entity> {
        self.0.get(kind, id).await
    }

    async fn get_by(&self, kind: EntityKind, filters: &[Filter]) -> RepositoryResult<Entity> {
        self.0.get_by(kind, filters).await
    }

    async fn save(&self, entity: &Entity) -> RepositoryResult<()> {
        self.0.save(entity).await
    }

    async fn count(&self, _kind: EntityKind, _filters: &[Filter]) -> RepositoryResult<u64> {
        Ok(0)
    }

    async fn delete(&self, kind: EntityKind, filters: &[Filter]) -> RepositoryResult<u64> {
        self.0.delete(kind, filters).await
    }

    async fn list(&self, kind: EntityKind, filters: &[Filter]) -> RepositoryResult<Vec<Entity>> {
        self.0.list(kind, filters).await
    }
}

#[async_trait]
impl TransactionalStorage for ChildCountBlind {
    async fn transaction(&self) -> RepositoryResult<Box<dyn StorageTransaction>> {
        self.0.transaction().await
    }
}

#[tokio::test]
async fn test_store_rejects_second_child_when_count_misses_it() {
    let ledger = Ledger::new();
    let payments = PaymentService::new(
        Arc::new(ChildCountBlind(ledger.storage.clone())),
        Arc::new(ledger.merchants.clone()),
    );
    let m = ledger.merchant(true).await;
    let auth = payments.create(authorize(10, m.id)).await.unwrap();
    payments.create(charge(10, m.id, auth.id)).await.unwrap();

    let err = payments
        .create(charge(10, m.id, auth.id))
        .await
        .unwrap_err();

    assert!(matches!(err, PaymentError::Conflict(ref msg) if msg == "parent transaction already followed"));
    assert_eq!(ledger.balance(m.id).await, 10);
    assert_eq!(ledger.status(auth.id).await, TransactionStatus::Approved);
    assert_eq!(ledger.count(&[Filter::DependsOn(auth.id)]).await, 1);
}

#[tokio::test]
async fn test_refund_restores_balance_and_marks_charge() {
    let ledger = Ledger::new();
    let m = ledger.merchant(true).await;
    let auth = ledger.payments.create(authorize(10, m.id)).await.unwrap();
    let ch = ledger
        .payments
        .create(charge(10, m.id, auth.id))
        .await
        .unwrap();

    let rf = ledger
        .payments
        .create(refund(10, m.id, ch.id))
        .await
        .unwrap();

    assert_eq!(rf.status, TransactionStatus::Approved);
    assert_eq!(ledger.balance(m.id).await, 0);
    assert_eq!(ledger.status(ch.id).await, TransactionStatus::Refunded);

    let err = ledger
        .payments
        .create(refund(10, m.id, ch.id))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::Conflict(_)));
    assert_eq!(ledger.balance(m.id).await, 0);
}

#[tokio::test]
async fn test_reversal_marks_authorize_reversed() {
    let ledger = Ledger::new();
    let m = ledger.merchant(true).await;
    let auth = ledger.payments.create(authorize(10, m.id)).await.unwrap();

    let rv = ledger.payments.create(reversal(m.id, auth.id)).await.unwrap();

    assert_eq!(rv.status, TransactionStatus::Approved);
    assert_eq!(rv.amount, 0);
    assert_eq!(ledger.status(auth.id).await, TransactionStatus::Reversed);
    assert_eq!(ledger.balance(m.id).await, 0);
}

#[tokio::test]
async fn test_wrong_parent_kind_is_rejected_without_writes() {
    let ledger = Ledger::new();
    let m = ledger.merchant(true).await;
    let auth = ledger.payments.create(authorize(10, m.id)).await.unwrap();
    let ch = ledger
        .payments
        .create(charge(10, m.id, auth.id))
        .await
        .unwrap();
    let before = ledger.merchants.get(m.id).await.unwrap();

    let err = ledger
        .payments
        .create(charge(10, m.id, ch.id))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 412);
    assert_eq!(
        err.to_string(),
        "Precondition failed: parent transaction should be of type authorize"
    );
    assert_eq!(ledger.merchants.get(m.id).await.unwrap(), before);
    assert_eq!(ledger.count(&[]).await, 2);

    let err = ledger
        .payments
        .create(reversal(m.id, ch.id))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("should be of type authorize"));

    let fresh = ledger.payments.create(authorize(10, m.id)).await.unwrap();
    let err = ledger
        .payments
        .create(refund(10, m.id, fresh.id))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("should be of type charge"));
    assert_eq!(ledger.status(fresh.id).await, TransactionStatus::Approved);
}

#[tokio::test]
async fn test_missing_parent_is_not_found() {
    let ledger = Ledger::new();
    let m = ledger.merchant(true).await;
    let missing = Uuid::new_v4();

    let err = ledger
        .payments
        .create(charge(10, m.id, missing))
        .await
        .unwrap_err();

    assert!(
        matches!(err, PaymentError::NotFound { entity: "parent transaction", id } if id == missing)
    );
}

#[tokio::test]
async fn test_reversal_on_unapproved_authorize_is_errored() {
    let ledger = Ledger::new();
    let m = ledger.merchant(true).await;
    let mut auth = Transaction::from_input(authorize(10, m.id));
    auth.status = TransactionStatus::Errored;
    let auth = ledger.seed(auth).await;

    let rv = ledger.payments.create(reversal(m.id, auth.id)).await.unwrap();

    assert_eq!(rv.status, TransactionStatus::Errored);
    assert_eq!(ledger.status(auth.id).await, TransactionStatus::Errored);
    assert_eq!(ledger.balance(m.id).await, 0);
}

#[tokio::test]
async fn test_charge_on_reversed_authorize_is_errored() {
    let ledger = Ledger::new();
    let m = ledger.merchant(true).await;
    let mut auth = Transaction::from_input(authorize(10, m.id));
    auth.status = TransactionStatus::Reversed;
    let auth = ledger.seed(auth).await;

    let ch = ledger
        .payments
        .create(charge(10, m.id, auth.id))
        .await
        .unwrap();

    assert_eq!(ch.status, TransactionStatus::Errored);
    assert_eq!(ledger.balance(m.id).await, 0);
}

#[tokio::test]
async fn test_refund_on_errored_charge_is_errored() {
    let ledger = Ledger::new();
    let m = ledger.merchant(true).await;
    let auth = ledger.seed(Transaction::from_input(authorize(10, m.id))).await;
    let mut ch = Transaction::from_input(charge(10, m.id, auth.id));
    ch.status = TransactionStatus::Errored;
    let ch = ledger.seed(ch).await;

    let rf = ledger
        .payments
        .create(refund(10, m.id, ch.id))
        .await
        .unwrap();

    assert_eq!(rf.status, TransactionStatus::Errored);
    assert_eq!(ledger.status(ch.id).await, TransactionStatus::Errored);
    assert_eq!(ledger.balance(m.id).await, 0);
}

#[tokio::test]
async fn test_failed_merchant_save_rolls_back_charge() {
    let ledger = Ledger::new();
    let m = ledger.merchant(true).await;
    let auth = ledger.payments.create(authorize(10, m.id)).await.unwrap();

    ledger.storage.set_fail_on_save(Some(EntityKind::Merchant)).await;
    let err = ledger
        .payments
        .create(charge(10, m.id, auth.id))
        .await
        .unwrap_err();
    ledger.storage.set_fail_on_save(None).await;

    assert!(matches!(
        err,
        PaymentError::Storage {
            operation: "save",
            entity: EntityKind::Merchant,
            ..
        }
    ));
    assert_eq!(ledger.count(&[Filter::DependsOn(auth.id)]).await, 0);
    assert_eq!(ledger.balance(m.id).await, 0);

    // Nothing was left behind, so the charge can be retried.
    ledger
        .payments
        .create(charge(10, m.id, auth.id))
        .await
        .unwrap();
    assert_eq!(ledger.balance(m.id).await, 10);
}

#[tokio::test]
async fn test_failed_merchant_save_keeps_charge_approved_on_refund() {
    let ledger = Ledger::new();
    let m = ledger.merchant(true).await;
    let auth = ledger.payments.create(authorize(10, m.id)).await.unwrap();
    let ch = ledger
        .payments
        .create(charge(10, m.id, auth.id))
        .await
        .unwrap();

    ledger.storage.set_fail_on_save(Some(EntityKind::Merchant)).await;
    let err = ledger.payments.create(refund(10, m.id, ch.id)).await;
    ledger.storage.set_fail_on_save(None).await;

    assert!(err.is_err());
    assert_eq!(ledger.status(ch.id).await, TransactionStatus::Approved);
    assert_eq!(ledger.balance(m.id).await, 10);
    assert_eq!(ledger.count(&[Filter::DependsOn(ch.id)]).await, 0);
}

#[tokio::test]
async fn test_amount_survives_storage_round_trip() {
    let ledger = Ledger::new();
    let m = ledger.merchant(true).await;

    let created = ledger
        .payments
        .create(authorize(1_234_567, m.id))
        .await
        .unwrap();
    let fetched = ledger.payments.get(created.id).await.unwrap();

    assert_eq!(fetched.amount, 1_234_567);
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn test_list_filters_by_merchant_and_kind() {
    let ledger = Ledger::new();
    let first = ledger.merchant(true).await;
    let second = ledger.merchant(true).await;

    let auth = ledger.payments.create(authorize(10, first.id)).await.unwrap();
    ledger
        .payments
        .create(charge(10, first.id, auth.id))
        .await
        .unwrap();
    ledger
        .payments
        .create(authorize(5, second.id))
        .await
        .unwrap();

    let of_first = ledger
        .payments
        .list(&[Filter::MerchantId(first.id)])
        .await
        .unwrap();
    assert_eq!(of_first.len(), 2);

    let charges = ledger
        .payments
        .list(&[Filter::Kind(TransactionKind::Charge)])
        .await
        .unwrap();
    assert_eq!(charges.len(), 1);
    assert_eq!(charges[0].merchant_id, first.id);

    let err = ledger
        .payments
        .list(&[Filter::Active(true)])
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn test_get_unknown_transaction() {
    let ledger = Ledger::new();
    let err = ledger.payments.get(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, PaymentError::NotFound { entity: "transaction", .. }));
}
