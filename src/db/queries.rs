use sqlx::{PgConnection, Postgres, QueryBuilder, Result};
use uuid::Uuid;

use crate::db::models::{MerchantRow, TransactionRow};
use crate::domain::EntityKind;
use crate::ports::Filter;

const TRANSACTION_COLUMNS: &str = "id, kind, amount, customer_email, customer_phone, status, \
     merchant_id, depends_on, created_at, updated_at";

const MERCHANT_COLUMNS: &str =
    "id, name, description, email, active, total_transaction_sum, created_at, updated_at";

fn table(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Transaction => "transactions",
        EntityKind::Merchant => "merchants",
    }
}

fn columns(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Transaction => TRANSACTION_COLUMNS,
        EntityKind::Merchant => MERCHANT_COLUMNS,
    }
}

fn lock_clause(lock: bool) -> &'static str {
    if lock {
        " FOR UPDATE"
    } else {
        ""
    }
}

/// Appends `WHERE a AND b ...` for the given filters. Callers check applicability first.
fn push_filters(builder: &mut QueryBuilder<'static, Postgres>, filters: &[Filter]) {
    for (i, filter) in filters.iter().enumerate() {
        builder.push(if i == 0 { " WHERE " } else { " AND " });
        match filter {
            Filter::DependsOn(id) => builder.push("depends_on = ").push_bind(*id),
            Filter::MerchantId(id) => builder.push("merchant_id = ").push_bind(*id),
            Filter::Kind(kind) => builder.push("kind = ").push_bind(kind.as_str()),
            Filter::Status(status) => builder.push("status = ").push_bind(status.as_str()),
            Filter::CreatedBefore(cutoff) => builder.push("created_at < ").push_bind(*cutoff),
            Filter::Name(name) => builder.push("name = ").push_bind(name.clone()),
            Filter::Email(email) => builder.push("email = ").push_bind(email.clone()),
            Filter::Active(active) => builder.push("active = ").push_bind(*active),
        };
    }
}

fn select_builder(
    kind: EntityKind,
    filters: &[Filter],
    limit: Option<i64>,
    lock: bool,
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!("SELECT {} FROM {}", columns(kind), table(kind)));
    push_filters(&mut builder, filters);
    builder.push(" ORDER BY created_at, id");
    if let Some(limit) = limit {
        builder.push(" LIMIT ").push_bind(limit);
    }
    builder.push(lock_clause(lock));
    builder
}

// --- Transaction Queries ---

pub async fn insert_transaction(conn: &mut PgConnection, row: &TransactionRow) -> Result<TransactionRow> {
    let sql = format!(
        r#"
        INSERT INTO transactions (
            id, kind, amount, customer_email, customer_phone,
            status, merchant_id, depends_on, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING {}
        "#,
        TRANSACTION_COLUMNS
    );

    sqlx::query_as::<_, TransactionRow>(&sql)
        .bind(row.id)
        .bind(&row.kind)
        .bind(row.amount)
        .bind(&row.customer_email)
        .bind(&row.customer_phone)
        .bind(&row.status)
        .bind(row.merchant_id)
        .bind(row.depends_on)
        .bind(row.created_at)
        .bind(row.updated_at)
        .fetch_one(&mut *conn)
        .await
}

pub async fn get_transaction(
    conn: &mut PgConnection,
    id: Uuid,
    lock: bool,
) -> Result<Option<TransactionRow>> {
    let sql = format!(
        "SELECT {} FROM transactions WHERE id = $1{}",
        TRANSACTION_COLUMNS,
        lock_clause(lock)
    );

    sqlx::query_as::<_, TransactionRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
}

/// Updates the mutable columns of a transaction. `kind` and `created_at` never change.
pub async fn update_transaction(conn: &mut PgConnection, row: &TransactionRow) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE transactions
        SET amount = $2, customer_email = $3, customer_phone = $4, status = $5,
            merchant_id = $6, depends_on = $7, updated_at = $8
        WHERE id = $1
        "#,
    )
    .bind(row.id)
    .bind(row.amount)
    .bind(&row.customer_email)
    .bind(&row.customer_phone)
    .bind(&row.status)
    .bind(row.merchant_id)
    .bind(row.depends_on)
    .bind(row.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

pub async fn select_transactions(
    conn: &mut PgConnection,
    filters: &[Filter],
    limit: Option<i64>,
    lock: bool,
) -> Result<Vec<TransactionRow>> {
    let mut builder = select_builder(EntityKind::Transaction, filters, limit, lock);
    builder
        .build_query_as::<TransactionRow>()
        .fetch_all(&mut *conn)
        .await
}

// --- Merchant Queries ---

pub async fn insert_merchant(conn: &mut PgConnection, row: &MerchantRow) -> Result<MerchantRow> {
    let sql = format!(
        r#"
        INSERT INTO merchants (
            id, name, description, email, active, total_transaction_sum, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {}
        "#,
        MERCHANT_COLUMNS
    );

    sqlx::query_as::<_, MerchantRow>(&sql)
        .bind(row.id)
        .bind(&row.name)
        .bind(&row.description)
        .bind(&row.email)
        .bind(row.active)
        .bind(row.total_transaction_sum)
        .bind(row.created_at)
        .bind(row.updated_at)
        .fetch_one(&mut *conn)
        .await
}

pub async fn get_merchant(conn: &mut PgConnection, id: Uuid, lock: bool) -> Result<Option<MerchantRow>> {
    let sql = format!(
        "SELECT {} FROM merchants WHERE id = $1{}",
        MERCHANT_COLUMNS,
        lock_clause(lock)
    );

    sqlx::query_as::<_, MerchantRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
}

pub async fn update_merchant(conn: &mut PgConnection, row: &MerchantRow) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE merchants
        SET name = $2, description = $3, email = $4, active = $5,
            total_transaction_sum = $6, updated_at = $7
        WHERE id = $1
        "#,
    )
    .bind(row.id)
    .bind(&row.name)
    .bind(&row.description)
    .bind(&row.email)
    .bind(row.active)
    .bind(row.total_transaction_sum)
    .bind(row.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

pub async fn select_merchants(
    conn: &mut PgConnection,
    filters: &[Filter],
    limit: Option<i64>,
    lock: bool,
) -> Result<Vec<MerchantRow>> {
    let mut builder = select_builder(EntityKind::Merchant, filters, limit, lock);
    builder
        .build_query_as::<MerchantRow>()
        .fetch_all(&mut *conn)
        .await
}

// --- Shared Queries ---

pub async fn count(conn: &mut PgConnection, kind: EntityKind, filters: &[Filter]) -> Result<i64> {
    let mut builder = QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", table(kind)));
    push_filters(&mut builder, filters);

    builder
        .build_query_scalar::<i64>()
        .fetch_one(&mut *conn)
        .await
}

/// One `DELETE` statement, so a sweep is applied entirely or not at all.
pub async fn delete(conn: &mut PgConnection, kind: EntityKind, filters: &[Filter]) -> Result<u64> {
    let mut builder = QueryBuilder::new(format!("DELETE FROM {}", table(kind)));
    push_filters(&mut builder, filters);

    let result = builder.build().execute(&mut *conn).await?;
    Ok(result.rows_affected())
}
