use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::{
    db_types::{NewReturnRequest, ReturnId, ReturnItem, ReturnRequest, ReturnStatus, ShippingLabel},
    traits::{ReturnTransition, StoreError},
};

/// Inserts the return request and its items, returning `false` in the second parameter if the return already exists.
/// The request is only inserted if its order exists; otherwise the result is [`StoreError::OrphanedReturn`]. Like the
/// order insert, this writes before it reads. Call it with a transaction as the connection to make it atomic.
pub async fn idempotent_insert(
    request: NewReturnRequest,
    conn: &mut SqliteConnection,
) -> Result<(ReturnRequest, bool), StoreError> {
    let return_id = request.return_id.clone();
    let order_id = request.order_id.clone();
    if let Some(record) = insert_return(request, conn).await? {
        debug!("🗃️ Return [{}] for order {} inserted with id {}", record.return_id, record.order_id, record.id);
        return Ok((record, true));
    }
    match fetch_return_by_return_id(&return_id, conn).await? {
        Some(existing) => Ok((existing, false)),
        None => Err(StoreError::OrphanedReturn(return_id, order_id)),
    }
}

async fn insert_return(
    request: NewReturnRequest,
    conn: &mut SqliteConnection,
) -> Result<Option<ReturnRequest>, StoreError> {
    if let Some((_, qty)) = request.items.iter().find(|(_, q)| *q <= 0) {
        return Err(StoreError::InvalidQuantity(*qty));
    }
    let record: Option<ReturnRequest> = sqlx::query_as(
        r#"
            INSERT INTO return_requests (
                return_id,
                order_id,
                customer_email,
                status,
                created_at,
                updated_at
            )
            SELECT $1, $2, $3, $4, $5, $5
            WHERE EXISTS (SELECT 1 FROM orders WHERE order_id = $2)
            ON CONFLICT (return_id) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(request.return_id.as_str())
    .bind(request.order_id.as_str())
    .bind(request.customer_email.trim().to_lowercase())
    .bind(request.status)
    .bind(request.created_at)
    .fetch_optional(&mut *conn)
    .await?;
    let Some(record) = record else {
        return Ok(None);
    };
    for (variant_id, quantity) in request.items {
        sqlx::query("INSERT INTO return_items (return_id, variant_id, quantity) VALUES ($1, $2, $3)")
            .bind(record.return_id.as_str())
            .bind(variant_id.as_str())
            .bind(quantity)
            .execute(&mut *conn)
            .await?;
    }
    Ok(Some(record))
}

pub async fn fetch_return_by_return_id(
    return_id: &ReturnId,
    conn: &mut SqliteConnection,
) -> Result<Option<ReturnRequest>, StoreError> {
    let request = sqlx::query_as("SELECT * FROM return_requests WHERE return_id = $1")
        .bind(return_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(request)
}

pub async fn fetch_return_by_label_payment_ref(
    payment_ref: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<ReturnRequest>, StoreError> {
    let request = sqlx::query_as(
        "SELECT * FROM return_requests WHERE label_payment_ref = $1 ORDER BY created_at DESC, id DESC LIMIT 1",
    )
    .bind(payment_ref)
    .fetch_optional(conn)
    .await?;
    Ok(request)
}

pub async fn fetch_return_by_refund_ref(
    refund_ref: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<ReturnRequest>, StoreError> {
    let request =
        sqlx::query_as("SELECT * FROM return_requests WHERE refund_ref = $1 ORDER BY created_at DESC, id DESC LIMIT 1")
            .bind(refund_ref)
            .fetch_optional(conn)
            .await?;
    Ok(request)
}

/// Fetches the newest return for the customer whose label is still waiting to be paid for, skipping returns that are
/// already bound to a different label payment.
pub async fn fetch_latest_label_pending_return_for_email(
    email: &str,
    payment_ref: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Option<ReturnRequest>, StoreError> {
    let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM return_requests WHERE customer_email = ");
    builder.push_bind(email.trim().to_lowercase());
    builder.push(" AND status IN (");
    let mut statuses = builder.separated(", ");
    for status in ReturnStatus::predecessors(ReturnStatus::ReturnLabelPaymentCompleted) {
        statuses.push_bind(status);
    }
    builder.push(") AND (label_payment_ref IS NULL");
    if let Some(payment_ref) = payment_ref {
        builder.push(" OR label_payment_ref = ");
        builder.push_bind(payment_ref.to_string());
    }
    builder.push(") ORDER BY created_at DESC, id DESC LIMIT 1");
    trace!("🗃️ Executing query: {}", builder.sql());
    let request = builder.build_query_as::<ReturnRequest>().fetch_optional(conn).await?;
    Ok(request)
}

pub async fn fetch_return_items(
    return_id: &ReturnId,
    conn: &mut SqliteConnection,
) -> Result<Vec<ReturnItem>, StoreError> {
    let items = sqlx::query_as("SELECT * FROM return_items WHERE return_id = $1 ORDER BY id ASC")
        .bind(return_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(items)
}

/// Applies the transition as a single conditional `UPDATE`, guarded on the return's current status.
pub async fn apply_transition(
    return_id: &ReturnId,
    transition: ReturnTransition,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<ReturnRequest>, StoreError> {
    let target = transition.target();
    let mut builder = QueryBuilder::<Sqlite>::new("UPDATE return_requests SET status = ");
    builder.push_bind(target);
    match transition {
        ReturnTransition::LabelPaid { label_payment_ref } => {
            builder.push(", label_payment_ref = ");
            builder.push_bind(label_payment_ref);
        },
        ReturnTransition::Refunded { refund_ref, refunded_at } => {
            builder.push(", refund_ref = COALESCE(");
            builder.push_bind(refund_ref);
            builder.push(", refund_ref), refunded_at = ");
            builder.push_bind(refunded_at);
        },
    }
    builder.push(", updated_at = ");
    builder.push_bind(now);
    builder.push(" WHERE return_id = ");
    builder.push_bind(return_id.as_str().to_string());
    builder.push(" AND status IN (");
    let mut guard = builder.separated(", ");
    for status in ReturnStatus::predecessors(target) {
        guard.push_bind(status);
    }
    builder.push(") RETURNING *");
    trace!("🗃️ Executing query: {}", builder.sql());
    let request = builder.build_query_as::<ReturnRequest>().fetch_optional(conn).await?;
    Ok(request)
}

pub async fn claim_label_generation(
    return_id: &ReturnId,
    lease: Duration,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, StoreError> {
    let lease = chrono::Duration::from_std(lease).unwrap_or_else(|_| chrono::Duration::seconds(60));
    let stale_before = now - lease;
    let result = sqlx::query(
        r#"
            UPDATE return_requests SET label_attempted_at = $1, updated_at = $1
            WHERE return_id = $2
              AND status = $3
              AND label_url IS NULL
              AND (label_attempted_at IS NULL OR label_attempted_at < $4)
        "#,
    )
    .bind(now)
    .bind(return_id.as_str())
    .bind(ReturnStatus::ReturnLabelPaymentCompleted)
    .bind(stale_before)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn store_label(
    return_id: &ReturnId,
    label: &ShippingLabel,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<ReturnRequest>, StoreError> {
    let request = sqlx::query_as(
        r#"
            UPDATE return_requests SET
                status = $1,
                label_url = $2,
                tracking_number = $3,
                tracking_url = $4,
                parcel_id = $5,
                label_generated_at = $6,
                label_attempted_at = NULL,
                last_label_error = NULL,
                updated_at = $6
            WHERE return_id = $7 AND status = $8 AND label_url IS NULL
            RETURNING *;
        "#,
    )
    .bind(ReturnStatus::ReturnLabelGenerated)
    .bind(&label.label_url)
    .bind(&label.tracking_number)
    .bind(&label.tracking_url)
    .bind(&label.parcel_id)
    .bind(now)
    .bind(return_id.as_str())
    .bind(ReturnStatus::ReturnLabelPaymentCompleted)
    .fetch_optional(conn)
    .await?;
    Ok(request)
}

pub async fn record_label_failure(
    return_id: &ReturnId,
    error: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        "UPDATE return_requests SET last_label_error = $1, label_attempted_at = NULL, updated_at = $2 WHERE return_id \
         = $3",
    )
    .bind(error)
    .bind(now)
    .bind(return_id.as_str())
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::ReturnNotFound(return_id.clone()));
    }
    Ok(())
}
