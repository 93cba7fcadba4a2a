use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::{
    db_types::{NewOrder, Order, OrderId, OrderItem, OrderStatusType, PaymentStatus},
    traits::{OrderTransition, StoreError},
};

/// Inserts the order and its line items into the database, returning `false` in the second parameter if the order
/// already exists. The insert is issued before any read, so that a transaction passed in as `conn` takes the write
/// lock up front instead of upgrading a read lock.
pub async fn idempotent_insert(order: NewOrder, conn: &mut SqliteConnection) -> Result<(Order, bool), StoreError> {
    let order_id = order.order_id.clone();
    match insert_order(order, conn).await? {
        Some(order) => {
            debug!("🗃️ Order [{}] inserted with id {}", order.order_id, order.id);
            Ok((order, true))
        },
        None => {
            let existing = fetch_order_by_order_id(&order_id, conn).await?.ok_or(StoreError::OrderNotFound(order_id))?;
            trace!("🗃️ Order [{}] already exists", existing.order_id);
            Ok((existing, false))
        },
    }
}

async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Option<Order>, StoreError> {
    if let Some(item) = order.items.iter().find(|i| i.quantity <= 0) {
        return Err(StoreError::InvalidQuantity(item.quantity));
    }
    let total_price = order.total_price();
    let record: Option<Order> = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                customer_email,
                payment_ref,
                checkout_session_id,
                total_price,
                currency,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            ON CONFLICT (order_id) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(order.order_id.as_str())
    .bind(order.customer_email.trim().to_lowercase())
    .bind(&order.payment_ref)
    .bind(&order.checkout_session_id)
    .bind(total_price)
    .bind(&order.currency)
    .bind(order.created_at)
    .fetch_optional(&mut *conn)
    .await?;
    let Some(record) = record else {
        return Ok(None);
    };
    for item in order.items {
        sqlx::query(
            "INSERT INTO order_items (order_id, variant_id, quantity, unit_price, presale) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(record.order_id.as_str())
        .bind(item.variant_id.as_str())
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.presale)
        .execute(&mut *conn)
        .await?;
    }
    Ok(Some(record))
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, StoreError> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE order_id = $1")
        .bind(order_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

pub async fn fetch_order_by_payment_ref(
    payment_ref: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, StoreError> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE payment_ref = $1 ORDER BY created_at DESC, id DESC LIMIT 1")
        .bind(payment_ref)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

pub async fn fetch_order_by_checkout_session(
    session_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, StoreError> {
    let order = sqlx::query_as(
        "SELECT * FROM orders WHERE checkout_session_id = $1 ORDER BY created_at DESC, id DESC LIMIT 1",
    )
    .bind(session_id)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Fetches the newest order for the customer that is still awaiting payment. Orders that are already bound to a
/// different payment reference are never returned.
pub async fn fetch_latest_unpaid_order_for_email(
    email: &str,
    payment_ref: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, StoreError> {
    let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM orders WHERE customer_email = ");
    builder.push_bind(email.trim().to_lowercase());
    builder.push(" AND payment_status IN (");
    builder.push_bind(PaymentStatus::Unpaid);
    builder.push(", ");
    builder.push_bind(PaymentStatus::Pending);
    builder.push(") AND (payment_ref IS NULL");
    if let Some(payment_ref) = payment_ref {
        builder.push(" OR payment_ref = ");
        builder.push_bind(payment_ref.to_string());
    }
    builder.push(") ORDER BY created_at DESC, id DESC LIMIT 1");
    trace!("🗃️ Executing query: {}", builder.sql());
    let order = builder.build_query_as::<Order>().fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_items(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, StoreError> {
    let items = sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(items)
}

/// Applies the transition as a single conditional `UPDATE`. The `WHERE` clause carries the guard, so if two
/// deliveries race, only one of them gets a row back.
pub async fn apply_transition(
    order_id: &OrderId,
    transition: OrderTransition,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, StoreError> {
    let target = transition.target();
    let mut builder = QueryBuilder::<Sqlite>::new("UPDATE orders SET payment_status = ");
    builder.push_bind(target);
    if let Some(status) = transition.fulfilment_status() {
        builder.push(", status = ");
        builder.push_bind(status);
    }
    match transition {
        OrderTransition::MarkPaid { payment_ref, payment_method, paid_at } => {
            builder.push(", payment_ref = COALESCE(payment_ref, ");
            builder.push_bind(payment_ref);
            builder.push("), payment_method = COALESCE(");
            builder.push_bind(payment_method);
            builder.push(", payment_method), paid_at = ");
            builder.push_bind(paid_at);
        },
        OrderTransition::MarkFailed { reason } => {
            builder.push(", failure_reason = ");
            builder.push_bind(reason);
        },
        OrderTransition::MarkExpired => {},
        OrderTransition::MarkRefunded { refunded_at } => {
            builder.push(", refunded_at = ");
            builder.push_bind(refunded_at);
        },
    }
    builder.push(", updated_at = ");
    builder.push_bind(now);
    builder.push(" WHERE order_id = ");
    builder.push_bind(order_id.as_str().to_string());
    builder.push(" AND payment_status IN (");
    let mut guard = builder.separated(", ");
    for status in PaymentStatus::predecessors(target) {
        guard.push_bind(*status);
    }
    builder.push(") RETURNING *");
    trace!("🗃️ Executing query: {}", builder.sql());
    let order = builder.build_query_as::<Order>().fetch_optional(conn).await?;
    Ok(order)
}

pub async fn bind_payment_ref(
    order_id: &OrderId,
    payment_ref: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, StoreError> {
    let result =
        sqlx::query("UPDATE orders SET payment_ref = $1, updated_at = $2 WHERE order_id = $3 AND payment_ref IS NULL")
            .bind(payment_ref)
            .bind(now)
            .bind(order_id.as_str())
            .execute(conn)
            .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn update_order_status(
    order_id: &OrderId,
    status: OrderStatusType,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), StoreError> {
    let result = sqlx::query("UPDATE orders SET status = $1, updated_at = $2 WHERE order_id = $3")
        .bind(status)
        .bind(now)
        .bind(order_id.as_str())
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::OrderNotFound(order_id.clone()));
    }
    Ok(())
}
