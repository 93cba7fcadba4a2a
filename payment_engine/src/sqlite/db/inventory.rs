use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    db_types::{StockPool, VariantId, VariantStock},
    traits::StoreError,
};

pub async fn fetch_variant_stock(
    variant_id: &VariantId,
    conn: &mut SqliteConnection,
) -> Result<Option<VariantStock>, StoreError> {
    let stock = sqlx::query_as("SELECT * FROM variant_stock WHERE variant_id = $1")
        .bind(variant_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(stock)
}

pub async fn upsert_variant_stock(
    variant_id: &VariantId,
    stock_quantity: i64,
    presale_stock_quantity: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<VariantStock, StoreError> {
    let stock = sqlx::query_as(
        r#"
            INSERT INTO variant_stock (variant_id, stock_quantity, presale_stock_quantity, updated_at)
            VALUES ($1, MAX(0, $2), MAX(0, $3), $4)
            ON CONFLICT (variant_id) DO UPDATE SET
                stock_quantity = excluded.stock_quantity,
                presale_stock_quantity = excluded.presale_stock_quantity,
                updated_at = excluded.updated_at
            RETURNING *;
        "#,
    )
    .bind(variant_id.as_str())
    .bind(stock_quantity)
    .bind(presale_stock_quantity)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(stock)
}

/// `MAX(0, qty - n)` in a single statement. There is no read-modify-write window, so concurrent sales of the same
/// variant cannot lose updates.
pub async fn decrement_stock(
    variant_id: &VariantId,
    quantity: i64,
    pool: StockPool,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<i64>, StoreError> {
    if quantity <= 0 {
        return Err(StoreError::InvalidQuantity(quantity));
    }
    let col = pool.column();
    let sql = format!(
        "UPDATE variant_stock SET {col} = MAX(0, {col} - $1), updated_at = $2 WHERE variant_id = $3 RETURNING {col}"
    );
    let level = sqlx::query_scalar::<_, i64>(&sql)
        .bind(quantity)
        .bind(now)
        .bind(variant_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(level)
}

pub async fn increment_stock(
    variant_id: &VariantId,
    quantity: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<i64>, StoreError> {
    if quantity <= 0 {
        return Err(StoreError::InvalidQuantity(quantity));
    }
    let level = sqlx::query_scalar::<_, i64>(
        "UPDATE variant_stock SET stock_quantity = stock_quantity + $1, updated_at = $2 WHERE variant_id = $3 \
         RETURNING stock_quantity",
    )
    .bind(quantity)
    .bind(now)
    .bind(variant_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(level)
}
