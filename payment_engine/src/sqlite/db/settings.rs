use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::traits::StoreError;

pub async fn fetch_setting(key: &str, conn: &mut SqliteConnection) -> Result<Option<String>, StoreError> {
    let value = sqlx::query_scalar("SELECT value FROM store_settings WHERE key = $1")
        .bind(key)
        .fetch_optional(conn)
        .await?;
    Ok(value)
}

pub async fn upsert_setting(
    key: &str,
    value: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
            INSERT INTO store_settings (key, value, updated_at) VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
    )
    .bind(key)
    .bind(value)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}
