use sqlx::SqliteConnection;

use crate::{
    db_types::ProcessedEvent,
    traits::{NewProcessedEvent, StoreError},
};

pub async fn fetch_processed_event(
    event_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<ProcessedEvent>, StoreError> {
    let event = sqlx::query_as("SELECT * FROM processed_events WHERE event_id = $1")
        .bind(event_id)
        .fetch_optional(conn)
        .await?;
    Ok(event)
}

pub async fn record_processed_event(
    event: NewProcessedEvent,
    conn: &mut SqliteConnection,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
            INSERT INTO processed_events (event_id, event_type, aggregate, outcome, processed_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (event_id) DO NOTHING
        "#,
    )
    .bind(event.event_id)
    .bind(event.event_type)
    .bind(event.aggregate)
    .bind(event.outcome)
    .bind(event.processed_at)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}
