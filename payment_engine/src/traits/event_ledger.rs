use crate::{
    db_types::ProcessedEvent,
    traits::{NewProcessedEvent, StoreError},
};

/// The processed-event ledger.
#[allow(async_fn_in_trait)]
pub trait EventLedger {
    async fn fetch_processed_event(&self, event_id: &str) -> Result<Option<ProcessedEvent>, StoreError>;

    /// Records the event. Returns `false` if an entry for the event id already existed, in which case nothing is
    /// changed.
    async fn record_processed_event(&self, event: NewProcessedEvent) -> Result<bool, StoreError>;
}
